//! Pure hand evaluation: select and score the best five cards out of up to
//! seven (two hole cards plus the board).
//!
//! Evaluation never touches game state; the engine hands it card slices at
//! showdown and the facade exposes it directly as a helper.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::entities::{Card, Value, value_name, value_name_plural};

/// Hand rank classes, weakest first so derived ordering is strength order.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandRank {
    HighCard,
    OnePair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
}

impl fmt::Display for HandRank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::HighCard => "High Card",
            Self::OnePair => "One Pair",
            Self::TwoPair => "Two Pair",
            Self::ThreeOfAKind => "Three of a Kind",
            Self::Straight => "Straight",
            Self::Flush => "Flush",
            Self::FullHouse => "Full House",
            Self::FourOfAKind => "Four of a Kind",
            Self::StraightFlush => "Straight Flush",
        };
        write!(f, "{repr}")
    }
}

/// Result of evaluating a card set: rank class, ordered tiebreak values,
/// the winning five-card selection, and a human description.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HandValue {
    pub rank: HandRank,
    /// Most significant first; comparing two hands of the same rank
    /// lexicographically on this vector decides the stronger one.
    pub tiebreak: Vec<Value>,
    pub best_five: Vec<Card>,
    pub description: String,
}

impl HandValue {
    /// Compare by strength alone. Hands of equal strength (suits aside)
    /// compare `Equal` even when their cards differ, so this is not an
    /// `Ord` impl.
    pub fn cmp_strength(&self, other: &HandValue) -> Ordering {
        self.rank
            .cmp(&other.rank)
            .then_with(|| self.tiebreak.cmp(&other.tiebreak))
    }
}

/// Evaluate the best poker hand available in `cards` (1..=7 cards).
///
/// With more than five cards every five-card selection is scored and the
/// strongest kept. With fewer than five, straights and flushes are
/// unreachable and the hand is scored on value groups alone.
pub fn evaluate(cards: &[Card]) -> HandValue {
    if cards.len() <= 5 {
        return score_five(cards);
    }

    let n = cards.len();
    let mut best: Option<HandValue> = None;
    for a in 0..n - 4 {
        for b in a + 1..n - 3 {
            for c in b + 1..n - 2 {
                for d in c + 1..n - 1 {
                    for e in d + 1..n {
                        let five = [cards[a], cards[b], cards[c], cards[d], cards[e]];
                        let candidate = score_five(&five);
                        let better = match &best {
                            Some(current) => {
                                candidate.cmp_strength(current) == Ordering::Greater
                            }
                            None => true,
                        };
                        if better {
                            best = Some(candidate);
                        }
                    }
                }
            }
        }
    }
    // n > 5 guarantees at least one combination was scored.
    best.unwrap_or_else(|| score_five(&[]))
}

/// Score exactly the given cards (0..=5) as a final hand.
fn score_five(cards: &[Card]) -> HandValue {
    let mut sorted: Vec<Card> = cards.to_vec();
    sorted.sort_unstable_by(|a, b| b.0.cmp(&a.0));

    let values: Vec<Value> = sorted.iter().map(|c| c.0).collect();
    let mut distinct = values.clone();
    distinct.dedup();

    let is_flush = sorted.len() == 5 && sorted.iter().all(|c| c.1 == sorted[0].1);
    let straight_high = straight_high_value(&distinct, sorted.len());

    // Value groups, largest group first, higher values breaking group ties.
    let mut counts: Vec<(usize, Value)> = Vec::new();
    for &v in &distinct {
        let count = values.iter().filter(|&&x| x == v).count();
        counts.push((count, v));
    }
    counts.sort_unstable_by(|a, b| b.cmp(a));

    let rank = if is_flush && straight_high.is_some() {
        HandRank::StraightFlush
    } else if counts.first().is_some_and(|g| g.0 == 4) {
        HandRank::FourOfAKind
    } else if counts.len() >= 2 && counts[0].0 == 3 && counts[1].0 >= 2 {
        HandRank::FullHouse
    } else if is_flush {
        HandRank::Flush
    } else if straight_high.is_some() {
        HandRank::Straight
    } else if counts.first().is_some_and(|g| g.0 == 3) {
        HandRank::ThreeOfAKind
    } else if counts.len() >= 2 && counts[0].0 == 2 && counts[1].0 == 2 {
        HandRank::TwoPair
    } else if counts.first().is_some_and(|g| g.0 == 2) {
        HandRank::OnePair
    } else {
        HandRank::HighCard
    };

    let tiebreak: Vec<Value> = match rank {
        HandRank::Straight | HandRank::StraightFlush => {
            vec![straight_high.unwrap_or_default()]
        }
        _ => counts.iter().map(|&(_, v)| v).collect(),
    };

    let description = describe(rank, &counts, straight_high, &values);

    HandValue {
        rank,
        tiebreak,
        best_five: sorted,
        description,
    }
}

/// High card of a straight formed by the distinct descending values, if any.
/// The wheel (A-5-4-3-2) counts as a five-high straight.
fn straight_high_value(distinct: &[Value], hand_len: usize) -> Option<Value> {
    if hand_len != 5 || distinct.len() != 5 {
        return None;
    }
    if distinct[0] - distinct[4] == 4 {
        return Some(distinct[0]);
    }
    if distinct == [14, 5, 4, 3, 2] {
        return Some(5);
    }
    None
}

fn describe(
    rank: HandRank,
    counts: &[(usize, Value)],
    straight_high: Option<Value>,
    values: &[Value],
) -> String {
    match rank {
        HandRank::StraightFlush => match straight_high {
            Some(14) => "Royal Flush".to_string(),
            Some(high) => format!("Straight Flush, {} high", value_name(high)),
            None => "Straight Flush".to_string(),
        },
        HandRank::FourOfAKind => {
            format!("Four of a Kind, {}", value_name_plural(counts[0].1))
        }
        HandRank::FullHouse => format!(
            "Full House, {} over {}",
            value_name_plural(counts[0].1),
            value_name_plural(counts[1].1)
        ),
        HandRank::Flush => format!("Flush, {} high", value_name(values[0])),
        HandRank::Straight => match straight_high {
            Some(high) => format!("Straight, {} high", value_name(high)),
            None => "Straight".to_string(),
        },
        HandRank::ThreeOfAKind => {
            format!("Three of a Kind, {}", value_name_plural(counts[0].1))
        }
        HandRank::TwoPair => format!(
            "Two Pair, {} and {}",
            value_name_plural(counts[0].1),
            value_name_plural(counts[1].1)
        ),
        HandRank::OnePair => format!("Pair of {}", value_name_plural(counts[0].1)),
        HandRank::HighCard => match values.first() {
            Some(&high) => format!("High Card, {}", value_name(high)),
            None => "High Card".to_string(),
        },
    }
}
