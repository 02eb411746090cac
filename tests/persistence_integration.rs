//! Crash/restart coverage: a mid-hand table restored from the store plays
//! on with the same dealer, current player, pot, and hole cards; the
//! ledger's balances always equal the sum of their transactions.

use std::path::PathBuf;
use std::time::Duration;

use relay_poker::ledger::EntryKind;
use relay_poker::server::messages::CreateTableRequest;
use relay_poker::{Server, ServerConfig};

fn temp_db_path(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("relay_poker_{tag}_{}_{nanos}.db", std::process::id()))
}

fn test_server_config(db_path: PathBuf) -> ServerConfig {
    let _ = env_logger::builder().is_test(true).try_init();
    ServerConfig {
        db_path,
        ..ServerConfig::default()
    }
}

fn three_seat_request() -> CreateTableRequest {
    CreateTableRequest {
        small_blind: 5,
        big_blind: 10,
        min_players: 2,
        max_players: 6,
        buy_in: 100,
        min_balance: 0,
        starting_chips: Some(1000),
        time_bank_secs: Some(600),
        auto_start_ms: Some(0),
    }
}

async fn wait_for_game(server: &Server, table_id: &str) {
    for _ in 0..200 {
        if let Ok(state) = server.get_game_state(table_id, "probe").await
            && state.game_running
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("game did not start");
}

#[tokio::test]
async fn test_snapshot_survives_restart() -> anyhow::Result<()> {
    let db_path = temp_db_path("restart");
    let players = ["p1", "p2", "p3"];

    let server = Server::start(test_server_config(db_path.clone())).await?;
    for player_id in players {
        server.update_balance(player_id, 5000, None).await?;
    }
    let table_id = server.create_table("p1", three_seat_request()).await?;
    server.join_table("p2", &table_id).await?;
    server.join_table("p3", &table_id).await?;
    for player_id in players {
        server.set_player_ready(player_id, &table_id).await?;
    }
    wait_for_game(&server, &table_id).await;

    let before = server.get_game_state(&table_id, "p1").await?;
    assert_eq!(before.phase, relay_poker::Phase::PreFlop);
    let current = before.current_player_id.clone().expect("current player");
    server.mark_player_disconnected(&current, &table_id).await?;

    // Remember what each player could see before the crash.
    let mut hole_cards_before = Vec::new();
    for player_id in players {
        let view = server.get_game_state(&table_id, player_id).await?;
        let own = view.player(player_id).expect("seated").hole_cards.clone();
        assert_eq!(own.len(), 2);
        hole_cards_before.push(own);
    }

    // Shutdown drains the pipeline and the async saves: the latest
    // snapshot is on disk.
    server.shutdown().await;
    drop(server);

    let server = Server::start(test_server_config(db_path.clone())).await?;
    let after = server.get_game_state(&table_id, "p1").await?;

    assert!(after.game_running);
    assert_eq!(after.phase, before.phase);
    assert_eq!(after.dealer_id, before.dealer_id);
    assert_eq!(after.current_player_id, before.current_player_id);
    assert_eq!(after.pot, before.pot);
    assert_eq!(after.current_bet, before.current_bet);

    for (idx, player_id) in players.iter().enumerate() {
        let view = server.get_game_state(&table_id, player_id).await?;
        let player = view.player(player_id).expect("seated after restart");
        assert_eq!(player.hole_cards, hole_cards_before[idx]);
        // Each player still sees only their own cards.
        for other in players.iter().filter(|other| *other != player_id) {
            assert!(view.player(other).expect("seated").hole_cards.is_empty());
        }
        if *player_id == current {
            assert!(player.disconnected);
        }
    }

    // The restored hand is playable: the current player can still act.
    let response = server.call_bet(&current, &table_id).await?;
    assert!(response.success, "{}", response.message);

    server.shutdown().await;
    let _ = std::fs::remove_file(&db_path);
    Ok(())
}

#[tokio::test]
async fn test_mid_hand_betting_state_round_trips() -> anyhow::Result<()> {
    let db_path = temp_db_path("betting_state");
    let server = Server::start(test_server_config(db_path.clone())).await?;

    server.update_balance("p1", 5000, None).await?;
    server.update_balance("p2", 5000, None).await?;
    let request = CreateTableRequest {
        max_players: 2,
        ..three_seat_request()
    };
    let table_id = server.create_table("p1", request).await?;
    server.join_table("p2", &table_id).await?;
    server.set_player_ready("p1", &table_id).await?;
    server.set_player_ready("p2", &table_id).await?;
    wait_for_game(&server, &table_id).await;

    // Raise mid-street, then crash.
    let state = server.get_game_state(&table_id, "p1").await?;
    let raiser = state.current_player_id.clone().expect("current player");
    server.make_bet(&raiser, &table_id, 40).await?;

    let before = server.get_game_state(&table_id, "p1").await?;
    server.shutdown().await;
    drop(server);

    let server = Server::start(test_server_config(db_path.clone())).await?;
    let after = server.get_game_state(&table_id, "p1").await?;
    assert_eq!(after.current_bet, 40);
    assert_eq!(after.pot, before.pot);
    assert_eq!(after.current_player_id, before.current_player_id);
    let raiser_view = after.player(&raiser).expect("raiser seated");
    assert_eq!(raiser_view.street_bet, 40);

    // The caller can finish the street after the restart.
    let caller = after.current_player_id.clone().expect("caller on clock");
    let response = server.call_bet(&caller, &table_id).await?;
    assert!(response.success, "{}", response.message);
    let state = server.get_game_state(&table_id, "p1").await?;
    assert_eq!(state.phase, relay_poker::Phase::Flop);

    server.shutdown().await;
    let _ = std::fs::remove_file(&db_path);
    Ok(())
}

#[tokio::test]
async fn test_ledger_balance_equals_sum_of_transactions() -> anyhow::Result<()> {
    let db_path = temp_db_path("ledger_sum");
    let server = Server::start(test_server_config(db_path.clone())).await?;

    server.register_player("alice", "Alice").await?;
    server.update_balance("alice", 5000, None).await?;
    server.update_balance("alice", -1200, Some("withdrawal".to_string())).await?;
    server.update_balance("alice", 300, None).await?;

    let ledger = server.ledger();
    assert_eq!(server.get_balance("alice").await?, 4100);
    assert_eq!(ledger.sum_of_entries("alice").await?, 4100);

    let entries = ledger.entries("alice", 10).await?;
    assert_eq!(entries.len(), 3);
    // Most recent first.
    assert_eq!(entries[0].amount, 300);
    assert_eq!(entries[1].amount, -1200);
    assert_eq!(entries[1].kind, EntryKind::Withdraw);

    server.shutdown().await;
    let _ = std::fs::remove_file(&db_path);
    Ok(())
}

#[tokio::test]
async fn test_overdraft_leaves_ledger_unchanged() -> anyhow::Result<()> {
    let db_path = temp_db_path("overdraft");
    let server = Server::start(test_server_config(db_path.clone())).await?;

    server.update_balance("bob", 100, None).await?;
    let err = server.update_balance("bob", -500, None).await;
    assert!(err.is_err());

    assert_eq!(server.get_balance("bob").await?, 100);
    assert_eq!(server.ledger().sum_of_entries("bob").await?, 100);
    assert_eq!(server.ledger().entries("bob", 10).await?.len(), 1);

    server.shutdown().await;
    let _ = std::fs::remove_file(&db_path);
    Ok(())
}

#[tokio::test]
async fn test_tip_moves_chips_atomically() -> anyhow::Result<()> {
    let db_path = temp_db_path("tips");
    let server = Server::start(test_server_config(db_path.clone())).await?;

    server.update_balance("alice", 1000, None).await?;
    server.update_balance("bob", 50, None).await?;

    let (from_balance, to_balance) = server.process_tip("alice", "bob", 250).await?;
    assert_eq!(from_balance, 750);
    assert_eq!(to_balance, 300);

    // Both sides logged, both balances reconcile with their logs.
    assert_eq!(server.ledger().sum_of_entries("alice").await?, 750);
    assert_eq!(server.ledger().sum_of_entries("bob").await?, 300);

    // A tip beyond the balance fails without moving anything.
    assert!(server.process_tip("bob", "alice", 5000).await.is_err());
    assert_eq!(server.get_balance("bob").await?, 300);
    assert_eq!(server.get_balance("alice").await?, 750);

    server.shutdown().await;
    let _ = std::fs::remove_file(&db_path);
    Ok(())
}

#[tokio::test]
async fn test_ledger_survives_restart() -> anyhow::Result<()> {
    let db_path = temp_db_path("ledger_restart");

    let server = Server::start(test_server_config(db_path.clone())).await?;
    server.register_player("carol", "Carol").await?;
    server.update_balance("carol", 2500, None).await?;
    server.shutdown().await;
    drop(server);

    let server = Server::start(test_server_config(db_path.clone())).await?;
    assert_eq!(server.get_balance("carol").await?, 2500);
    assert_eq!(server.ledger().sum_of_entries("carol").await?, 2500);
    let account = server.ledger().get_account("carol").await?;
    assert_eq!(account.display_name, "Carol");

    server.shutdown().await;
    let _ = std::fs::remove_file(&db_path);
    Ok(())
}
