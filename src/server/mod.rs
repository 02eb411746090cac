//! Lobby and poker facade: request handlers that validate, mutate one
//! table, and publish one event. The transport layer (RPC, bots, CLI) calls
//! these methods; nothing in here talks to a socket.

use log::{error, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

pub mod messages;

use crate::config::ServerConfig;
use crate::db::{Database, SnapshotStore, SqliteTableStore};
use crate::errors::{Error, ErrorKind, Result};
use crate::events::{Event, EventHandlers, EventPayload, EventPipeline, SaveSink};
use crate::game::engine::ShowdownSummary;
use crate::game::entities::{Card, Chips, PlayerAction, TableId};
use crate::game::eval::{HandValue, evaluate};
use crate::ledger::{EntryKind, LedgerManager};
use crate::streams::StreamRegistry;
use crate::table::{Table, TableConfig};
use messages::{CreateTableRequest, GameUpdate, JoinTableResponse, Notification, OpResponse, TableSummary};

/// Wait group over the out-of-band save tasks, so shutdown can await
/// persistence that did not flow through the pipeline.
#[derive(Default)]
struct SaveTracker {
    pending: std::sync::atomic::AtomicU64,
    notify: tokio::sync::Notify,
}

impl SaveTracker {
    fn begin(&self) {
        self.pending
            .fetch_add(1, std::sync::atomic::Ordering::AcqRel);
    }

    fn end(&self) {
        if self
            .pending
            .fetch_sub(1, std::sync::atomic::Ordering::AcqRel)
            == 1
        {
            self.notify.notify_waiters();
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.notify.notified();
            if self.pending.load(std::sync::atomic::Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// The poker service core: tables, ledger, streams, pipeline, persistence.
pub struct Server {
    config: ServerConfig,
    db: Database,
    ledger: LedgerManager,
    store: Arc<SqliteTableStore>,
    streams: Arc<StreamRegistry>,
    pipeline: Arc<EventPipeline>,
    tables: RwLock<HashMap<TableId, Arc<Table>>>,
    saves: Arc<SaveTracker>,
}

impl Server {
    /// Open the database, start the event pipeline, and restore persisted
    /// tables.
    pub async fn start(config: ServerConfig) -> Result<Self> {
        config.validate().map_err(Error::InvalidArgument)?;
        let db = Database::open(&config.db_path).await?;
        let ledger = LedgerManager::new(db.pool().clone());
        let store = Arc::new(SqliteTableStore::new(db.pool().clone()));
        let streams = Arc::new(StreamRegistry::new());
        let handlers = Arc::new(EventHandlers::new(
            Arc::clone(&streams),
            Arc::clone(&store) as Arc<dyn SnapshotStore>,
        ));
        let pipeline = EventPipeline::start(
            config.event_queue_size,
            config.event_worker_count,
            handlers,
        );

        let server = Self {
            config,
            db,
            ledger,
            store,
            streams,
            pipeline,
            tables: RwLock::new(HashMap::new()),
            saves: Arc::new(SaveTracker::default()),
        };
        server.restore_tables().await?;
        Ok(server)
    }

    /// Drain the event pipeline and await out-of-band saves; all pending
    /// persistence completes before this returns.
    pub async fn shutdown(&self) {
        self.pipeline.shutdown().await;
        self.saves.wait_idle().await;
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn ledger(&self) -> &LedgerManager {
        &self.ledger
    }

    pub fn store(&self) -> &Arc<SqliteTableStore> {
        &self.store
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // ------------------------------------------------------------------
    // Lobby operations
    // ------------------------------------------------------------------

    /// Create a table and seat its creator, deducting the buy-in.
    pub async fn create_table(
        &self,
        player_id: &str,
        request: CreateTableRequest,
    ) -> Result<TableId> {
        let table_config: TableConfig = request.into_config(&self.config);
        table_config.validate().map_err(Error::InvalidArgument)?;

        if let Some(table_id) = self.find_player_table(player_id).await {
            return Err(Error::AlreadyAtTable {
                player_id: player_id.to_string(),
                table_id,
            });
        }

        let balance = self.ledger.balance_of(player_id).await?;
        let required = table_config.buy_in.max(table_config.min_balance);
        if balance < required {
            return Err(Error::InsufficientBalance {
                available: balance,
                required,
            });
        }

        let table_id = Uuid::new_v4().to_string();
        let table = Table::new(
            table_id.clone(),
            table_config.clone(),
            player_id.to_string(),
            self.pipeline.sink(),
            self.save_sink(),
        );
        self.tables
            .write()
            .await
            .insert(table_id.clone(), Arc::clone(&table));
        table.publish_created().await;

        let new_balance = if table_config.buy_in > 0 {
            self.ledger
                .debit(
                    player_id,
                    table_config.buy_in,
                    EntryKind::BuyIn,
                    Some(format!("Buy-in to table {table_id}")),
                )
                .await?
        } else {
            balance
        };
        let name = self.display_name(player_id).await;
        if let Err(err) = table.add_user(player_id, &name, new_balance, None).await {
            // Roll the buy-in back and tear the table down again.
            if table_config.buy_in > 0 {
                if let Err(refund_err) = self
                    .ledger
                    .credit(
                        player_id,
                        table_config.buy_in,
                        EntryKind::Adjust,
                        Some(format!("Refund failed join of table {table_id}")),
                    )
                    .await
                {
                    error!(
                        "failed to refund buy-in for {player_id} on table {table_id}: {refund_err}"
                    );
                }
            }
            self.drop_table(&table).await;
            return Err(err);
        }

        info!("player {player_id} created table {table_id}");
        Ok(table_id)
    }

    /// Seat a player, deducting the buy-in once. Joining a table you are
    /// already seated at reconnects without charging again.
    pub async fn join_table(&self, player_id: &str, table_id: &str) -> Result<JoinTableResponse> {
        let table = match self.table(table_id).await {
            Ok(table) => table,
            Err(err) => return business_reject_join(err, 0),
        };

        if table.contains_user(player_id).await {
            table.mark_connected(player_id).await?;
            let balance = self.ledger.balance_of(player_id).await?;
            info!("player {player_id} reconnected to table {table_id}");
            return Ok(JoinTableResponse {
                success: true,
                message: format!("Reconnected to table {table_id}"),
                new_balance: balance,
            });
        }

        if let Some(other) = self.find_player_table(player_id).await {
            return Ok(JoinTableResponse {
                success: false,
                message: format!("Already seated at table {other}"),
                new_balance: self.ledger.balance_of(player_id).await?,
            });
        }

        let table_config = table.config().clone();
        let balance = self.ledger.balance_of(player_id).await?;
        if balance < table_config.buy_in.max(table_config.min_balance) {
            return Ok(JoinTableResponse {
                success: false,
                message: "Insufficient DCR balance".to_string(),
                new_balance: balance,
            });
        }

        // Debit first, seat second, refund on failure.
        let new_balance = if table_config.buy_in > 0 {
            self.ledger
                .debit(
                    player_id,
                    table_config.buy_in,
                    EntryKind::BuyIn,
                    Some(format!("Buy-in to table {table_id}")),
                )
                .await?
        } else {
            balance
        };
        let name = self.display_name(player_id).await;
        match table.add_user(player_id, &name, new_balance, None).await {
            Ok(seat) => {
                info!("player {player_id} joined table {table_id} at seat {seat}");
                Ok(JoinTableResponse {
                    success: true,
                    message: format!("Joined table {table_id} at seat {seat}"),
                    new_balance,
                })
            }
            Err(err) => {
                if table_config.buy_in > 0 {
                    if let Err(refund_err) = self
                        .ledger
                        .credit(
                            player_id,
                            table_config.buy_in,
                            EntryKind::Adjust,
                            Some(format!("Refund failed join of table {table_id}")),
                        )
                        .await
                    {
                        error!(
                            "failed to refund buy-in for {player_id} on table {table_id}: {refund_err}"
                        );
                    }
                }
                business_reject_join(err, balance)
            }
        }
    }

    /// Unseat a player. The last player out removes the table; a departing
    /// host hands the table to the lowest-seated remaining player.
    pub async fn leave_table(&self, player_id: &str, table_id: &str) -> Result<OpResponse> {
        let table = match self.table(table_id).await {
            Ok(table) => table,
            Err(err) => return business_reject(err),
        };
        match table.remove_user(player_id).await {
            Ok(outcome) => {
                if outcome.table_empty {
                    self.drop_table(&table).await;
                }
                let message = match (&outcome.new_host, outcome.removed_now) {
                    (Some(host), _) => format!("Left table {table_id}, host is now {host}"),
                    (None, false) => {
                        format!("Left table {table_id}, seat frees when the hand ends")
                    }
                    (None, true) => format!("Left table {table_id}"),
                };
                info!("player {player_id} left table {table_id}");
                Ok(OpResponse::ok(message))
            }
            Err(err) => business_reject(err),
        }
    }

    pub async fn get_tables(&self) -> Vec<TableSummary> {
        let tables: Vec<Arc<Table>> = self.tables.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(tables.len());
        for table in tables {
            let snapshot = table.snapshot().await;
            if !snapshot.users.is_empty() {
                summaries.push(TableSummary::from_snapshot(&snapshot));
            }
        }
        summaries
    }

    /// The table a player is currently seated at, if any.
    pub async fn get_player_current_table(&self, player_id: &str) -> Option<TableId> {
        self.find_player_table(player_id).await
    }

    pub async fn set_player_ready(&self, player_id: &str, table_id: &str) -> Result<OpResponse> {
        self.set_ready_inner(player_id, table_id, true).await
    }

    pub async fn set_player_unready(&self, player_id: &str, table_id: &str) -> Result<OpResponse> {
        self.set_ready_inner(player_id, table_id, false).await
    }

    /// Flag a player's connection as gone; their seat survives while they
    /// hold chips in a running hand.
    pub async fn mark_player_disconnected(
        &self,
        player_id: &str,
        table_id: &str,
    ) -> Result<()> {
        let table = self.table(table_id).await?;
        table.mark_disconnected(player_id).await?;
        self.streams.deregister_player(player_id).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Ledger operations
    // ------------------------------------------------------------------

    /// Create or rename the ledger account for a player.
    pub async fn register_player(&self, player_id: &str, display_name: &str) -> Result<()> {
        self.ledger.ensure_account(player_id, display_name).await?;
        Ok(())
    }

    pub async fn get_balance(&self, player_id: &str) -> Result<Chips> {
        Ok(self.ledger.balance_of(player_id).await?)
    }

    /// Apply a signed delta to a player's balance.
    pub async fn update_balance(
        &self,
        player_id: &str,
        delta: Chips,
        description: Option<String>,
    ) -> Result<Chips> {
        let kind = if delta >= 0 {
            EntryKind::Deposit
        } else {
            EntryKind::Withdraw
        };
        Ok(self
            .ledger
            .update_balance(player_id, delta, kind, description)
            .await?)
    }

    /// Move chips from one account to another.
    pub async fn process_tip(
        &self,
        from: &str,
        to: &str,
        amount: Chips,
    ) -> Result<(Chips, Chips)> {
        Ok(self.ledger.process_tip(from, to, amount).await?)
    }

    // ------------------------------------------------------------------
    // Streams
    // ------------------------------------------------------------------

    /// Open the server-push notification stream for a player.
    pub async fn start_notification_stream(
        &self,
        player_id: &str,
    ) -> mpsc::Receiver<Notification> {
        self.streams.register_notifications(player_id).await
    }

    /// Open the game-update stream for a seated player; the first message
    /// is the current personalized state.
    pub async fn start_game_stream(
        &self,
        table_id: &str,
        player_id: &str,
    ) -> Result<mpsc::Receiver<GameUpdate>> {
        let table = self.table(table_id).await?;
        if !table.contains_user(player_id).await {
            return Err(Error::PlayerNotFound(player_id.to_string()));
        }
        let rx = self.streams.register_game_stream(table_id, player_id).await;
        let snapshot = table.snapshot().await;
        let update = GameUpdate::personalized(&snapshot, player_id);
        self.streams
            .send_game_update(table_id, player_id, update)
            .await;
        Ok(rx)
    }

    /// Tear down a player's streams (transport saw the connection drop).
    pub async fn stop_streams(&self, player_id: &str) {
        self.streams.deregister_player(player_id).await;
    }

    // ------------------------------------------------------------------
    // Poker operations
    // ------------------------------------------------------------------

    /// Wager to a total street commitment of `amount`.
    pub async fn make_bet(
        &self,
        player_id: &str,
        table_id: &str,
        amount: Chips,
    ) -> Result<OpResponse> {
        self.player_action(player_id, table_id, PlayerAction::Bet(amount))
            .await
    }

    pub async fn call_bet(&self, player_id: &str, table_id: &str) -> Result<OpResponse> {
        self.player_action(player_id, table_id, PlayerAction::Call)
            .await
    }

    pub async fn check_bet(&self, player_id: &str, table_id: &str) -> Result<OpResponse> {
        self.player_action(player_id, table_id, PlayerAction::Check)
            .await
    }

    pub async fn fold_bet(&self, player_id: &str, table_id: &str) -> Result<OpResponse> {
        self.player_action(player_id, table_id, PlayerAction::Fold)
            .await
    }

    /// One personalized view of the current table state.
    pub async fn get_game_state(&self, table_id: &str, player_id: &str) -> Result<GameUpdate> {
        let table = self.table(table_id).await?;
        let snapshot = table.snapshot().await;
        Ok(GameUpdate::personalized(&snapshot, player_id))
    }

    /// Reveal the caller's hole cards to the table.
    pub async fn show_cards(&self, player_id: &str, table_id: &str) -> Result<OpResponse> {
        self.set_card_visibility(player_id, table_id, true).await
    }

    /// Hide the caller's hole cards again.
    pub async fn hide_cards(&self, player_id: &str, table_id: &str) -> Result<OpResponse> {
        self.set_card_visibility(player_id, table_id, false).await
    }

    /// Pure evaluation helper: rank class, description, and best five.
    pub fn evaluate_hand(&self, cards: &[Card]) -> Result<HandValue> {
        if cards.is_empty() || cards.len() > 7 {
            return Err(Error::InvalidArgument(format!(
                "expected 1..=7 cards, got {}",
                cards.len()
            )));
        }
        for card in cards {
            if !card.is_valid() {
                return Err(Error::InvalidArgument(format!("malformed card {card:?}")));
            }
        }
        let mut seen = std::collections::HashSet::new();
        for card in cards {
            if !seen.insert(*card) {
                return Err(Error::InvalidArgument(format!("duplicate card {card}")));
            }
        }
        Ok(evaluate(cards))
    }

    /// Cached result of the table's most recent showdown.
    pub async fn get_last_winners(&self, table_id: &str) -> Result<Option<ShowdownSummary>> {
        let table = self.table(table_id).await?;
        Ok(table.last_showdown().await)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn restore_tables(&self) -> Result<()> {
        let table_ids = self.store.load_table_ids().await?;
        for table_id in table_ids {
            match self.store.load_snapshot(&table_id).await {
                Ok(snapshot) => {
                    let table =
                        Table::restore(&snapshot, self.pipeline.sink(), self.save_sink());
                    table.resume_timers().await;
                    self.tables
                        .write()
                        .await
                        .insert(table_id.clone(), table);
                    info!("restored table {table_id}");
                }
                Err(err) => {
                    error!("failed to restore table {table_id}: {err}");
                }
            }
        }
        Ok(())
    }

    fn save_sink(&self) -> SaveSink {
        let store = Arc::clone(&self.store);
        let tracker = Arc::clone(&self.saves);
        Arc::new(move |snapshot| {
            let store = Arc::clone(&store);
            let tracker = Arc::clone(&tracker);
            tracker.begin();
            tokio::spawn(async move {
                if let Err(err) = store.save_snapshot(&snapshot).await {
                    error!("async save for table {} failed: {err}", snapshot.id);
                }
                tracker.end();
            });
        })
    }

    async fn table(&self, table_id: &str) -> Result<Arc<Table>> {
        self.tables
            .read()
            .await
            .get(table_id)
            .cloned()
            .ok_or_else(|| Error::TableNotFound(table_id.to_string()))
    }

    async fn find_player_table(&self, player_id: &str) -> Option<TableId> {
        let tables: Vec<(TableId, Arc<Table>)> = self
            .tables
            .read()
            .await
            .iter()
            .map(|(id, table)| (id.clone(), Arc::clone(table)))
            .collect();
        for (table_id, table) in tables {
            if table.contains_user(player_id).await {
                return Some(table_id);
            }
        }
        None
    }

    async fn set_ready_inner(
        &self,
        player_id: &str,
        table_id: &str,
        ready: bool,
    ) -> Result<OpResponse> {
        let table = match self.table(table_id).await {
            Ok(table) => table,
            Err(err) => return business_reject(err),
        };
        match table.set_ready(player_id, ready).await {
            Ok(()) => Ok(OpResponse::ok(if ready { "Ready" } else { "Unready" })),
            Err(err) => business_reject(err),
        }
    }

    async fn player_action(
        &self,
        player_id: &str,
        table_id: &str,
        action: PlayerAction,
    ) -> Result<OpResponse> {
        let table = match self.table(table_id).await {
            Ok(table) => table,
            Err(err) => return business_reject(err),
        };
        if !table.game_running().await {
            return Ok(OpResponse::fail("No game in progress"));
        }
        match table.take_action(player_id, action).await {
            Ok(()) => Ok(OpResponse::ok(format!("{player_id} {action}"))),
            Err(err) => business_reject(err),
        }
    }

    async fn set_card_visibility(
        &self,
        player_id: &str,
        table_id: &str,
        show: bool,
    ) -> Result<OpResponse> {
        let table = match self.table(table_id).await {
            Ok(table) => table,
            Err(err) => return business_reject(err),
        };
        let snapshot = match table.set_show_cards(player_id, show).await {
            Ok(snapshot) => snapshot,
            Err(err) => return business_reject(err),
        };
        // Visibility changes have no event kind; push refreshed views
        // straight to the table's game streams.
        for user in &snapshot.users {
            let update = GameUpdate::personalized(&snapshot, &user.id);
            self.streams
                .send_game_update(table_id, &user.id, update)
                .await;
        }
        Ok(OpResponse::ok(if show { "Showing cards" } else { "Hiding cards" }))
    }

    async fn drop_table(&self, table: &Arc<Table>) {
        self.tables.write().await.remove(table.id());
        let snapshot = table.snapshot().await;
        self.pipeline
            .publish(Event::new(snapshot, EventPayload::TableRemoved));
        info!("removed table {}", table.id());
    }

    async fn display_name(&self, player_id: &str) -> String {
        match self.ledger.get_account(player_id).await {
            Ok(account) if !account.display_name.is_empty() => account.display_name,
            _ => player_id.to_string(),
        }
    }
}

/// Map caller mistakes to `success=false` responses; real faults propagate.
fn business_reject(err: Error) -> Result<OpResponse> {
    match err.kind() {
        ErrorKind::Internal => Err(err),
        _ => Ok(OpResponse::fail(err.to_string())),
    }
}

fn business_reject_join(err: Error, balance: Chips) -> Result<JoinTableResponse> {
    match err.kind() {
        ErrorKind::Internal => Err(err),
        _ => Ok(JoinTableResponse {
            success: false,
            message: err.to_string(),
            new_balance: balance,
        }),
    }
}
