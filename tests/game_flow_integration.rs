//! End-to-end game flow through the server facade: readiness auto-start,
//! blinds, betting, and showdown caching, backed by a real SQLite store.

use std::path::PathBuf;
use std::time::Duration;

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

fn heads_up_request() -> CreateTableRequest {
    CreateTableRequest {
        small_blind: 5,
        big_blind: 10,
        min_players: 2,
        max_players: 2,
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
async fn test_heads_up_blinds_and_call() -> anyhow::Result<()> {
    let db_path = temp_db_path("heads_up");
    let server = Server::start(test_server_config(db_path.clone())).await?;

    server.update_balance("p1", 5000, None).await?;
    server.update_balance("p2", 5000, None).await?;

    let table_id = server.create_table("p1", heads_up_request()).await?;
    let join = server.join_table("p2", &table_id).await?;
    assert!(join.success, "{}", join.message);
    assert_eq!(join.new_balance, 4900);

    server.set_player_ready("p1", &table_id).await?;
    server.set_player_ready("p2", &table_id).await?;
    wait_for_game(&server, &table_id).await;

    let state = server.get_game_state(&table_id, "p1").await?;
    let current = state
        .current_player_id
        .clone()
        .expect("someone is on the clock");
    let response = server.call_bet(&current, &table_id).await?;
    assert!(response.success, "{}", response.message);

    // Blinds matched: both players committed the big blind and the pot
    // holds both commitments.
    let state = server.get_game_state(&table_id, &current).await?;
    for player_id in ["p1", "p2"] {
        let player = state.player(player_id).expect("seated player");
        assert_eq!(player.street_bet, 10);
        assert_eq!(player.chips, 990);
    }
    assert_eq!(state.pot, 20);
    assert_eq!(state.current_bet, 10);

    server.shutdown().await;
    let _ = std::fs::remove_file(&db_path);
    Ok(())
}

#[tokio::test]
async fn test_fold_resolves_hand_and_caches_winners() -> anyhow::Result<()> {
    let db_path = temp_db_path("fold_flow");
    let server = Server::start(test_server_config(db_path.clone())).await?;

    server.update_balance("p1", 5000, None).await?;
    server.update_balance("p2", 5000, None).await?;

    let table_id = server.create_table("p1", heads_up_request()).await?;
    server.join_table("p2", &table_id).await?;
    server.set_player_ready("p1", &table_id).await?;
    server.set_player_ready("p2", &table_id).await?;
    wait_for_game(&server, &table_id).await;

    let state = server.get_game_state(&table_id, "p1").await?;
    let current = state.current_player_id.clone().expect("current player");
    let response = server.fold_bet(&current, &table_id).await?;
    assert!(response.success, "{}", response.message);

    let summary = server
        .get_last_winners(&table_id)
        .await?
        .expect("showdown result cached");
    assert_eq!(summary.winners.len(), 1);
    assert_ne!(summary.winners[0], current);
    // The folded blinds are all the pot there was.
    assert_eq!(summary.pot, 15);

    server.shutdown().await;
    let _ = std::fs::remove_file(&db_path);
    Ok(())
}

#[tokio::test]
async fn test_chips_conserved_through_a_betting_round() -> anyhow::Result<()> {
    let db_path = temp_db_path("conservation");
    let server = Server::start(test_server_config(db_path.clone())).await?;

    server.update_balance("p1", 5000, None).await?;
    server.update_balance("p2", 5000, None).await?;

    let table_id = server.create_table("p1", heads_up_request()).await?;
    server.join_table("p2", &table_id).await?;
    server.set_player_ready("p1", &table_id).await?;
    server.set_player_ready("p2", &table_id).await?;
    wait_for_game(&server, &table_id).await;

    // Run a raise and a call, checking conservation after each action:
    // chips behind plus the (displayed) pot always equals both buy-ins.
    let total = 2000;
    let state = server.get_game_state(&table_id, "p1").await?;
    let first = state.current_player_id.clone().expect("current player");
    server.make_bet(&first, &table_id, 40).await?;

    let state = server.get_game_state(&table_id, "p1").await?;
    let behind: i64 = state.players.iter().map(|p| p.chips).sum();
    assert_eq!(behind + state.pot, total);

    let second = state
        .current_player_id
        .clone()
        .expect("action moves to the caller");
    assert_ne!(first, second);
    server.call_bet(&second, &table_id).await?;

    let state = server.get_game_state(&table_id, "p1").await?;
    let behind: i64 = state.players.iter().map(|p| p.chips).sum();
    assert_eq!(behind + state.pot, total);
    // Raise and call closed pre-flop; the flop is out.
    assert_eq!(state.community.len(), 3);

    server.shutdown().await;
    let _ = std::fs::remove_file(&db_path);
    Ok(())
}

#[tokio::test]
async fn test_out_of_turn_and_bad_checks_rejected() -> anyhow::Result<()> {
    let db_path = temp_db_path("rejections");
    let server = Server::start(test_server_config(db_path.clone())).await?;

    server.update_balance("p1", 5000, None).await?;
    server.update_balance("p2", 5000, None).await?;

    let table_id = server.create_table("p1", heads_up_request()).await?;
    server.join_table("p2", &table_id).await?;
    server.set_player_ready("p1", &table_id).await?;
    server.set_player_ready("p2", &table_id).await?;
    wait_for_game(&server, &table_id).await;

    let state = server.get_game_state(&table_id, "p1").await?;
    let current = state.current_player_id.clone().expect("current player");
    let other = if current == "p1" { "p2" } else { "p1" };

    let response = server.call_bet(other, &table_id).await?;
    assert!(!response.success);
    assert!(response.message.contains("not your turn"));

    // The opener faces the big blind, so a check is illegal.
    let response = server.check_bet(&current, &table_id).await?;
    assert!(!response.success);

    // Nothing moved.
    let state = server.get_game_state(&table_id, "p1").await?;
    assert_eq!(state.current_player_id.as_deref(), Some(current.as_str()));

    server.shutdown().await;
    let _ = std::fs::remove_file(&db_path);
    Ok(())
}
