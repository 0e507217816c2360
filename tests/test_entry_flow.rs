//! End-to-end tests for the entry-collection → commit pipeline, driven
//! through the public dispatcher surface against the memory backend.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Local, TimeZone};

use moneta_bot::config::{Config, EntryConfig, LedgerConfig, TelegramConfig};
use moneta_bot::dispatch::{Dispatcher, Reply};
use moneta_bot::ledger::backend::LedgerBackend;
use moneta_bot::ledger::backend::memory::MemoryBackend;
use moneta_bot::ledger::{EntryDraft, LedgerStore};
use moneta_bot::session::SessionManager;

fn test_config() -> Config {
    Config {
        bot_name: "test".into(),
        log_level: "info".into(),
        telegram: TelegramConfig { enabled: false },
        ledger: LedgerConfig {
            backend: "memory".into(),
            spreadsheet_id: String::new(),
            partition_rows: 1000,
            partition_cols: 20,
            timeout_seconds: 1,
        },
        entry: EntryConfig {
            categories: vec!["Groceries".into(), "Fun".into()],
            descriptions: vec!["Supermarket".into()],
        },
        users: HashMap::from([(1, "Alice".to_string()), (2, "Bob".to_string())]),
        sheets_api_token: None,
    }
}

fn wire() -> (MemoryBackend, Arc<Dispatcher>) {
    let cfg = test_config();
    let backend = MemoryBackend::new();
    let store = LedgerStore::new(LedgerBackend::Memory(backend.clone()), &cfg.ledger);
    let sessions = SessionManager::new(cfg.users.clone(), &cfg.entry);
    (backend, Arc::new(Dispatcher::new(sessions, store)))
}

fn text(reply: &Reply) -> &str {
    match reply {
        Reply::Text(s) => s,
        Reply::Document { .. } => panic!("expected text reply"),
    }
}

async fn drive_entry(d: &Dispatcher, user: i64, amount: &str, category: &str, description: &str) {
    d.handle(user, "/add").await;
    d.handle(user, amount).await;
    d.handle(user, category).await;
    let reply = d.handle(user, description).await;
    assert!(text(&reply).contains("Added!"), "unexpected reply: {reply:?}");
}

#[tokio::test]
async fn committed_entry_lands_in_a_row_with_all_fields() {
    let (backend, d) = wire();
    let label = moneta_bot::ledger::month_label(Local::now());

    let before = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    drive_entry(&d, 1, "120", "Groceries", "weekly shop").await;
    let after = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

    let ts = backend.read_cell(&label, 2, 1).await.unwrap();
    assert!(*ts >= *before && *ts <= *after, "timestamp {ts} outside [{before}, {after}]");
    assert_eq!(backend.read_cell(&label, 2, 2).await.unwrap(), "120");
    assert_eq!(backend.read_cell(&label, 2, 3).await.unwrap(), "Groceries");
    assert_eq!(backend.read_cell(&label, 2, 4).await.unwrap(), "Alice");
    assert_eq!(backend.read_cell(&label, 2, 5).await.unwrap(), "weekly shop");
}

#[tokio::test]
async fn sequential_commits_fill_contiguous_rows() {
    let (backend, d) = wire();
    let label = moneta_bot::ledger::month_label(Local::now());

    drive_entry(&d, 1, "10", "Groceries", "a").await;
    drive_entry(&d, 1, "20", "Groceries", "b").await;
    drive_entry(&d, 2, "30", "Fun", "c").await;

    for (row, amount) in [(2u32, "10"), (3, "20"), (4, "30")] {
        assert_eq!(backend.read_cell(&label, row, 2).await.unwrap(), amount);
    }
    assert_eq!(backend.read_cell(&label, 5, 1).await.unwrap(), "");

    let reply = d.handle(1, "/total").await;
    assert!(text(&reply).contains("Total spent this month: 60"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commits_land_in_distinct_rows() {
    let (backend, d) = wire();
    let label = moneta_bot::ledger::month_label(Local::now());

    // Walk both users to the brink of finalization.
    for (user, amount) in [(1, "100"), (2, "250")] {
        d.handle(user, "/add").await;
        d.handle(user, amount).await;
        d.handle(user, "Groceries").await;
    }

    // Fire both finalizing turns concurrently.
    let d1 = d.clone();
    let d2 = d.clone();
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { d1.handle(1, "from alice").await }),
        tokio::spawn(async move { d2.handle(2, "from bob").await }),
    );
    assert!(text(&r1.unwrap()).contains("Added!"));
    assert!(text(&r2.unwrap()).contains("Added!"));

    // Both entries landed, in two distinct rows, and the total is their sum.
    let mut amounts = vec![
        backend.read_cell(&label, 2, 2).await.unwrap(),
        backend.read_cell(&label, 3, 2).await.unwrap(),
    ];
    amounts.sort();
    assert_eq!(amounts, vec!["100", "250"]);

    let reply = d.handle(1, "/total").await;
    assert!(text(&reply).contains("Total spent this month: 350"));
}

#[tokio::test]
async fn cancel_before_finalization_has_no_ledger_effect() {
    let (_backend, d) = wire();

    d.handle(1, "/add").await;
    d.handle(1, "999").await;
    d.handle(1, "Groceries").await;
    d.handle(1, "/cancel").await;

    let reply = d.handle(1, "/total").await;
    assert!(text(&reply).contains("Total spent this month: 0"));
}

#[tokio::test]
async fn unknown_user_never_reaches_the_ledger() {
    let (backend, d) = wire();

    for turn in ["/add", "120", "/total", "/limit 500", "/export"] {
        let reply = d.handle(42, turn).await;
        assert!(text(&reply).contains("do not know who you are"));
    }

    // No partition was ever created on the unknown user's behalf.
    let label = moneta_bot::ledger::month_label(Local::now());
    assert!(!backend.worksheet_exists(&label).await.unwrap());
}

#[tokio::test]
async fn limit_shapes_the_totals_report() {
    let (_backend, d) = wire();

    drive_entry(&d, 1, "120", "Groceries", "weekly shop").await;
    d.handle(1, "/limit 500").await;

    let reply = d.handle(1, "/total").await;
    let msg = text(&reply);
    assert!(msg.contains("Total spent this month: 120"));
    assert!(msg.contains("Limit: 500"));
    assert!(msg.contains("Remaining: 380"));
}

#[tokio::test]
async fn month_rollover_isolates_partitions() {
    let cfg = test_config();
    let backend = MemoryBackend::new();
    let store = LedgerStore::new(LedgerBackend::Memory(backend.clone()), &cfg.ledger);

    let jan = Local.with_ymd_and_hms(2026, 1, 20, 12, 0, 0).unwrap();
    let feb = Local.with_ymd_and_hms(2026, 2, 2, 9, 0, 0).unwrap();
    let draft = EntryDraft {
        amount: 100,
        category: "Groceries".into(),
        person: "Alice".into(),
        description: "x".into(),
    };

    store.append_entry_at(&draft, jan).await.unwrap();
    let totals = store.append_entry_at(&draft, feb).await.unwrap();

    assert_eq!(totals.total, 100);
    assert_eq!(store.total_and_limit_at(jan).await.unwrap().total, 100);
    assert_eq!(backend.read_cell("February 2026", 2, 2).await.unwrap(), "100");
    assert_eq!(backend.read_cell("January 2026", 3, 1).await.unwrap(), "");
}
