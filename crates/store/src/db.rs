use daicho_core::ledger::port::LedgerError;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::fs;

/// 默认后台数据库文件名
const BACKOFFICE_DB: &str = "backoffice.db";

/// 在配置的数据根目录下打开中心后台数据库。
pub async fn open() -> Result<SqlitePool, LedgerError> {
    open_in(&crate::config::get_root_dir()).await
}

/// # Summary
/// 打开（必要时创建）指定目录下的后台数据库并初始化全部表结构。
/// 集成测试用各自的临时目录调用此入口实现数据隔离。
///
/// # Logic
/// 1. 确保数据目录存在。
/// 2. WAL 日志 + busy_timeout，`max_connections = 1`：
///    所有事务在连接层串行，检查后写入（check-then-act）不存在并发窗口。
/// 3. 执行 DDL（`IF NOT EXISTS`，幂等）。
pub async fn open_in(root: &std::path::Path) -> Result<SqlitePool, LedgerError> {
    fs::create_dir_all(root)
        .map_err(|e| LedgerError::Storage(format!("Failed to create data dir: {}", e)))?;

    let options = SqliteConnectOptions::new()
        .filename(root.join(BACKOFFICE_DB))
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(10));

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            group_id INTEGER,
            created_at DATETIME NOT NULL
        );

        CREATE TABLE IF NOT EXISTS wallets (
            user_id INTEGER PRIMARY KEY,
            balance_total TEXT NOT NULL,
            balance_available TEXT NOT NULL,
            balance_locked TEXT NOT NULL,
            updated_at DATETIME NOT NULL
        );

        CREATE TABLE IF NOT EXISTS wallet_ledger (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            action_type TEXT NOT NULL,
            available_change TEXT NOT NULL,
            locked_change TEXT NOT NULL,
            created_at DATETIME NOT NULL
        );

        CREATE TABLE IF NOT EXISTS transfers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            method TEXT NOT NULL,
            currency TEXT,
            amount TEXT NOT NULL,
            crypto_amount TEXT,
            status TEXT NOT NULL,
            request_key TEXT UNIQUE,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_transfers_user_created
            ON transfers (user_id, created_at);

        CREATE TABLE IF NOT EXISTS deposit_addresses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            currency TEXT NOT NULL,
            address TEXT NOT NULL,
            memo_tag TEXT,
            used INTEGER NOT NULL DEFAULT 0,
            user_id INTEGER,
            created_at DATETIME NOT NULL,
            UNIQUE (currency, address)
        );

        CREATE TABLE IF NOT EXISTS trades (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_kind TEXT NOT NULL,
            owner_user_id INTEGER,
            group_id INTEGER NOT NULL,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL,
            size TEXT NOT NULL,
            entry_price TEXT NOT NULL,
            close_price TEXT,
            profit TEXT NOT NULL,
            opened_at DATETIME NOT NULL,
            closed_at DATETIME
        );

        CREATE INDEX IF NOT EXISTS idx_trades_open
            ON trades (group_id, symbol, close_price);

        CREATE TABLE IF NOT EXISTS kyc_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            status INTEGER NOT NULL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        );

        CREATE TABLE IF NOT EXISTS autotrade_configs (
            group_id INTEGER PRIMARY KEY,
            params TEXT NOT NULL,
            updated_at DATETIME NOT NULL
        );

        CREATE TABLE IF NOT EXISTS notification_outbox (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            subject TEXT NOT NULL,
            body TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            delivered_at DATETIME,
            created_at DATETIME NOT NULL
        );
        "#,
    )
    .execute(&pool)
    .await
    .map_err(|e| LedgerError::Storage(e.to_string()))?;

    Ok(pool)
}
