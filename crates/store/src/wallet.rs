use async_trait::async_trait;
use chrono::Utc;
use daicho_core::common::UserId;
use daicho_core::ledger::entity::Wallet;
use daicho_core::ledger::port::{LedgerError, WalletLedger};
use dashmap::DashMap;
use rust_decimal::Decimal;
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::error;

/// # Summary
/// 钱包账本的 SQLite 实现，余额恒等式的唯一守护者。
///
/// # Invariants
/// - 每个操作 = 一个事务，事务全程持有该钱包的异步互斥锁（单写者纪律）。
/// - 每次变动后重读三项余额并复核 `total == available + locked`、`locked >= 0`；
///   违反即回滚、停写该钱包并发出 error 级告警。
/// - 被停写的钱包后续操作一律以 `WalletHalted` 快速失败，直到人工介入。
#[derive(Clone)]
pub struct SqliteWalletLedger {
    pool: SqlitePool,
    /// 钱包粒度的写锁表
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
    /// 恒等式故障后被停写的钱包及其故障描述
    halted: Arc<DashMap<i64, String>>,
}

impl SqliteWalletLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: Arc::new(DashMap::new()),
            halted: Arc::new(DashMap::new()),
        }
    }

    /// # Logic
    /// 获取（必要时创建）目标钱包的互斥锁并加锁。
    /// 出入金/结算存储在开启事务前也经由此方法串行化同钱包操作。
    pub(crate) async fn lock_wallet(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(user_id.0)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// 停写检查。恒等式故障过的钱包拒绝一切后续写入。
    pub(crate) fn ensure_not_halted(&self, user_id: UserId) -> Result<(), LedgerError> {
        if self.halted.contains_key(&user_id.0) {
            return Err(LedgerError::WalletHalted(user_id));
        }
        Ok(())
    }

    /// 事务内创建零余额钱包（注册流程专用）。
    pub(crate) async fn create_wallet_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: UserId,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO wallets (user_id, balance_total, balance_available, balance_locked, updated_at) \
             VALUES (?, '0', '0', '0', ?)",
        )
        .bind(user_id.0)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(())
    }

    /// 事务内读取三项余额。
    pub(crate) async fn fetch_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: UserId,
    ) -> Result<(Decimal, Decimal, Decimal), LedgerError> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT balance_total, balance_available, balance_locked FROM wallets WHERE user_id = ?",
        )
        .bind(user_id.0)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        let (t, a, l) = row.ok_or(LedgerError::WalletNotFound(user_id))?;
        Ok((
            parse_balance(&t)?,
            parse_balance(&a)?,
            parse_balance(&l)?,
        ))
    }

    /// 事务内写回三项余额并追加账本流水。
    async fn write_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: UserId,
        total: Decimal,
        available: Decimal,
        locked: Decimal,
        action: &str,
        available_change: Decimal,
        locked_change: Decimal,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            "UPDATE wallets SET balance_total = ?, balance_available = ?, balance_locked = ?, updated_at = ? \
             WHERE user_id = ?",
        )
        .bind(total.to_string())
        .bind(available.to_string())
        .bind(locked.to_string())
        .bind(Utc::now())
        .bind(user_id.0)
        .execute(&mut *conn)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        sqlx::query(
            "INSERT INTO wallet_ledger (user_id, action_type, available_change, locked_change, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id.0)
        .bind(action)
        .bind(available_change.to_string())
        .bind(locked_change.to_string())
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        Ok(())
    }

    /// # Logic
    /// 变动后的恒等式复核：重读落库值并检查
    /// `total == available + locked` 且 `locked >= 0`。
    /// 违反时停写该钱包、发出告警并返回 `InvariantViolation`，
    /// 上层事务随错误回滚。
    pub(crate) async fn verify_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: UserId,
    ) -> Result<(), LedgerError> {
        let (total, available, locked) = self.fetch_tx(conn, user_id).await?;
        if total != available + locked || locked < Decimal::ZERO {
            let reason = format!(
                "total={} available={} locked={}",
                total, available, locked
            );
            self.halted.insert(user_id.0, reason);
            error!(
                user_id = user_id.0,
                %total,
                %available,
                %locked,
                "FATAL: wallet balance invariant violated, halting writes"
            );
            return Err(LedgerError::InvariantViolation {
                user_id,
                total,
                available,
                locked,
            });
        }
        Ok(())
    }

    /// 事务内入账（入金完成 / 结算盈亏，`amount` 可为负）。
    pub(crate) async fn credit_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: UserId,
        amount: Decimal,
        action: &str,
    ) -> Result<(), LedgerError> {
        let (total, available, locked) = self.fetch_tx(conn, user_id).await?;
        self.write_tx(
            conn,
            user_id,
            total + amount,
            available + amount,
            locked,
            action,
            amount,
            Decimal::ZERO,
        )
        .await?;
        self.verify_tx(conn, user_id).await
    }

    /// 事务内冻结（出金申请时保留资金）。可用不足直接拒绝，无任何变动。
    pub(crate) async fn lock_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: UserId,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        let (total, available, locked) = self.fetch_tx(conn, user_id).await?;
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                actual: available,
            });
        }
        self.write_tx(
            conn,
            user_id,
            total,
            available - amount,
            locked + amount,
            "LockFunds",
            -amount,
            amount,
        )
        .await?;
        self.verify_tx(conn, user_id).await
    }

    /// 事务内解冻结算。`commit = true`：资金扣出系统（出金批准）；
    /// `commit = false`：归还可用（出金取消）。
    pub(crate) async fn settle_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: UserId,
        amount: Decimal,
        commit: bool,
        action: &str,
    ) -> Result<(), LedgerError> {
        let (total, available, locked) = self.fetch_tx(conn, user_id).await?;
        if commit {
            self.write_tx(
                conn,
                user_id,
                total - amount,
                available,
                locked - amount,
                action,
                Decimal::ZERO,
                -amount,
            )
            .await?;
        } else {
            self.write_tx(
                conn,
                user_id,
                total,
                available + amount,
                locked - amount,
                action,
                amount,
                -amount,
            )
            .await?;
        }
        self.verify_tx(conn, user_id).await
    }
}

fn parse_balance(raw: &str) -> Result<Decimal, LedgerError> {
    Decimal::from_str(raw).map_err(|e| LedgerError::Storage(format!("corrupt balance '{}': {}", raw, e)))
}

#[async_trait]
impl WalletLedger for SqliteWalletLedger {
    async fn credit(&self, user_id: UserId, amount: Decimal) -> Result<(), LedgerError> {
        let _guard = self.lock_wallet(user_id).await;
        self.ensure_not_halted(user_id)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        self.credit_tx(&mut tx, user_id, amount, "Credit").await?;
        tx.commit()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))
    }

    async fn lock(&self, user_id: UserId, amount: Decimal) -> Result<(), LedgerError> {
        let _guard = self.lock_wallet(user_id).await;
        self.ensure_not_halted(user_id)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        self.lock_tx(&mut tx, user_id, amount).await?;
        tx.commit()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))
    }

    async fn settle_lock(
        &self,
        user_id: UserId,
        amount: Decimal,
        commit: bool,
    ) -> Result<(), LedgerError> {
        let _guard = self.lock_wallet(user_id).await;
        self.ensure_not_halted(user_id)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        let action = if commit { "SettleCommit" } else { "SettleRelease" };
        self.settle_tx(&mut tx, user_id, amount, commit, action)
            .await?;
        tx.commit()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))
    }

    async fn wallet(&self, user_id: UserId) -> Result<Wallet, LedgerError> {
        let row: Option<(String, String, String, chrono::DateTime<Utc>)> = sqlx::query_as(
            "SELECT balance_total, balance_available, balance_locked, updated_at \
             FROM wallets WHERE user_id = ?",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        let (t, a, l, updated_at) = row.ok_or(LedgerError::WalletNotFound(user_id))?;
        Ok(Wallet {
            user_id,
            balance_total: parse_balance(&t)?,
            balance_available: parse_balance(&a)?,
            balance_locked: parse_balance(&l)?,
            updated_at,
        })
    }
}
