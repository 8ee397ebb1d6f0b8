use crate::wallet::SqliteWalletLedger;
use crate::{address, kyc, outbox};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use daicho_core::common::UserId;
use daicho_core::kyc::port::KYC_LEVEL_REVERIFY;
use daicho_core::transfer::entity::{
    Currency, Transfer, TransferId, TransferKind, TransferMethod, TransferStatus,
};
use daicho_core::transfer::notice;
use daicho_core::transfer::port::{NewDeposit, TransferError, TransferStore};
use rust_decimal::Decimal;
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use tracing::info;

/// # Summary
/// 出入金流水存储的 SQLite 实现。状态机的原子性落在这里：
/// 每个迁移 = 一个事务，内含条件更新（CAS）、余额变动与通知入队。
///
/// # Invariants
/// - 状态迁移只用 `UPDATE ... WHERE id = ? AND status = ?`；零行生效即状态冲突，
///   事务内不产生任何其他写入。
/// - 涉及钱包的迁移在开启事务前先取得该钱包的互斥锁（账本的单写者纪律）。
pub struct SqliteTransferStore {
    pool: SqlitePool,
    wallet: SqliteWalletLedger,
}

impl SqliteTransferStore {
    pub fn new(pool: SqlitePool, wallet: SqliteWalletLedger) -> Self {
        Self { pool, wallet }
    }

    /// 事务内按 ID 读取流水。
    async fn get_tx(
        &self,
        conn: &mut SqliteConnection,
        id: TransferId,
    ) -> Result<Transfer, TransferError> {
        let row: Option<TransferRow> = sqlx::query_as(SELECT_TRANSFER)
            .bind(id.0)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;
        row.map(row_to_transfer).transpose()?.ok_or(TransferError::NotFound(id))
    }

    /// # Logic
    /// 条件迁移状态。零行生效时重读当前状态构造 `StateConflict`
    /// （行已消失则报 `NotFound`），事务随错误整体回滚。
    async fn transition_tx(
        &self,
        conn: &mut SqliteConnection,
        id: TransferId,
        from: TransferStatus,
        to: TransferStatus,
    ) -> Result<(), TransferError> {
        let updated = sqlx::query("UPDATE transfers SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(to.to_string())
            .bind(Utc::now())
            .bind(id.0)
            .bind(from.to_string())
            .execute(&mut *conn)
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;

        if updated.rows_affected() != 1 {
            let current = self.get_tx(conn, id).await?;
            return Err(TransferError::StateConflict {
                id,
                expected: from,
                found: current.status,
            });
        }
        Ok(())
    }
}

const SELECT_TRANSFER: &str = "SELECT id, user_id, kind, method, currency, amount, crypto_amount, \
     status, request_key, created_at, updated_at FROM transfers WHERE id = ?";

type TransferRow = (
    i64,
    i64,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    String,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn row_to_transfer(row: TransferRow) -> Result<Transfer, TransferError> {
    let (id, user_id, kind, method, currency, amount, crypto_amount, status, request_key, created_at, updated_at) =
        row;
    Ok(Transfer {
        id: TransferId(id),
        user_id: UserId(user_id),
        kind: TransferKind::from_str(&kind).map_err(TransferError::Storage)?,
        method: TransferMethod::from_str(&method).map_err(TransferError::Storage)?,
        currency: currency
            .map(|c| Currency::from_str(&c).map_err(TransferError::Storage))
            .transpose()?,
        amount: parse_amount(&amount)?,
        crypto_amount: crypto_amount.map(|a| parse_amount(&a)).transpose()?,
        status: TransferStatus::from_str(&status).map_err(TransferError::Storage)?,
        request_key,
        created_at,
        updated_at,
    })
}

fn parse_amount(raw: &str) -> Result<Decimal, TransferError> {
    Decimal::from_str(raw).map_err(|e| TransferError::Storage(format!("corrupt amount '{}': {}", raw, e)))
}

fn map_insert_error(e: sqlx::Error, request_key: &Option<String>) -> TransferError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            TransferError::Duplicate(request_key.clone().unwrap_or_default())
        }
        _ => TransferError::Storage(e.to_string()),
    }
}

#[async_trait]
impl TransferStore for SqliteTransferStore {
    async fn create_deposit(&self, deposit: NewDeposit) -> Result<Transfer, TransferError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO transfers (user_id, kind, method, currency, amount, crypto_amount, status, request_key, created_at, updated_at) \
             VALUES (?, 'DEPOSIT', ?, ?, ?, ?, 'PENDING', ?, ?, ?)",
        )
        .bind(deposit.user_id.0)
        .bind(deposit.method.to_string())
        .bind(deposit.currency.map(|c| c.to_string()))
        .bind(deposit.amount.to_string())
        .bind(deposit.crypto_amount.map(|a| a.to_string()))
        .bind(&deposit.request_key)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, &deposit.request_key))?;

        let id = TransferId(result.last_insert_rowid());
        outbox::enqueue_tx(&mut tx, deposit.user_id, &notice::deposit_requested())
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;

        let created = self.get_tx(&mut tx, id).await?;
        tx.commit()
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;

        info!(transfer_id = id.0, user_id = deposit.user_id.0, method = %deposit.method, "Deposit requested");
        Ok(created)
    }

    async fn create_withdraw(
        &self,
        user_id: UserId,
        amount: Decimal,
        request_key: Option<String>,
    ) -> Result<Transfer, TransferError> {
        // 申请时刻即冻结：同一笔可用余额不可能被两次在途出金占用
        let _guard = self.wallet.lock_wallet(user_id).await;
        self.wallet.ensure_not_halted(user_id)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;

        self.wallet.lock_tx(&mut tx, user_id, amount).await?;

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO transfers (user_id, kind, method, currency, amount, crypto_amount, status, request_key, created_at, updated_at) \
             VALUES (?, 'WITHDRAW', 'JPY', NULL, ?, NULL, 'PENDING', ?, ?, ?)",
        )
        .bind(user_id.0)
        .bind(amount.to_string())
        .bind(&request_key)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, &request_key))?;

        let id = TransferId(result.last_insert_rowid());
        outbox::enqueue_tx(&mut tx, user_id, &notice::withdraw_requested())
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;

        let created = self.get_tx(&mut tx, id).await?;
        tx.commit()
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;

        info!(transfer_id = id.0, user_id = user_id.0, %amount, "Withdraw requested, funds locked");
        Ok(created)
    }

    async fn approve_deposit(&self, id: TransferId) -> Result<Transfer, TransferError> {
        let peek = self.get(id).await?;
        if peek.kind != TransferKind::Deposit {
            return Err(TransferError::Validation(format!(
                "transfer {} is not a deposit",
                id
            )));
        }

        match peek.method {
            TransferMethod::Jpy => {
                let _guard = self.wallet.lock_wallet(peek.user_id).await;
                self.wallet.ensure_not_halted(peek.user_id)?;

                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| TransferError::Storage(e.to_string()))?;

                self.transition_tx(&mut tx, id, TransferStatus::Pending, TransferStatus::Completed)
                    .await?;
                self.wallet
                    .credit_tx(&mut tx, peek.user_id, peek.amount, "DepositCompleted")
                    .await?;
                outbox::enqueue_tx(&mut tx, peek.user_id, &notice::deposit_completed())
                    .await
                    .map_err(|e| TransferError::Storage(e.to_string()))?;

                let updated = self.get_tx(&mut tx, id).await?;
                tx.commit()
                    .await
                    .map_err(|e| TransferError::Storage(e.to_string()))?;

                info!(transfer_id = id.0, user_id = peek.user_id.0, amount = %peek.amount, "JPY deposit approved and credited");
                Ok(updated)
            }
            TransferMethod::Crypto => {
                let currency = peek
                    .currency
                    .ok_or_else(|| TransferError::Validation("Currency missing".into()))?;

                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| TransferError::Storage(e.to_string()))?;

                self.transition_tx(&mut tx, id, TransferStatus::Pending, TransferStatus::Confirming)
                    .await?;
                let addr = address::allocate_tx(&mut tx, currency, peek.user_id).await?;
                outbox::enqueue_tx(&mut tx, peek.user_id, &notice::deposit_address_assigned(&addr))
                    .await
                    .map_err(|e| TransferError::Storage(e.to_string()))?;

                let updated = self.get_tx(&mut tx, id).await?;
                tx.commit()
                    .await
                    .map_err(|e| TransferError::Storage(e.to_string()))?;

                info!(
                    transfer_id = id.0,
                    user_id = peek.user_id.0,
                    %currency,
                    address = %addr.address,
                    "Crypto deposit approved, address assigned, awaiting on-chain confirmation"
                );
                Ok(updated)
            }
        }
    }

    async fn confirm_crypto_deposit(&self, id: TransferId) -> Result<Transfer, TransferError> {
        let peek = self.get(id).await?;
        if peek.kind != TransferKind::Deposit || peek.method != TransferMethod::Crypto {
            return Err(TransferError::Validation(format!(
                "transfer {} is not a crypto deposit",
                id
            )));
        }

        let _guard = self.wallet.lock_wallet(peek.user_id).await;
        self.wallet.ensure_not_halted(peek.user_id)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;

        self.transition_tx(&mut tx, id, TransferStatus::Confirming, TransferStatus::Completed)
            .await?;
        self.wallet
            .credit_tx(&mut tx, peek.user_id, peek.amount, "DepositCompleted")
            .await?;
        outbox::enqueue_tx(&mut tx, peek.user_id, &notice::deposit_completed())
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;

        let updated = self.get_tx(&mut tx, id).await?;
        tx.commit()
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;

        info!(transfer_id = id.0, user_id = peek.user_id.0, amount = %peek.amount, "Crypto deposit confirmed and credited");
        Ok(updated)
    }

    async fn approve_withdraw(&self, id: TransferId) -> Result<Transfer, TransferError> {
        let peek = self.get(id).await?;
        if peek.kind != TransferKind::Withdraw {
            return Err(TransferError::Validation(format!(
                "transfer {} is not a withdraw request",
                id
            )));
        }

        let _guard = self.wallet.lock_wallet(peek.user_id).await;
        self.wallet.ensure_not_halted(peek.user_id)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;

        self.transition_tx(&mut tx, id, TransferStatus::Pending, TransferStatus::Completed)
            .await?;
        // 资金离开系统：locked/total 同减，available 不变
        self.wallet
            .settle_tx(&mut tx, peek.user_id, peek.amount, true, "WithdrawApproved")
            .await?;
        outbox::enqueue_tx(&mut tx, peek.user_id, &notice::withdraw_approved())
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;

        let updated = self.get_tx(&mut tx, id).await?;
        tx.commit()
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;

        info!(transfer_id = id.0, user_id = peek.user_id.0, amount = %peek.amount, "Withdraw approved, funds debited");
        Ok(updated)
    }

    async fn cancel_withdraw(&self, id: TransferId) -> Result<Transfer, TransferError> {
        let peek = self.get(id).await?;
        if peek.kind != TransferKind::Withdraw {
            return Err(TransferError::Validation(format!(
                "transfer {} is not a withdraw request",
                id
            )));
        }

        let _guard = self.wallet.lock_wallet(peek.user_id).await;
        self.wallet.ensure_not_halted(peek.user_id)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;

        self.transition_tx(&mut tx, id, TransferStatus::Pending, TransferStatus::Canceled)
            .await?;
        self.wallet
            .settle_tx(&mut tx, peek.user_id, peek.amount, false, "WithdrawCanceled")
            .await?;
        // KYC 降级与资金归还同事务：要么都发生，要么都不发生
        kyc::force_status_tx(&mut tx, peek.user_id, KYC_LEVEL_REVERIFY)
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;
        outbox::enqueue_tx(&mut tx, peek.user_id, &notice::withdraw_canceled())
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;

        let updated = self.get_tx(&mut tx, id).await?;
        tx.commit()
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;

        info!(transfer_id = id.0, user_id = peek.user_id.0, "Withdraw canceled, funds released, KYC demoted");
        Ok(updated)
    }

    async fn get(&self, id: TransferId) -> Result<Transfer, TransferError> {
        let row: Option<TransferRow> = sqlx::query_as(SELECT_TRANSFER)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;
        row.map(row_to_transfer).transpose()?.ok_or(TransferError::NotFound(id))
    }

    async fn history(&self, user_id: UserId, limit: u32) -> Result<Vec<Transfer>, TransferError> {
        let rows: Vec<TransferRow> = sqlx::query_as(
            "SELECT id, user_id, kind, method, currency, amount, crypto_amount, \
             status, request_key, created_at, updated_at FROM transfers \
             WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(user_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TransferError::Storage(e.to_string()))?;

        rows.into_iter().map(row_to_transfer).collect()
    }
}
