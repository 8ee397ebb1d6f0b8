use crate::wallet::SqliteWalletLedger;
use async_trait::async_trait;
use chrono::Utc;
use daicho_core::common::{GroupId, UserId};
use daicho_core::ledger::port::{LedgerError, UserRegistry};
use sqlx::SqlitePool;
use tracing::info;

/// # Summary
/// 用户注册的 SQLite 实现。用户行与零余额钱包在同一事务中创建：
/// 不存在"有用户无钱包"的中间态。
pub struct SqliteUserRegistry {
    pool: SqlitePool,
    wallet: SqliteWalletLedger,
}

impl SqliteUserRegistry {
    pub fn new(pool: SqlitePool, wallet: SqliteWalletLedger) -> Self {
        Self { pool, wallet }
    }
}

#[async_trait]
impl UserRegistry for SqliteUserRegistry {
    async fn register(
        &self,
        name: &str,
        group_id: Option<GroupId>,
    ) -> Result<UserId, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        let result = sqlx::query("INSERT INTO users (name, group_id, created_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(group_id.map(|g| g.0))
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        let user_id = UserId(result.last_insert_rowid());
        self.wallet.create_wallet_tx(&mut tx, user_id).await?;

        tx.commit()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        info!(user_id = user_id.0, name, "Registered user with zero-balance wallet");
        Ok(user_id)
    }
}
