use async_trait::async_trait;
use chrono::{DateTime, Utc};
use daicho_core::common::UserId;
use daicho_core::transfer::entity::{Currency, DepositAddress};
use daicho_core::transfer::port::{AddressPool, TransferError};
use sqlx::{SqliteConnection, SqlitePool};

/// # Summary
/// 事务内独占分配一条未使用的入金地址。
///
/// # Logic
/// 1. 取该币种最老的一条未使用、未分配地址（插入序）。
/// 2. 条件更新认领（`used = 0` 守护），零行生效说明认领被并发抢走。
///    本库连接池上限为 1，写事务串行，正常运行时不可能走到该分支。
/// 3. 池中无可用地址 → `AddressPoolExhausted`：运营必须补充，绝不静默重试。
pub(crate) async fn allocate_tx(
    conn: &mut SqliteConnection,
    currency: Currency,
    user_id: UserId,
) -> Result<DepositAddress, TransferError> {
    let row: Option<(i64, String, Option<String>, DateTime<Utc>)> = sqlx::query_as(
        "SELECT id, address, memo_tag, created_at FROM deposit_addresses \
         WHERE currency = ? AND used = 0 AND user_id IS NULL \
         ORDER BY id ASC LIMIT 1",
    )
    .bind(currency.to_string())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| TransferError::Storage(e.to_string()))?;

    let Some((id, address, memo_tag, created_at)) = row else {
        return Err(TransferError::AddressPoolExhausted(currency));
    };

    let claimed = sqlx::query("UPDATE deposit_addresses SET used = 1, user_id = ? WHERE id = ? AND used = 0")
        .bind(user_id.0)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| TransferError::Storage(e.to_string()))?;

    if claimed.rows_affected() != 1 {
        return Err(TransferError::Storage(format!(
            "deposit address {} claimed concurrently",
            id
        )));
    }

    Ok(DepositAddress {
        id,
        currency,
        address,
        memo_tag,
        used: true,
        user_id: Some(user_id),
        created_at,
    })
}

/// # Summary
/// 入金地址池的运营端口实现：补充库存与余量查询。
pub struct SqliteAddressPool {
    pool: SqlitePool,
}

impl SqliteAddressPool {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AddressPool for SqliteAddressPool {
    async fn add_address(
        &self,
        currency: Currency,
        address: &str,
        memo_tag: Option<&str>,
    ) -> Result<DepositAddress, TransferError> {
        if address.trim().is_empty() {
            return Err(TransferError::Validation("address must not be empty".into()));
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO deposit_addresses (currency, address, memo_tag, used, user_id, created_at) \
             VALUES (?, ?, ?, 0, NULL, ?)",
        )
        .bind(currency.to_string())
        .bind(address)
        .bind(memo_tag)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                TransferError::Validation(format!("address already registered: {} {}", currency, address))
            }
            _ => TransferError::Storage(e.to_string()),
        })?;

        Ok(DepositAddress {
            id: result.last_insert_rowid(),
            currency,
            address: address.to_string(),
            memo_tag: memo_tag.map(|s| s.to_string()),
            used: false,
            user_id: None,
            created_at: now,
        })
    }

    async fn available_count(&self, currency: Currency) -> Result<u64, TransferError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM deposit_addresses WHERE currency = ? AND used = 0 AND user_id IS NULL",
        )
        .bind(currency.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| TransferError::Storage(e.to_string()))?;

        Ok(u64::try_from(count).unwrap_or(0))
    }
}

// 供 transfer 集成测试直接断言地址行状态
pub async fn assigned_user(
    pool: &SqlitePool,
    currency: Currency,
    address: &str,
) -> Result<Option<UserId>, TransferError> {
    let row: Option<(Option<i64>,)> =
        sqlx::query_as("SELECT user_id FROM deposit_addresses WHERE currency = ? AND address = ?")
            .bind(currency.to_string())
            .bind(address)
            .fetch_optional(pool)
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;

    Ok(row.and_then(|(uid,)| uid.map(UserId)))
}
