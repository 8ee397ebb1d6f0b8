use async_trait::async_trait;
use chrono::Utc;
use daicho_core::common::UserId;
use daicho_core::kyc::port::{KycError, KycGate};
use sqlx::{SqliteConnection, SqlitePool};

/// # Summary
/// KYC 门卫的 SQLite 实现。以用户最新一条 `kyc_requests` 记录为准：
/// 从未提交过的用户等级视为 0。
pub struct SqliteKycGate {
    pool: SqlitePool,
}

impl SqliteKycGate {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// 事务内强制写入 KYC 等级（出金取消降级为 4 时，
/// 必须与资金归还发生在同一事务）。最新记录存在则就地更新，
/// 否则补插一条记录。
pub(crate) async fn force_status_tx(
    conn: &mut SqliteConnection,
    user_id: UserId,
    status: u8,
) -> Result<(), sqlx::Error> {
    let latest: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM kyc_requests WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .bind(user_id.0)
    .fetch_optional(&mut *conn)
    .await?;

    match latest {
        Some((id,)) => {
            sqlx::query("UPDATE kyc_requests SET status = ?, updated_at = ? WHERE id = ?")
                .bind(i64::from(status))
                .bind(Utc::now())
                .bind(id)
                .execute(&mut *conn)
                .await?;
        }
        None => {
            sqlx::query(
                "INSERT INTO kyc_requests (user_id, status, created_at, updated_at) VALUES (?, ?, ?, ?)",
            )
            .bind(user_id.0)
            .bind(i64::from(status))
            .bind(Utc::now())
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

#[async_trait]
impl KycGate for SqliteKycGate {
    async fn status(&self, user_id: UserId) -> Result<u8, KycError> {
        let latest: Option<(i64,)> = sqlx::query_as(
            "SELECT status FROM kyc_requests WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| KycError::Storage(e.to_string()))?;

        Ok(latest
            .map(|(s,)| u8::try_from(s).unwrap_or(0))
            .unwrap_or(0))
    }

    async fn set_status(&self, user_id: UserId, status: u8) -> Result<(), KycError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| KycError::Storage(e.to_string()))?;
        force_status_tx(&mut tx, user_id, status)
            .await
            .map_err(|e| KycError::Storage(e.to_string()))?;
        tx.commit()
            .await
            .map_err(|e| KycError::Storage(e.to_string()))
    }
}
