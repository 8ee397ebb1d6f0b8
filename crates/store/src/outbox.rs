use async_trait::async_trait;
use chrono::{DateTime, Utc};
use daicho_core::common::UserId;
use daicho_core::notify::error::NotifyError;
use daicho_core::notify::port::{NotificationOutbox, OutboxEntry};
use daicho_core::transfer::notice::Notice;
use sqlx::{SqliteConnection, SqlitePool};

/// 资金事务内入队一条用户通知。与余额/状态变更同生共死：
/// 事务回滚则通知消失，事务提交则通知必达（由 relay 重试保证）。
pub(crate) async fn enqueue_tx(
    conn: &mut SqliteConnection,
    user_id: UserId,
    notice: &Notice,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO notification_outbox (user_id, subject, body, attempts, created_at) \
         VALUES (?, ?, ?, 0, ?)",
    )
    .bind(user_id.0)
    .bind(&notice.subject)
    .bind(&notice.body)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// # Summary
/// 通知 outbox 的 SQLite 实现（消费侧）。
pub struct SqliteOutbox {
    pool: SqlitePool,
}

impl SqliteOutbox {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

type OutboxRow = (
    i64,
    i64,
    String,
    String,
    i64,
    Option<String>,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
);

fn row_to_entry(row: OutboxRow) -> OutboxEntry {
    let (id, user_id, subject, body, attempts, last_error, delivered_at, created_at) = row;
    OutboxEntry {
        id,
        user_id: UserId(user_id),
        subject,
        body,
        attempts: u32::try_from(attempts).unwrap_or(0),
        last_error,
        delivered_at,
        created_at,
    }
}

#[async_trait]
impl NotificationOutbox for SqliteOutbox {
    async fn pending(&self, limit: u32) -> Result<Vec<OutboxEntry>, NotifyError> {
        let rows: Vec<OutboxRow> = sqlx::query_as(
            "SELECT id, user_id, subject, body, attempts, last_error, delivered_at, created_at \
             FROM notification_outbox WHERE delivered_at IS NULL ORDER BY id ASC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NotifyError::Outbox(e.to_string()))?;

        Ok(rows.into_iter().map(row_to_entry).collect())
    }

    async fn mark_delivered(&self, id: i64) -> Result<(), NotifyError> {
        sqlx::query("UPDATE notification_outbox SET delivered_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| NotifyError::Outbox(e.to_string()))?;
        Ok(())
    }

    async fn mark_failed(&self, id: i64, reason: &str) -> Result<(), NotifyError> {
        sqlx::query(
            "UPDATE notification_outbox SET attempts = attempts + 1, last_error = ? WHERE id = ?",
        )
        .bind(reason)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| NotifyError::Outbox(e.to_string()))?;
        Ok(())
    }
}
