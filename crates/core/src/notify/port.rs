use super::error::NotifyError;
use crate::common::UserId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// # Summary
/// 发送通知到外部渠道的接口定义。
///
/// # Invariants
/// - 实现必须是 `Send` 和 `Sync` 以支持并发调用。
/// - 投递是尽力而为：失败必须以 `NotifyError` 浮出，由 relay 记录并重试。
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 发送带有主题和内容的通知。
    async fn notify(&self, subject: &str, content: &str) -> Result<(), NotifyError>;
}

/// # Summary
/// 通知 outbox 中的一条待投递记录。
/// 记录在资金事务内入队（与余额变动同事务落库），
/// 由 relay 异步投递：投递失败累加 `attempts` 并记录 `last_error`，
/// 成功写入 `delivered_at`。
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: i64,
    pub user_id: UserId,
    pub subject: String,
    pub body: String,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// # Summary
/// 通知 outbox 端口。入队不在此端口上——它只能发生在
/// 资金事务内部（存储层职责）；此端口负责投递侧的消费。
#[async_trait]
pub trait NotificationOutbox: Send + Sync {
    /// 按入队顺序取最多 `limit` 条未投递记录。
    async fn pending(&self, limit: u32) -> Result<Vec<OutboxEntry>, NotifyError>;

    /// 标记一条记录投递成功。
    async fn mark_delivered(&self, id: i64) -> Result<(), NotifyError>;

    /// 标记一条记录投递失败（累加尝试次数并记录原因）。
    async fn mark_failed(&self, id: i64, reason: &str) -> Result<(), NotifyError>;
}
