use daicho_core::notify::error::NotifyError;
use daicho_core::notify::port::{NotificationOutbox, Notifier};
use std::sync::Arc;
use tracing::{info, warn};

/// 单轮投递最多消费的 outbox 条数。
const BATCH_SIZE: u32 = 32;

/// # Summary
/// 通知 outbox 的消费者。资金事务只负责把通知写进 outbox；
/// relay 周期性取出未投递记录并尽力送达：
/// 成功标记投递，失败记录原因并留待下一轮重试。
/// 投递的任何失败都不会、也不可能回滚已提交的资金变动。
pub struct OutboxRelay {
    outbox: Arc<dyn NotificationOutbox>,
    notifier: Arc<dyn Notifier>,
}

impl OutboxRelay {
    pub fn new(outbox: Arc<dyn NotificationOutbox>, notifier: Arc<dyn Notifier>) -> Self {
        Self { outbox, notifier }
    }

    /// # Logic
    /// 1. 按入队顺序取一批未投递记录。
    /// 2. 逐条投递；主题前缀收件人，供运营侧转交。
    /// 3. 失败告警并累加尝试计数，继续处理后续记录（单条失败不阻塞整批）。
    ///
    /// 返回本轮成功投递的条数。
    pub async fn run_once(&self) -> Result<usize, NotifyError> {
        let pending = self.outbox.pending(BATCH_SIZE).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut delivered = 0;
        for entry in pending {
            let subject = format!("[user:{}] {}", entry.user_id, entry.subject);
            match self.notifier.notify(&subject, &entry.body).await {
                Ok(()) => {
                    self.outbox.mark_delivered(entry.id).await?;
                    delivered += 1;
                }
                Err(e) => {
                    warn!(
                        outbox_id = entry.id,
                        user_id = entry.user_id.0,
                        attempts = entry.attempts + 1,
                        error = %e,
                        "Notification delivery failed, will retry"
                    );
                    self.outbox.mark_failed(entry.id, &e.to_string()).await?;
                }
            }
        }

        if delivered > 0 {
            info!(delivered, "Outbox notifications delivered");
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use daicho_core::common::UserId;
    use daicho_core::notify::port::OutboxEntry;
    use std::sync::Mutex;

    /// 内存 outbox 替身
    #[derive(Default)]
    struct MemOutbox {
        entries: Mutex<Vec<OutboxEntry>>,
    }

    impl MemOutbox {
        fn push(&self, id: i64, subject: &str) {
            self.entries.lock().unwrap().push(OutboxEntry {
                id,
                user_id: UserId(7),
                subject: subject.to_string(),
                body: "body".to_string(),
                attempts: 0,
                last_error: None,
                delivered_at: None,
                created_at: Utc::now(),
            });
        }
    }

    #[async_trait]
    impl NotificationOutbox for MemOutbox {
        async fn pending(&self, limit: u32) -> Result<Vec<OutboxEntry>, NotifyError> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.delivered_at.is_none())
                .take(limit as usize)
                .cloned()
                .collect())
        }
        async fn mark_delivered(&self, id: i64) -> Result<(), NotifyError> {
            for e in self.entries.lock().unwrap().iter_mut() {
                if e.id == id {
                    e.delivered_at = Some(Utc::now());
                }
            }
            Ok(())
        }
        async fn mark_failed(&self, id: i64, reason: &str) -> Result<(), NotifyError> {
            for e in self.entries.lock().unwrap().iter_mut() {
                if e.id == id {
                    e.attempts += 1;
                    e.last_error = Some(reason.to_string());
                }
            }
            Ok(())
        }
    }

    /// 前 N 次调用失败的投递替身
    struct FlakyNotifier {
        failures_left: Mutex<u32>,
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn notify(&self, _subject: &str, _content: &str) -> Result<(), NotifyError> {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(NotifyError::Network("connection reset".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_delivery_is_recorded_and_retried() {
        let outbox = Arc::new(MemOutbox::default());
        outbox.push(1, "入金完了のお知らせ");

        let relay = OutboxRelay::new(
            outbox.clone(),
            Arc::new(FlakyNotifier {
                failures_left: Mutex::new(1),
            }),
        );

        // 第一轮失败：记录原因，条目保留
        assert_eq!(relay.run_once().await.unwrap(), 0);
        {
            let entries = outbox.entries.lock().unwrap();
            assert_eq!(entries[0].attempts, 1);
            assert!(entries[0].last_error.as_deref().unwrap().contains("connection reset"));
            assert!(entries[0].delivered_at.is_none());
        }

        // 第二轮重试成功
        assert_eq!(relay.run_once().await.unwrap(), 1);
        assert!(outbox.entries.lock().unwrap()[0].delivered_at.is_some());
    }

    #[tokio::test]
    async fn one_bad_entry_does_not_block_the_batch() {
        let outbox = Arc::new(MemOutbox::default());
        outbox.push(1, "first");
        outbox.push(2, "second");

        // 只有第一条失败
        let relay = OutboxRelay::new(
            outbox.clone(),
            Arc::new(FlakyNotifier {
                failures_left: Mutex::new(1),
            }),
        );

        assert_eq!(relay.run_once().await.unwrap(), 1);
        let entries = outbox.entries.lock().unwrap();
        assert!(entries[0].delivered_at.is_none());
        assert!(entries[1].delivered_at.is_some());
    }

    #[tokio::test]
    async fn empty_outbox_is_a_cheap_noop() {
        let outbox = Arc::new(MemOutbox::default());
        let relay = OutboxRelay::new(
            outbox,
            Arc::new(FlakyNotifier {
                failures_left: Mutex::new(0),
            }),
        );
        assert_eq!(relay.run_once().await.unwrap(), 0);
    }
}
