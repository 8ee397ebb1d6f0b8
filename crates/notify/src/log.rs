use async_trait::async_trait;
use daicho_core::notify::error::NotifyError;
use daicho_core::notify::port::Notifier;
use tracing::info;

/// # Summary
/// 未配置外部渠道时的兜底投递器：把通知完整写进结构化日志。
/// 开发与测试环境默认使用，保证"失败必须被记录、绝不静默丢弃"
/// 在没有任何外部渠道时依然成立。
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, subject: &str, content: &str) -> Result<(), NotifyError> {
        info!(subject, content, "Notification (log channel)");
        Ok(())
    }
}
