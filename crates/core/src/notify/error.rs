use thiserror::Error;

/// # Summary
/// 通知链路错误枚举。投递失败只影响 outbox 的重试计数，
/// 永远不会传播回资金事务。
#[derive(Error, Debug)]
pub enum NotifyError {
    /// 网络连接或传输错误
    #[error("Network error: {0}")]
    Network(String),

    /// 配置错误 (如缺少 Token)
    #[error("Configuration error: {0}")]
    Config(String),

    /// 推送平台返回的错误 (如 Telegram API Error)
    #[error("Platform error: {0}")]
    Platform(String),

    /// outbox 存储读写失败
    #[error("Outbox storage error: {0}")]
    Outbox(String),
}
