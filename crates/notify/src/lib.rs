//! # `daicho-notify` - 通知投递层
//!
//! `Notifier` 端口的具体渠道实现（Telegram Bot / 日志兜底），
//! 以及消费通知 outbox 的 relay。投递是尽力而为：
//! 失败被记录并由 outbox 重试，绝不反向影响资金事务。

pub mod log;
pub mod relay;
pub mod telegram;
