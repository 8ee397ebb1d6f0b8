//! # `daicho-transfer` - 出入金状态机服务
//!
//! 在存储端口之上编排出入金生命周期：
//! 请求校验、KYC 门禁、状态迁移的触发。
//! 原子性（CAS + 余额变动 + 通知入队同事务）由 `daicho-store` 承担，
//! 本 crate 只做编排与拒绝，自身不持有任何可变状态。

pub mod service;
