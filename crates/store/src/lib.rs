//! # `daicho-store` - SQLite 持久化层
//!
//! 中心化的 SQLite 数据库（`backoffice.db`）承载钱包、出入金流水、
//! 入金地址池、持仓、KYC 记录、用户/分组与通知 outbox。
//!
//! ## 事务纪律
//! - 每个改变余额的操作 = 一个 SQL 事务，覆盖其全部读与写
//! - 状态迁移一律条件更新（compare-and-swap），零行生效即状态冲突
//! - 连接池上限为 1：写事务天然串行，读写竞态被连接层消灭
//! - 金额列以 TEXT 落库，运算只发生在 `rust_decimal::Decimal` 上

pub mod address;
pub mod autotrade;
pub mod config;
pub mod db;
pub mod kyc;
pub mod outbox;
pub mod trade;
pub mod transfer;
pub mod user;
pub mod wallet;
