//! # `daicho-core` - 后台清算领域核心
//!
//! 本 crate 定义交易平台后台（Back Office）的领域实体、端口抽象与错误模型：
//! 钱包账本、出入金状态机、入金地址池、跟单（PAM 配分）持仓与平仓结算。
//!
//! ## 架构职责
//! - 纯领域层：不依赖任何数据库、HTTP 或外部 SDK
//! - 所有基础设施（SQLite 存储、行情源、通知渠道）通过 `async_trait` 端口注入
//! - 金额一律使用 `rust_decimal::Decimal` 精确运算，杜绝浮点误差

pub mod common;
pub mod config;
pub mod kyc;
pub mod ledger;
pub mod notify;
pub mod price;
pub mod trade;
pub mod transfer;
