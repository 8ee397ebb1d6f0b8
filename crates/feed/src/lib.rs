//! # `daicho-feed` - 行情源适配层
//!
//! `PriceSource` 端口的 Binance REST 实现：
//! 开仓取现货最新价，平仓价按运营配置的每标的点差修正（BUY 平仓按 Ask，
//! SELL 平仓按 Bid）。所有请求带有界超时，网络失败与"标的不存在"
//! 以不同错误浮出，供上层决定是否重试。

pub mod binance;
