use crate::trade::entity::Side;
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// # Summary
/// 行情查询错误。"标的不存在"与"网络瞬断"必须可区分：
/// 前者是配置问题不可重试，后者允许调用方稍后重试。
#[derive(Error, Debug)]
pub enum PriceError {
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),
    /// 网络不可达或请求超时（可重试）
    #[error("Price feed unreachable: {0}")]
    Unreachable(String),
    #[error("Malformed feed response: {0}")]
    Malformed(String),
}

/// # Summary
/// 行情源端口。开仓取市场价，平仓取按点差修正后的结算价。
///
/// # Invariants
/// - 实现必须设置有界超时：行情失败时上层事务中止且不留下任何半成品状态。
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// 标的当前市场价（开仓价）。
    async fn price(&self, symbol: &str) -> Result<Decimal, PriceError>;

    /// 结算价：BUY 方向平仓按 Ask（市场价 + 点差），SELL 按 Bid（市场价 - 点差）。
    async fn settlement_price(&self, symbol: &str, side: Side) -> Result<Decimal, PriceError>;
}
