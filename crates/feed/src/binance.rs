use async_trait::async_trait;
use daicho_core::config::FeedConfig;
use daicho_core::price::port::{PriceError, PriceSource};
use daicho_core::trade::entity::Side;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Binance 对"无效标的"返回的业务错误码。
const BINANCE_INVALID_SYMBOL: i64 = -1121;

/// # Summary
/// Binance 现货行情提供者实现。
///
/// # Invariants
/// - 使用 `reqwest` 异步客户端通讯，请求超时由配置给定（有界）。
/// - 结算点差表只在构造时读入；未配置点差的标的按零点差结算。
#[derive(Clone)]
pub struct BinanceFeed {
    client: Client,
    base_url: String,
    spreads: HashMap<String, Decimal>,
}

impl BinanceFeed {
    /// # Logic
    /// 1. 配置请求超时（行情失败必须在有界时间内浮出，供上层中止事务）。
    /// 2. 记录 base_url 与每标的结算点差。
    pub fn new(config: &FeedConfig) -> Result<Self, PriceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PriceError::Unreachable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            spreads: config.spreads.clone(),
        })
    }

    /// 结算价修正：BUY 平仓按 Ask（+点差），SELL 平仓按 Bid（-点差）。
    fn adjust(&self, symbol: &str, side: Side, market: Decimal) -> Decimal {
        let spread = self.spreads.get(symbol).copied().unwrap_or(Decimal::ZERO);
        match side {
            Side::Buy => market + spread,
            Side::Sell => market - spread,
        }
    }
}

/// Binance `/api/v3/ticker/price` 响应体。
#[derive(Deserialize, Debug)]
struct TickerResponse {
    #[allow(dead_code)]
    symbol: String,
    price: String,
}

/// Binance 业务错误响应体。
#[derive(Deserialize, Debug)]
struct ApiError {
    code: i64,
    msg: String,
}

/// 非 2xx 响应的归类："无效标的"必须与瞬时故障可区分。
fn classify_api_error(symbol: &str, status: u16, body: &str) -> PriceError {
    if let Ok(api) = serde_json::from_str::<ApiError>(body) {
        if api.code == BINANCE_INVALID_SYMBOL {
            return PriceError::UnknownSymbol(symbol.to_string());
        }
        return PriceError::Malformed(format!("Binance error {}: {}", api.code, api.msg));
    }
    PriceError::Malformed(format!("HTTP {}: {}", status, body))
}

fn parse_price(raw: &str) -> Result<Decimal, PriceError> {
    Decimal::from_str(raw).map_err(|e| PriceError::Malformed(format!("bad price '{}': {}", raw, e)))
}

#[async_trait]
impl PriceSource for BinanceFeed {
    /// # Logic
    /// 1. GET `/api/v3/ticker/price?symbol=...`，有界超时。
    /// 2. 网络/超时错误 → `Unreachable`（可重试）。
    /// 3. 非 2xx → 按响应体归类（`UnknownSymbol` 或 `Malformed`）。
    /// 4. 正文价格以十进制精确解析。
    async fn price(&self, symbol: &str) -> Result<Decimal, PriceError> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PriceError::Unreachable(format!("timeout fetching {}", symbol))
                } else {
                    PriceError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_error(symbol, status.as_u16(), &body));
        }

        let ticker: TickerResponse = response
            .json()
            .await
            .map_err(|e| PriceError::Malformed(e.to_string()))?;
        let price = parse_price(&ticker.price)?;

        debug!(symbol, %price, "Fetched market price");
        Ok(price)
    }

    async fn settlement_price(&self, symbol: &str, side: Side) -> Result<Decimal, PriceError> {
        let market = self.price(symbol).await?;
        Ok(self.adjust(symbol, side, market))
    }
}
