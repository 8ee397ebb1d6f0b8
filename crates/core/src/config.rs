use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub feed: FeedConfig,
    pub notify: NotifyConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub data_dir: String,
}

/// 行情源（结算价）配置。`spreads` 为各标的结算点差：
/// BUY 方向平仓按 Ask（市场价 + 点差），SELL 按 Bid（市场价 - 点差）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub spreads: HashMap<String, Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Telegram Bot Token（为空时退化为仅记录日志的投递器）
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 自动跟单扫描周期（秒）
    pub autotrade_interval_secs: u64,
    /// 通知 outbox 投递周期（秒）
    pub outbox_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        // 默认点差表沿用运营侧的人工标定值
        let mut spreads = HashMap::new();
        spreads.insert("BTCUSDT".to_string(), Decimal::new(25, 1));
        spreads.insert("ETHUSDT".to_string(), Decimal::new(5, 1));
        spreads.insert("XRPUSDT".to_string(), Decimal::new(2, 2));
        spreads.insert("SOLUSDT".to_string(), Decimal::new(2, 1));
        spreads.insert("DOTUSDT".to_string(), Decimal::new(2, 1));
        spreads.insert("ADAUSDT".to_string(), Decimal::new(1, 2));
        spreads.insert("LTCUSDT".to_string(), Decimal::new(3, 1));
        spreads.insert("BNBUSDT".to_string(), Decimal::new(5, 1));

        Self {
            database: DatabaseConfig {
                data_dir: "data".to_string(),
            },
            feed: FeedConfig {
                base_url: "https://api.binance.com".to_string(),
                timeout_secs: 10,
                spreads,
            },
            notify: NotifyConfig {
                telegram_bot_token: None,
                telegram_chat_id: None,
            },
            scheduler: SchedulerConfig {
                autotrade_interval_secs: 60,
                outbox_interval_secs: 5,
            },
        }
    }
}
