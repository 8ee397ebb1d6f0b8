use async_trait::async_trait;
use daicho_core::notify::error::NotifyError;
use daicho_core::notify::port::Notifier;
use serde::Serialize;

/// # Summary
/// 通过 Telegram Bot API 向运营频道推送通知的实现。
/// 后台的用户通知（入金地址、出金取消等）由 outbox relay
/// 经此渠道送达运营侧转交。
///
/// # Invariants
/// * `bot_token` 必须有效。
/// * `chat_id` 必须是 bot 可达的会话。
pub struct TelegramNotifier {
    bot_token: String,
    chat_id: String,
    client: reqwest::Client,
}

/// Telegram `sendMessage` 请求体。
#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'static str,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            bot_token,
            chat_id,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    /// # Logic
    /// 1. 拼接 Bot API 地址，主题加粗 + 正文。
    /// 2. POST 到 `sendMessage`。
    /// 3. 网络错误与平台侧拒绝分别归类，由 relay 记录重试。
    async fn notify(&self, subject: &str, content: &str) -> Result<(), NotifyError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);

        let payload = SendMessage {
            chat_id: &self.chat_id,
            text: format!("*{}*\n{}", subject, content),
            parse_mode: "Markdown",
        };

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(NotifyError::Platform(format!(
                "Telegram API error: {}",
                error_text
            )));
        }

        Ok(())
    }
}
