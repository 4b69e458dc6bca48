use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use tracing::info;

const LOG_TARGET: &str = "trendpost_bot::publisher";

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Snafu)]
pub enum PublishError {
    #[snafu(display("Failed to reach Telegram: {source}"))]
    Http { source: reqwest::Error },
    #[snafu(display("Unexpected Telegram response (HTTP {status}): {source}"))]
    Decode {
        status: StatusCode,
        source: serde_json::Error,
    },
    #[snafu(display("Telegram rejected the message (HTTP {status}): {description}"))]
    Rejected {
        status: StatusCode,
        description: String,
    },
}

pub type PublishResult<T> = std::result::Result<T, PublishError>;

#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, text: &str) -> PublishResult<()>;
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Decide whether a Bot API response body means the message was accepted.
pub fn interpret_response(status: StatusCode, body: &[u8]) -> PublishResult<()> {
    let response: ApiResponse = serde_json::from_slice(body).context(DecodeSnafu { status })?;

    if response.ok {
        return Ok(());
    }

    RejectedSnafu {
        status,
        description: response
            .description
            .unwrap_or_else(|| "no description".to_owned()),
    }
    .fail()
}

/// Posts HTML-formatted messages to a Telegram channel through the Bot API.
pub struct TelegramPublisher {
    client: Client,
    api_base: String,
    token: String,
    channel: String,
}

impl TelegramPublisher {
    pub fn new(client: Client, api_base: String, token: String, channel: String) -> Self {
        Self {
            client,
            api_base,
            token,
            channel,
        }
    }
}

#[async_trait::async_trait]
impl Publisher for TelegramPublisher {
    async fn publish(&self, text: &str) -> PublishResult<()> {
        info!(target: LOG_TARGET, channel = %self.channel, "Publishing message to Telegram");

        // The token is part of the path; keep it out of error messages
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.token
        );

        let response = self
            .client
            .post(url)
            .json(&SendMessage {
                chat_id: &self.channel,
                text,
                parse_mode: "HTML",
            })
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context(HttpSnafu)?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(reqwest::Error::without_url)
            .context(HttpSnafu)?;

        interpret_response(status, &body)?;

        info!(target: LOG_TARGET, channel = %self.channel, "Successfully published message to Telegram");
        Ok(())
    }
}
