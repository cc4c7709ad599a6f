//! Delivery transports
//!
//! A [`DeliveryTransport`] sends one message to one address. The dispatcher
//! owns throttling and failure accounting; transports only report what
//! happened through [`DeliveryError`].

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{FormatDirectives, ParseMode};
use crate::config::TelegramConfig;
use crate::utils::error::DeliveryError;

/// Default Bot API base URL
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Something that can deliver a message to one address
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    /// Get the transport name
    fn name(&self) -> &str;

    /// Send a text message
    async fn send_text(
        &self,
        address: &str,
        text: &str,
        format: &FormatDirectives,
    ) -> Result<(), DeliveryError>;

    /// Send an image (URL or transport-side file id) with a caption
    async fn send_image(
        &self,
        address: &str,
        image: &str,
        caption: &str,
        format: &FormatDirectives,
    ) -> Result<(), DeliveryError>;
}

/// Telegram Bot API transport
///
/// A `403` answer means the user blocked the bot or deleted their account;
/// it is reported as [`DeliveryError::Unreachable`].
pub struct TelegramTransport {
    client: Client,
    api_base: String,
    token: String,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    disable_web_page_preview: bool,
}

#[derive(Debug, Serialize)]
struct SendPhotoRequest<'a> {
    chat_id: &'a str,
    photo: &'a str,
    caption: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    error_code: Option<u16>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

fn parse_mode_name(mode: ParseMode) -> Option<&'static str> {
    match mode {
        ParseMode::Html => Some("HTML"),
        ParseMode::Markdown => Some("Markdown"),
        ParseMode::Plain => None,
    }
}

impl TelegramTransport {
    /// Create a transport against the public Bot API
    pub fn new(token: impl Into<String>) -> Result<Self, DeliveryError> {
        Self::with_base_url(token, DEFAULT_API_BASE, Duration::from_secs(30))
    }

    /// Create a transport against a custom API base (tests, local Bot API servers)
    pub fn with_base_url(
        token: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn from_config(config: &TelegramConfig) -> Result<Self, DeliveryError> {
        let token = config
            .bot_token
            .clone()
            .ok_or_else(|| DeliveryError::Other("Telegram bot token is not configured".to_string()))?;

        Self::with_base_url(
            token,
            config.api_base.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call<T: Serialize + ?Sized>(&self, method: &str, body: &T) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let api: ApiResponse = match response.json().await {
            Ok(api) => api,
            Err(_) if (200..300).contains(&status) => return Ok(()),
            Err(e) => return Err(status_error(status, format!("unreadable response: {e}"), None)),
        };

        if api.ok {
            return Ok(());
        }

        let code = api.error_code.unwrap_or(status);
        let description = api.description.unwrap_or_default();

        Err(status_error(
            code,
            description,
            api.parameters.and_then(|p| p.retry_after),
        ))
    }
}

/// Map a failed Bot API call to a delivery error by its status code
fn status_error(code: u16, description: String, retry_after_secs: Option<u64>) -> DeliveryError {
    match code {
        403 => DeliveryError::Unreachable(description),
        429 => DeliveryError::RateLimited { retry_after_secs },
        _ => DeliveryError::Api { code, description },
    }
}

#[async_trait]
impl DeliveryTransport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_text(
        &self,
        address: &str,
        text: &str,
        format: &FormatDirectives,
    ) -> Result<(), DeliveryError> {
        let request = SendMessageRequest {
            chat_id: address,
            text,
            parse_mode: parse_mode_name(format.parse_mode),
            disable_web_page_preview: format.disable_preview,
        };
        self.call("sendMessage", &request).await
    }

    async fn send_image(
        &self,
        address: &str,
        image: &str,
        caption: &str,
        format: &FormatDirectives,
    ) -> Result<(), DeliveryError> {
        let request = SendPhotoRequest {
            chat_id: address,
            photo: image,
            caption,
            parse_mode: parse_mode_name(format.parse_mode),
        };
        self.call("sendPhoto", &request).await
    }
}
