//! Telegram Bot API client and webhook update types

use super::{InlineKeyboard, OutgoingMessage, TransportError};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const NOT_MODIFIED_MARKER: &str = "message is not modified";

/// Bot API client
pub struct TelegramClient {
    client: Client,
    api_url: String,
    token: String,
}

impl TelegramClient {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    /// Send a message, returning its message id
    pub async fn send_message(
        &self,
        chat_id: i64,
        message: &OutgoingMessage,
    ) -> Result<i64, TransportError> {
        let body = MessageRequest::new(chat_id, None, message);
        let sent: SentMessage = self.call("sendMessage", &body).await?;
        Ok(sent.message_id)
    }

    /// Replace the text and keyboard of an existing message
    pub async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        message: &OutgoingMessage,
    ) -> Result<(), TransportError> {
        let body = MessageRequest::new(chat_id, Some(message_id), message);
        // Returns the edited Message, or `true` for inline messages
        let _: serde_json::Value = self.call("editMessageText", &body).await?;
        Ok(())
    }

    /// Stop the client's loading indicator, optionally showing `text`
    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError> {
        let body = AnswerCallbackRequest {
            callback_query_id,
            text,
            show_alert: text.is_some(),
        };
        let _: bool = self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::network(format!("{method} timed out: {e}"))
                } else {
                    TransportError::network(format!("{method} failed: {e}"))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::network(format!("Failed to read {method} response: {e}")))?;

        let parsed: ApiResponse<T> = serde_json::from_str(&text).map_err(|e| {
            TransportError::api(format!("HTTP {status}: unparseable {method} response: {e}"))
        })?;

        parsed.into_result(method)
    }
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    chat_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<i64>,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboard>,
    disable_web_page_preview: bool,
}

impl<'a> MessageRequest<'a> {
    fn new(chat_id: i64, message_id: Option<i64>, message: &'a OutgoingMessage) -> Self {
        Self {
            chat_id,
            message_id,
            text: &message.text,
            parse_mode: message.markdown.then_some("Markdown"),
            reply_markup: message.keyboard.as_ref(),
            disable_web_page_preview: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct AnswerCallbackRequest<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    show_alert: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, method: &str) -> Result<T, TransportError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(TransportError::api(format!("{method} returned no result"))),
            (false, _) => {
                let description = self
                    .description
                    .unwrap_or_else(|| format!("{method} failed"));
                if description.contains(NOT_MODIFIED_MARKER) {
                    Err(TransportError::not_modified(description))
                } else {
                    Err(TransportError::api(description))
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

// ============================================================================
// Webhook update types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Chat {
    pub fn is_private(&self) -> bool {
        self.kind == "private"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}
