use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("recipient {chat_id} unreachable: {description}")]
    RecipientNotFound { chat_id: i64, description: String },

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Telegram API error {status}: {description}")]
    Api { status: u16, description: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

impl DeliveryError {
    /// True when retrying cannot help: the chat does not exist or the user
    /// blocked the bot.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, DeliveryError::RecipientNotFound { .. })
    }
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError>;
}

/// Sends messages through the Telegram Bot API `sendMessage` method.
pub struct TelegramTransport {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramTransport {
    pub fn new(api_host: &str, bot_token: &str, timeout: Duration) -> Result<TelegramTransport, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(TelegramTransport {
            client,
            base_url: format!("https://{api_host}/bot{bot_token}"),
        })
    }
}

#[async_trait::async_trait]
impl Transport for TelegramTransport {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        let response = self.client
            .post(format!("{}/sendMessage", self.base_url))
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        classify_response(chat_id, status, &body)
    }
}

fn classify_response(chat_id: i64, status: StatusCode, body: &Value) -> Result<(), DeliveryError> {
    if body.get("ok") == Some(&Value::Bool(true)) {
        return Ok(());
    }

    let description = body
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("unknown Telegram API error")
        .to_string();

    if status == StatusCode::FORBIDDEN
        || (status == StatusCode::BAD_REQUEST && description.to_lowercase().contains("chat not found"))
    {
        return Err(DeliveryError::RecipientNotFound { chat_id, description });
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = body
            .get("parameters")
            .and_then(|p| p.get("retry_after"))
            .and_then(Value::as_u64)
            .unwrap_or(30);
        return Err(DeliveryError::RateLimited { retry_after_secs });
    }

    Err(DeliveryError::Api { status: status.as_u16(), description })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_response() {
        let body = json!({"ok": true, "result": {"message_id": 7}});
        assert!(classify_response(1, StatusCode::OK, &body).is_ok());
    }

    #[test]
    fn test_chat_not_found_is_unreachable() {
        let body = json!({"ok": false, "error_code": 400, "description": "Bad Request: chat not found"});
        let err = classify_response(42, StatusCode::BAD_REQUEST, &body).unwrap_err();
        assert!(err.is_unreachable());
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_blocked_bot_is_unreachable() {
        let body = json!({"ok": false, "error_code": 403, "description": "Forbidden: bot was blocked by the user"});
        assert!(classify_response(42, StatusCode::FORBIDDEN, &body).unwrap_err().is_unreachable());
    }

    #[test]
    fn test_rate_limit_is_transient() {
        let body = json!({"ok": false, "error_code": 429, "parameters": {"retry_after": 12}});
        let err = classify_response(42, StatusCode::TOO_MANY_REQUESTS, &body).unwrap_err();
        assert!(!err.is_unreachable());
        assert!(matches!(err, DeliveryError::RateLimited { retry_after_secs: 12 }));
    }

    #[test]
    fn test_other_bad_request_is_transient() {
        let body = json!({"ok": false, "error_code": 400, "description": "Bad Request: message text is empty"});
        let err = classify_response(42, StatusCode::BAD_REQUEST, &body).unwrap_err();
        assert!(matches!(err, DeliveryError::Api { status: 400, .. }));
    }

    #[test]
    fn test_non_json_body() {
        let err = classify_response(42, StatusCode::BAD_GATEWAY, &Value::Null).unwrap_err();
        assert!(matches!(err, DeliveryError::Api { status: 502, .. }));
    }
}
