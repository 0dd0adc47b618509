pub mod error;

pub use error::{Result, TransportError};

use async_trait::async_trait;
use catalog_core::{Action, ChatTransport, MediaItem};
use serde_json::json;

#[derive(Debug, Clone)]
pub struct HttpChatTransportConfig {
    pub base_url: String,
    pub bot_token: String,
}

/// `reqwest`-based client against a generic bot-style chat HTTP API
/// (bot-token bearer auth, JSON bodies). Implements
/// `catalog_core::ChatTransport`, the one real transport the dispatcher
/// drives in production.
pub struct HttpChatTransport {
    client: reqwest::Client,
    config: HttpChatTransportConfig,
}

impl HttpChatTransport {
    pub fn new(config: HttpChatTransportConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn post_media_group(
        &self,
        chat: &str,
        items: &[MediaItem],
    ) -> Result<Vec<String>> {
        let url = format!("{}/sendMediaGroup", self.config.base_url);
        let body = json!({
            "chat_id": chat,
            "media": items.iter().map(|m| json!({
                "url": m.url,
                "caption": m.caption,
            })).collect::<Vec<_>>(),
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.bot_token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %message, "sendMediaGroup failed");
            return Err(TransportError::Api {
                status: status.as_u16(),
                message,
            });
        }

        #[derive(serde::Deserialize)]
        struct MediaGroupResponse {
            message_ids: Vec<String>,
        }
        let parsed: MediaGroupResponse = resp.json().await?;
        Ok(parsed.message_ids)
    }

    async fn post_message(
        &self,
        chat: &str,
        text: &str,
        action: Option<Action>,
    ) -> Result<String> {
        let url = format!("{}/sendMessage", self.config.base_url);
        let body = json!({
            "chat_id": chat,
            "text": text,
            "action": action.map(|a| json!({"label": a.label, "url": a.url})),
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.bot_token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %message, "sendMessage failed");
            return Err(TransportError::Api {
                status: status.as_u16(),
                message,
            });
        }

        #[derive(serde::Deserialize)]
        struct MessageResponse {
            message_id: String,
        }
        let parsed: MessageResponse = resp.json().await?;
        Ok(parsed.message_id)
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn send_media_group(
        &self,
        chat: &str,
        items: &[MediaItem],
    ) -> std::result::Result<Vec<String>, String> {
        self.post_media_group(chat, items)
            .await
            .map_err(|e| e.to_string())
    }

    async fn send_message(
        &self,
        chat: &str,
        text: &str,
        action: Option<Action>,
    ) -> std::result::Result<String, String> {
        self.post_message(chat, text, action)
            .await
            .map_err(|e| e.to_string())
    }
}

/// In-memory transport for tests; records what it was asked to send.
#[derive(Default)]
pub struct MockChatTransport {
    pub sent_media_groups: std::sync::Mutex<Vec<Vec<MediaItem>>>,
    pub sent_messages: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl ChatTransport for MockChatTransport {
    async fn send_media_group(
        &self,
        _chat: &str,
        items: &[MediaItem],
    ) -> std::result::Result<Vec<String>, String> {
        self.sent_media_groups
            .lock()
            .expect("mock transport mutex poisoned")
            .push(items.to_vec());
        Ok(items.iter().enumerate().map(|(i, _)| format!("mg-{}", i)).collect())
    }

    async fn send_message(
        &self,
        _chat: &str,
        text: &str,
        _action: Option<Action>,
    ) -> std::result::Result<String, String> {
        self.sent_messages
            .lock()
            .expect("mock transport mutex poisoned")
            .push(text.to_string());
        Ok("mock-message-id".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_transport_records_sent_messages() {
        let transport = MockChatTransport::default();
        transport
            .send_message("chat-1", "hello", None)
            .await
            .unwrap();
        assert_eq!(transport.sent_messages.lock().unwrap().len(), 1);
    }
}
