//! Telegram Bot API transport: long-poll `getUpdates` plus `sendMessage`.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use promobot_core::config::TelegramConfig;
use promobot_telegram::events::{
    CommandPayload, NonTextEvent, OutboundMessage, TelegramEvent, TextMessageEvent, UpdateEnvelope,
};
use promobot_telegram::poller::{TransportError, UpdateTransport};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

const BOT_API_BASE: &str = "https://api.telegram.org";

/// Non-text payload keys we can name in logs and notices.
const PAYLOAD_KINDS: [&str; 8] =
    ["photo", "sticker", "document", "voice", "video", "audio", "location", "contact"];

pub struct BotApiTransport {
    http: Client,
    bot_token: SecretString,
    poll_timeout_secs: u64,
    /// Next `getUpdates` offset; advancing it is what confirms delivery.
    offset: Mutex<Option<i64>>,
    /// Updates fetched in a batch but not yet handed to the runner.
    queue: Mutex<VecDeque<UpdateEnvelope>>,
}

impl BotApiTransport {
    pub fn new(config: &TelegramConfig) -> Result<Self, reqwest::Error> {
        // The HTTP timeout must outlast the server-side long-poll hold.
        let http = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 10))
            .build()?;

        Ok(Self {
            http,
            bot_token: config.bot_token.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
            offset: Mutex::new(None),
            queue: Mutex::new(VecDeque::new()),
        })
    }

    /// Full method URL. Contains the token, so it must never appear in logs
    /// or error strings.
    fn method_url(&self, method: &str) -> String {
        format!("{BOT_API_BASE}/bot{}/{method}", self.bot_token.expose_secret())
    }

    async fn fetch_batch(&self) -> Result<Vec<UpdateEnvelope>, TransportError> {
        let offset = *self.offset.lock().await;
        let request = GetUpdatesRequest { offset, timeout: self.poll_timeout_secs };

        let response = self
            .http
            .post(self.method_url("getUpdates"))
            .json(&request)
            .send()
            .await
            .map_err(|error| TransportError::Receive(sanitize(error)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Receive(format!("getUpdates returned {status}")));
        }

        let envelope: ApiEnvelope = response
            .json()
            .await
            .map_err(|error| TransportError::Receive(sanitize(error)))?;
        if !envelope.ok {
            return Err(TransportError::Receive(format!(
                "getUpdates rejected: {}",
                envelope.description.unwrap_or_else(|| "no description".to_owned())
            )));
        }

        let updates = match envelope.result {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };

        Ok(updates.iter().filter_map(parse_update).collect())
    }
}

fn sanitize(error: reqwest::Error) -> String {
    // reqwest errors embed the request URL, which carries the bot token.
    error.without_url().to_string()
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    description: Option<String>,
}

/// Maps one raw `getUpdates` entry onto the event model. Returns `None` only
/// when the entry has no `update_id` at all.
fn parse_update(raw: &Value) -> Option<UpdateEnvelope> {
    let update_id = raw.get("update_id")?.as_i64()?;

    let Some(message) = raw.get("message") else {
        let update_kind = raw
            .as_object()
            .and_then(|object| object.keys().find(|key| *key != "update_id").cloned())
            .unwrap_or_else(|| "unknown".to_owned());
        return Some(UpdateEnvelope {
            update_id,
            event: TelegramEvent::Unsupported { update_kind },
        });
    };

    let chat_id = message.get("chat").and_then(|chat| chat.get("id")).and_then(Value::as_i64)?;

    let Some(text) = message.get("text").and_then(Value::as_str) else {
        let payload_kind = PAYLOAD_KINDS
            .iter()
            .find(|kind| message.get(**kind).is_some())
            .map(|kind| (*kind).to_owned())
            .unwrap_or_else(|| "unknown".to_owned());
        return Some(UpdateEnvelope {
            update_id,
            event: TelegramEvent::NonText(NonTextEvent { chat_id, payload_kind }),
        });
    };

    let user_id = message.get("from").and_then(|from| from.get("id")).and_then(Value::as_i64);

    let event = if let Some(stripped) = text.strip_prefix('/') {
        let (command, args) = match stripped.split_once(char::is_whitespace) {
            Some((head, tail)) => (format!("/{head}"), tail.trim().to_owned()),
            None => (format!("/{stripped}"), String::new()),
        };
        TelegramEvent::Command(CommandPayload { chat_id, command, args })
    } else {
        TelegramEvent::TextMessage(TextMessageEvent { chat_id, user_id, text: text.to_owned() })
    };

    Some(UpdateEnvelope { update_id, event })
}

#[async_trait]
impl UpdateTransport for BotApiTransport {
    /// Validates the token with `getMe` before the poll loop starts.
    async fn connect(&self) -> Result<(), TransportError> {
        let response = self
            .http
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(|error| TransportError::Connect(sanitize(error)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Connect(format!("getMe returned {status}")));
        }

        let envelope: ApiEnvelope = response
            .json()
            .await
            .map_err(|error| TransportError::Connect(sanitize(error)))?;
        if !envelope.ok {
            return Err(TransportError::Connect("getMe rejected the bot token".to_owned()));
        }

        debug!(event_name = "ingress.telegram.authorized", "bot token accepted");
        Ok(())
    }

    /// Long-poll loop: an empty batch just means the hold expired, so poll
    /// again. Never returns `None`; the stream only ends on shutdown.
    async fn next_update(&self) -> Result<Option<UpdateEnvelope>, TransportError> {
        loop {
            if let Some(envelope) = self.queue.lock().await.pop_front() {
                return Ok(Some(envelope));
            }

            let batch = self.fetch_batch().await?;
            if batch.is_empty() {
                continue;
            }
            self.queue.lock().await.extend(batch);
        }
    }

    async fn confirm(&self, update_id: i64) -> Result<(), TransportError> {
        let mut offset = self.offset.lock().await;
        let next = update_id + 1;
        if offset.map_or(true, |current| next > current) {
            *offset = Some(next);
        }
        Ok(())
    }

    async fn send_message(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let request = SendMessageRequest { chat_id: message.chat_id, text: &message.text };
        let response = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&request)
            .send()
            .await
            .map_err(|error| TransportError::Send(sanitize(error)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Send(format!("sendMessage returned {status}")));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
