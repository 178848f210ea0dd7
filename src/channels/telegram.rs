//! Telegram channel: long-polls the Bot API for updates.
//!
//! Handles text messages, inline-button presses (`callback_query`) and the
//! payment flow (`pre_checkout_query` is approved, `successful_payment` is
//! forwarded as a [`PaymentNotice`]).

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::channels::{
    Button, Channel, IncomingMessage, Invoice, MessageHandle, MessageStream, OutgoingResponse,
    PaymentNotice, StatusUpdate,
};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const API_BASE: &str = "https://api.telegram.org";

/// Telegram channel: connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: String,
    client: reqwest::Client,
}

/// What a single update turns into.
#[derive(Debug)]
enum ParsedUpdate {
    Message(IncomingMessage),
    /// A button press: forward the message, then acknowledge the query.
    Callback {
        message: IncomingMessage,
        query_id: String,
    },
    PreCheckout {
        query_id: String,
    },
    Ignore,
}

impl TelegramChannel {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        call_api(&self.client, &self.bot_token, method, body).await
    }

    /// Send text (split to fit the limit) with buttons on the last chunk,
    /// then the invoice if any. Returns the id of the last text message.
    async fn send_response(
        &self,
        chat_id: &str,
        response: &OutgoingResponse,
    ) -> Result<Option<MessageHandle>, ChannelError> {
        let mut handle = None;

        if !response.content.is_empty() {
            let chunks = split_message(&response.content, TELEGRAM_MAX_MESSAGE_LENGTH);
            let last = chunks.len() - 1;
            for (i, chunk) in chunks.iter().enumerate() {
                let buttons: &[Vec<Button>] = if i == last { &response.buttons } else { &[] };
                handle = self.send_message_chunk(chat_id, chunk, buttons).await?;
            }
        }

        if let Some(invoice) = &response.invoice {
            self.send_invoice(chat_id, invoice).await?;
        }

        Ok(handle)
    }

    /// Send a single message chunk, Markdown-first with plain-text fallback.
    async fn send_message_chunk(
        &self,
        chat_id: &str,
        text: &str,
        buttons: &[Vec<Button>],
    ) -> Result<Option<MessageHandle>, ChannelError> {
        match self
            .call("sendMessage", &message_body(chat_id, text, buttons, true))
            .await
        {
            Ok(result) => return Ok(message_id(&result)),
            Err(e) => {
                tracing::warn!(
                    "Telegram sendMessage with Markdown failed ({e}); retrying without parse_mode"
                );
            }
        }

        let result = self
            .call("sendMessage", &message_body(chat_id, text, buttons, false))
            .await?;
        Ok(message_id(&result))
    }

    async fn send_invoice(&self, chat_id: &str, invoice: &Invoice) -> Result<(), ChannelError> {
        self.call("sendInvoice", &invoice_body(chat_id, invoice))
            .await?;
        tracing::info!(chat_id = %chat_id, payload = %invoice.payload, "Invoice sent");
        Ok(())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let bot_token = self.bot_token.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;
            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query", "pre_checkout_query"]
                });

                let results = match call_api(&client, &bot_token, "getUpdates", &body).await {
                    Ok(Value::Array(results)) => results,
                    Ok(_) => Vec::new(),
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                for update in &results {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let incoming = match parse_update(update) {
                        ParsedUpdate::Message(m) => m,
                        ParsedUpdate::Callback { message, query_id } => {
                            let ack = json!({ "callback_query_id": query_id });
                            if let Err(e) =
                                call_api(&client, &bot_token, "answerCallbackQuery", &ack).await
                            {
                                tracing::debug!("answerCallbackQuery failed: {e}");
                            }
                            message
                        }
                        ParsedUpdate::PreCheckout { query_id } => {
                            let ok = json!({ "pre_checkout_query_id": query_id, "ok": true });
                            if let Err(e) =
                                call_api(&client, &bot_token, "answerPreCheckoutQuery", &ok).await
                            {
                                tracing::warn!("answerPreCheckoutQuery failed: {e}");
                            }
                            continue;
                        }
                        ParsedUpdate::Ignore => continue,
                    };

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<Option<MessageHandle>, ChannelError> {
        let chat_id = msg
            .metadata
            .get("chat_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: "No chat_id in message metadata".into(),
            })?;

        self.send_response(chat_id, &response).await
    }

    /// Private chats share their id with the user.
    async fn send_to(
        &self,
        user_id: &str,
        response: OutgoingResponse,
    ) -> Result<Option<MessageHandle>, ChannelError> {
        self.send_response(user_id, &response).await
    }

    async fn retract(&self, user_id: &str, handle: &MessageHandle) -> Result<(), ChannelError> {
        let message_id: i64 = handle
            .parse()
            .map_err(|_| ChannelError::InvalidMessage(format!("bad message handle: {handle}")))?;
        self.call(
            "deleteMessage",
            &json!({ "chat_id": user_id, "message_id": message_id }),
        )
        .await?;
        Ok(())
    }

    async fn send_status(
        &self,
        status: StatusUpdate,
        metadata: &Value,
    ) -> Result<(), ChannelError> {
        let Some(chat_id) = metadata.get("chat_id").and_then(|v| v.as_str()) else {
            return Ok(());
        };
        let StatusUpdate::Thinking(_) = status;
        let _ = self
            .call(
                "sendChatAction",
                &json!({ "chat_id": chat_id, "action": "typing" }),
            )
            .await;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(bot_token: &str, method: &str) -> String {
    format!("{API_BASE}/bot{bot_token}/{method}")
}

/// POST a Bot API method and unwrap its `result`.
async fn call_api(
    client: &reqwest::Client,
    bot_token: &str,
    method: &str,
    body: &Value,
) -> Result<Value, ChannelError> {
    let resp = client
        .post(api_url(bot_token, method))
        .json(body)
        .send()
        .await
        .map_err(|e| ChannelError::Http(format!("{method}: {e}")))?;

    let status = resp.status();
    let data: Value = resp
        .json()
        .await
        .map_err(|e| ChannelError::Http(format!("{method}: invalid JSON: {e}")))?;

    if !status.is_success() || data.get("ok").and_then(Value::as_bool) != Some(true) {
        let description = data
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(ChannelError::SendFailed {
            name: "telegram".into(),
            reason: format!("{method} returned {status}: {description}"),
        });
    }

    Ok(data.get("result").cloned().unwrap_or(Value::Null))
}

fn message_id(result: &Value) -> Option<MessageHandle> {
    result
        .get("message_id")
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
}

fn keyboard(buttons: &[Vec<Button>]) -> Value {
    let rows: Vec<Value> = buttons
        .iter()
        .map(|row| {
            Value::Array(
                row.iter()
                    .map(|b| json!({ "text": b.label, "callback_data": b.data }))
                    .collect(),
            )
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

fn message_body(chat_id: &str, text: &str, buttons: &[Vec<Button>], markdown: bool) -> Value {
    let mut body = json!({ "chat_id": chat_id, "text": text });
    if markdown {
        body["parse_mode"] = json!("Markdown");
    }
    if !buttons.is_empty() {
        body["reply_markup"] = keyboard(buttons);
    }
    body
}

fn invoice_body(chat_id: &str, invoice: &Invoice) -> Value {
    json!({
        "chat_id": chat_id,
        "title": invoice.title,
        "description": invoice.description,
        "payload": invoice.payload,
        "provider_token": invoice.provider_token,
        "currency": invoice.currency,
        "prices": [{ "label": invoice.title, "amount": invoice.amount }],
    })
}

fn user_id_of(from: Option<&Value>) -> Option<String> {
    from.and_then(|f| f.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
}

fn chat_id_of(message: &Value) -> Option<String> {
    message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
}

fn build_incoming(user_id: &str, chat_id: &str, text: &str) -> IncomingMessage {
    IncomingMessage::new("telegram", user_id, text).with_metadata(json!({ "chat_id": chat_id }))
}

/// Translate one `getUpdates` entry.
fn parse_update(update: &Value) -> ParsedUpdate {
    if let Some(query) = update.get("pre_checkout_query") {
        return match query.get("id").and_then(Value::as_str) {
            Some(id) => ParsedUpdate::PreCheckout {
                query_id: id.to_string(),
            },
            None => ParsedUpdate::Ignore,
        };
    }

    if let Some(query) = update.get("callback_query") {
        let (Some(query_id), Some(data)) = (
            query.get("id").and_then(Value::as_str),
            query.get("data").and_then(Value::as_str),
        ) else {
            return ParsedUpdate::Ignore;
        };
        let Some(user_id) = user_id_of(query.get("from")) else {
            return ParsedUpdate::Ignore;
        };
        let chat_id = query
            .get("message")
            .and_then(chat_id_of)
            .unwrap_or_else(|| user_id.clone());
        let message = build_incoming(&user_id, &chat_id, "").with_callback(data);
        return ParsedUpdate::Callback {
            message,
            query_id: query_id.to_string(),
        };
    }

    let Some(message) = update.get("message") else {
        return ParsedUpdate::Ignore;
    };
    let Some(user_id) = user_id_of(message.get("from")) else {
        return ParsedUpdate::Ignore;
    };
    let chat_id = chat_id_of(message).unwrap_or_else(|| user_id.clone());

    if let Some(payment) = message.get("successful_payment") {
        let Some(payload) = payment.get("invoice_payload").and_then(Value::as_str) else {
            return ParsedUpdate::Ignore;
        };
        let notice = PaymentNotice {
            payload: payload.to_string(),
            currency: payment
                .get("currency")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            total_amount: payment
                .get("total_amount")
                .and_then(Value::as_i64)
                .unwrap_or(0),
        };
        return ParsedUpdate::Message(build_incoming(&user_id, &chat_id, "").with_payment(notice));
    }

    match message.get("text").and_then(Value::as_str) {
        Some(text) => ParsedUpdate::Message(build_incoming(&user_id, &chat_id, text)),
        None => ParsedUpdate::Ignore,
    }
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char
/// boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut cut = max_len;
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }
        let chunk = &remaining[..cut];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(cut);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { cut } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
