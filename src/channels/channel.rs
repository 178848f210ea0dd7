//! Channel trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChannelError;

/// Opaque identifier of a message the bot sent, used for retraction.
pub type MessageHandle = String;

/// Stream of inbound messages produced by a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A confirmed payment reported by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentNotice {
    /// Plan identifier echoed back from the invoice (e.g. `subscription_1_month`).
    pub payload: String,
    pub currency: String,
    pub total_amount: i64,
}

/// An inbound user action: typed text, a button press, or a payment.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: Uuid,
    pub channel: String,
    pub user_id: String,
    /// Typed text. Empty for button presses and payments.
    pub content: String,
    /// Button callback data, when the user pressed an inline button.
    pub callback: Option<String>,
    pub payment: Option<PaymentNotice>,
    /// Transport-specific routing data (chat id, callback query id, ...).
    pub metadata: serde_json::Value,
}

impl IncomingMessage {
    pub fn new(channel: &str, user_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            callback: None,
            payment: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_callback(mut self, data: &str) -> Self {
        self.callback = Some(data.to_string());
        self
    }

    pub fn with_payment(mut self, payment: PaymentNotice) -> Self {
        self.payment = Some(payment);
        self
    }
}

/// An inline button. `data` is delivered back as callback data when pressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// A payment request for one plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub title: String,
    pub description: String,
    pub payload: String,
    pub currency: String,
    /// Price in the currency's smallest unit.
    pub amount: i64,
    pub provider_token: String,
}

/// What the bot sends back: text, optional button rows, optional invoice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingResponse {
    pub content: String,
    pub buttons: Vec<Vec<Button>>,
    pub invoice: Option<Invoice>,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_buttons(mut self, rows: Vec<Vec<Button>>) -> Self {
        self.buttons = rows;
        self
    }

    pub fn with_invoice(mut self, invoice: Invoice) -> Self {
        self.invoice = Some(invoice);
        self
    }
}

/// Transient status shown while the bot works.
#[derive(Debug, Clone)]
pub enum StatusUpdate {
    Thinking(String),
}

/// A transport the bot talks through.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Begin receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Reply to an inbound message. Returns a handle when the transport
    /// supports retracting the sent message.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<Option<MessageHandle>, ChannelError>;

    /// Push a message to a user outside of a reply (reminders, broadcasts).
    async fn send_to(
        &self,
        user_id: &str,
        response: OutgoingResponse,
    ) -> Result<Option<MessageHandle>, ChannelError>;

    /// Delete a previously sent message.
    async fn retract(&self, _user_id: &str, _handle: &MessageHandle) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn send_status(
        &self,
        _status: StatusUpdate,
        _metadata: &serde_json::Value,
    ) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
