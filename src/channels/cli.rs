//! CLI channel: stdin/stdout REPL for local testing.
//!
//! Buttons are printed as `[label] @data`; typing `@data` presses one.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{
    Channel, IncomingMessage, MessageHandle, MessageStream, OutgoingResponse, StatusUpdate,
};
use crate::error::ChannelError;

const CLI_USER: &str = "local-user";

/// A simple CLI channel that reads from stdin and writes to stdout.
#[derive(Default)]
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

/// Turn a typed line into a message; `@data` becomes a button press.
fn line_to_message(line: &str) -> IncomingMessage {
    match line.strip_prefix('@') {
        Some(data) if !data.is_empty() => {
            IncomingMessage::new("cli", CLI_USER, "").with_callback(data)
        }
        _ => IncomingMessage::new("cli", CLI_USER, line),
    }
}

fn render(response: &OutgoingResponse) -> String {
    let mut out = response.content.clone();
    for row in &response.buttons {
        let line: Vec<String> = row
            .iter()
            .map(|b| format!("[{}] @{}", b.label, b.data))
            .collect();
        out.push('\n');
        out.push_str(&line.join("   "));
    }
    if let Some(invoice) = &response.invoice {
        out.push_str(&format!(
            "\n💳 {} ({} {:.2})",
            invoice.title,
            invoice.currency,
            invoice.amount as f64 / 100.0
        ));
    }
    out
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        if tx.send(line_to_message(line)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<Option<MessageHandle>, ChannelError> {
        self.send_to(&msg.user_id, response).await
    }

    async fn send_to(
        &self,
        _user_id: &str,
        response: OutgoingResponse,
    ) -> Result<Option<MessageHandle>, ChannelError> {
        println!("\n{}\n", render(&response));
        eprint!("> ");
        Ok(None)
    }

    async fn send_status(
        &self,
        status: StatusUpdate,
        _metadata: &serde_json::Value,
    ) -> Result<(), ChannelError> {
        let StatusUpdate::Thinking(msg) = status;
        eprintln!("⏳ {msg}");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Button;

    #[test]
    fn at_prefix_is_a_button_press() {
        let msg = line_to_message("@gender:male");
        assert_eq!(msg.callback.as_deref(), Some("gender:male"));
        assert!(msg.content.is_empty());

        let msg = line_to_message("hello");
        assert!(msg.callback.is_none());
        assert_eq!(msg.content, "hello");

        assert_eq!(line_to_message("@").content, "@");
    }

    #[test]
    fn render_lists_buttons_by_row() {
        let response = OutgoingResponse::text("Pick one").with_buttons(vec![
            vec![Button::new("Male", "gender:male"), Button::new("Female", "gender:female")],
        ]);
        assert_eq!(
            render(&response),
            "Pick one\n[Male] @gender:male   [Female] @gender:female"
        );
    }
}
