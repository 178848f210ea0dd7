//! Classifies inbound messages into the events the dispatcher acts on.

use std::sync::LazyLock;

use regex::Regex;

use crate::channels::{IncomingMessage, PaymentNotice};

/// `/command`, `/command@BotName`, optionally followed by arguments.
static COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^/([A-Za-z_]+)(?:@\w+)?(?:\s+(.*))?$").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub enum BotEvent {
    /// Slash command. `name` is lowercased, `args` trimmed (may be empty).
    Command { name: String, args: String },
    /// Typed text that is not a command.
    FreeText(String),
    /// Inline button press carrying `kind:value` callback data.
    Choice { kind: String, value: String },
    Payment(PaymentNotice),
}

impl BotEvent {
    /// Returns `None` for messages with nothing to act on (empty text,
    /// malformed callback data).
    pub fn classify(msg: &IncomingMessage) -> Option<Self> {
        if let Some(payment) = &msg.payment {
            return Some(Self::Payment(payment.clone()));
        }

        if let Some(data) = &msg.callback {
            let (kind, value) = data.split_once(':')?;
            if kind.is_empty() || value.is_empty() {
                return None;
            }
            return Some(Self::Choice {
                kind: kind.to_string(),
                value: value.to_string(),
            });
        }

        let text = msg.content.trim();
        if text.is_empty() {
            return None;
        }

        if let Some(caps) = COMMAND.captures(text) {
            return Some(Self::Command {
                name: caps[1].to_lowercase(),
                args: caps
                    .get(2)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default(),
            });
        }

        Some(Self::FreeText(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str) -> Option<BotEvent> {
        BotEvent::classify(&IncomingMessage::new("test", "u1", content))
    }

    fn command(name: &str, args: &str) -> Option<BotEvent> {
        Some(BotEvent::Command {
            name: name.into(),
            args: args.into(),
        })
    }

    #[test]
    fn commands_with_and_without_args() {
        assert_eq!(text("/start"), command("start", ""));
        assert_eq!(text("/Weight 82,5"), command("weight", "82,5"));
        assert_eq!(text("/reminder@FitCoachBot  08:30 "), command("reminder", "08:30"));
    }

    #[test]
    fn plain_text_and_blank() {
        assert_eq!(text(" Alice "), Some(BotEvent::FreeText("Alice".into())));
        assert_eq!(text("/ not a command"), Some(BotEvent::FreeText("/ not a command".into())));
        assert_eq!(text("   "), None);
    }

    #[test]
    fn callback_data_splits_on_first_colon() {
        let msg = IncomingMessage::new("test", "u1", "").with_callback("training:done");
        assert_eq!(
            BotEvent::classify(&msg),
            Some(BotEvent::Choice {
                kind: "training".into(),
                value: "done".into()
            })
        );

        let malformed = IncomingMessage::new("test", "u1", "").with_callback("garbage");
        assert_eq!(BotEvent::classify(&malformed), None);
    }

    #[test]
    fn payment_wins_over_text() {
        let notice = PaymentNotice {
            payload: "subscription_1_month".into(),
            currency: "RUB".into(),
            total_amount: 29900,
        };
        let msg = IncomingMessage::new("test", "u1", "/start").with_payment(notice.clone());
        assert_eq!(BotEvent::classify(&msg), Some(BotEvent::Payment(notice)));
    }
}
