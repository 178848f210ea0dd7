//! Fit Coach: a chat-based personal fitness coach.

pub mod achievements;
pub mod admin;
pub mod bot;
pub mod channels;
pub mod coaching;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod llm;
pub mod onboarding;
pub mod profile;
pub mod reminders;
pub mod store;
