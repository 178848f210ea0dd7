//! Chat front end: event classification, dispatch, and reply texts.

pub mod dispatcher;
pub mod event;
pub mod history;
pub mod replies;

pub use dispatcher::{BotDeps, DispatchSettings, Dispatcher};
pub use event::BotEvent;
pub use history::MessageHistory;
