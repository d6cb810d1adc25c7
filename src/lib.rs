//! Quarterback - audience persona platform
//!
//! Upload audience-segment data (CSV or Google Sheets), enrich it into a
//! persona with a chat-completion model, and converse with the persona
//! over HTTP. Lifecycle events are pushed best-effort to an n8n webhook.

pub mod completion;
pub mod context;
pub mod db;
pub mod error;
pub mod http;
pub mod logging;
pub mod normalizer;
pub mod pipeline;
pub mod sheets;
pub mod storage;
pub mod webhook;

pub use error::{AppError, Result};
pub use http::{router, AppState};
