//! Gmail Assistant
//!
//! An MCP server that acts as a personal assistant over a linked Google
//! account: it drafts email in the voice of an AI persona, sends it through
//! Gmail, schedules calendar events, and resolves people's names to email
//! addresses by scanning the senders and recipients in the user's mailbox.
//!
//! # Contact resolution
//!
//! Mailbox scans page through `messages.list`, fetch headers through Gmail
//! batch requests and back off on rate limits. Harvested contacts are cached
//! per user for a fixed window so repeated lookups stay local.

pub mod accounts;
pub mod auth;
pub mod calendar_api;
pub mod completion;
pub mod config;
pub mod contact;
pub mod contact_cache;
pub mod credentials;
pub mod errors;
pub mod fetcher;
pub mod gmail_api;
pub mod header;
pub mod logging;
pub mod matcher;
pub mod names;
pub mod oauth;
pub mod orchestrator;
pub mod persona;
pub mod prompts;
pub mod resolver;
pub mod retry;
pub mod server;
pub mod store;
pub mod utils;

// Re-export key types for use in tests
pub use crate::config::Config;
pub use crate::contact::{Contact, ContactSet};
pub use crate::errors::{AssistantError, GmailApiError};
pub use crate::logging::setup_logging;
pub use crate::resolver::{ContactResolver, ResolveResponse};
pub use crate::server::AssistantServer;
