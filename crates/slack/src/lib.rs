//! Slack bot runtime
//!
//! This crate turns a Slack event stream into commands and conversations:
//! - **Transport** (`transport`, `socket`, `web`) - Socket Mode event stream plus Web API calls
//! - **Parsing** (`events`, `commands`) - socket frames, directed commands, plain answers
//! - **Dispatch** (`handler`) - routes commands to one pluggable `CommandHandler`
//! - **Conversations** (`session`) - ask a user a question and wait for an allowed answer
//! - **Bot** (`bot`) - poll loop, directory lookups and outbound actions
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Socket Mode and subscribe to `message.*` events
//! 3. Set env vars: `PARLEY_SLACK_APP_TOKEN`, `PARLEY_SLACK_BOT_TOKEN`, `PARLEY_SLACK_BOT_ID`
//!
//! # Architecture
//!
//! ```text
//! SocketModeTransport → read_batch → extract_directed_command → CommandDispatcher → CommandHandler
//!                                                                                        ↓
//!                      dedicated connection ← ConversationSession ← Bot::converse ←──────┘
//! ```
//!
//! # Key Types
//!
//! - `Bot` - cloneable handle owning the shared connection and the poll loop
//! - `ConversationRequest` / `ConversationSession` - the wait-for-answer protocol
//! - `SlackTransport` / `TransportFactory` - the seam scripted transports plug into

pub mod actions;
pub mod bot;
pub mod commands;
pub mod directory;
pub mod events;
pub mod handler;
pub mod session;
pub mod socket;
pub mod testing;
pub mod time_limit;
pub mod transport;
pub mod web;

pub use actions::{PlatformError, PostedMessage};
pub use bot::{Bot, BotBuilder, BotError, BotSettings, PollMode};
pub use handler::{CommandDispatcher, CommandHandler, DefaultCommandHandler, Sender};
pub use session::{ConversationOutcome, ConversationRequest, ConversationSession};
pub use transport::{SlackTransport, TransportError, TransportFactory};
