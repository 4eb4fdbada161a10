//! Canned-response dialogue engine for the SoftSell support chat widget.
//!
//! The crate provides:
//! - An ordered keyword `RuleTable` that picks one canned reply per utterance.
//! - A `ChatSession` holding the transcript, the composing flag and the
//!   delayed reply worker.
//! - TOML configuration, `tracing` setup and an optional axum adapter
//!   (feature `server`).

mod config;
mod error;
mod message;
mod responder;
mod rules;
#[cfg(feature = "server")]
mod server;
mod session;
mod telemetry;
mod transcript;

pub use config::{AppConfig, DialogueConfig, ServerConfig, TelemetryConfig};
pub use error::{ChatError, Result};
pub use message::{Message, Origin};
pub use responder::{Reply, Responder};
pub use rules::{
    normalize, Condition, Rule, RuleTable, FALLBACK_RESPONSE, LICENSE_TYPES_RESPONSE,
    SECURITY_RESPONSE, SELL_PROCESS_RESPONSE, TURNAROUND_RESPONSE,
};
#[cfg(feature = "server")]
pub use server::{
    ChatServer, SessionView, StatsResponse, SubmitRequest, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_SESSIONS,
};
pub use session::{
    ChatSession, SessionEvent, SessionSettings, DEFAULT_GREETING, DEFAULT_REPLY_DELAY,
    DEFAULT_SUGGESTION_LIMIT, SUGGESTED_QUESTIONS,
};
pub use telemetry::{init_tracing, TelemetryCollector, TelemetryEvent, DEFAULT_EVENT_CAPACITY};
pub use transcript::Transcript;
