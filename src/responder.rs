use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The reply chosen for one utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Identifier of the rule (or other source) that produced the text.
    pub rule_id: String,
    pub text: String,
}

/// Produces the assistant's reply to a user utterance. Implementations
/// must always answer; there is no failure path back to the session.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, utterance: &str) -> Reply;
}
