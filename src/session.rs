//! A single chat session: transcript, composing state and the delayed
//! reply worker.
//!
//! `submit` appends the user's message and returns at once. A per-session
//! worker task answers queued utterances in submission order, each one
//! `reply_delay` after it was submitted, and appends the assistant reply
//! unless the session has been closed in the meantime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{sleep_until, Instant};
use uuid::Uuid;

use crate::message::Message;
use crate::responder::{Reply, Responder};
use crate::telemetry::TelemetryCollector;
use crate::transcript::Transcript;

pub const DEFAULT_REPLY_DELAY: Duration = Duration::from_millis(1500);

pub const DEFAULT_GREETING: &str =
    "Hi there! I'm SoftSell's virtual assistant. How can I help you today?";

pub const SUGGESTED_QUESTIONS: [&str; 4] = [
    "How do I sell my license?",
    "What types of licenses do you buy?",
    "How long does the process take?",
    "Is my data secure?",
];

/// Suggestions are shown while the transcript has at most this many entries.
pub const DEFAULT_SUGGESTION_LIMIT: usize = 2;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub reply_delay: Duration,
    pub greeting: String,
    pub suggestions: Vec<String>,
    pub suggestion_limit: usize,
    pub telemetry: Option<TelemetryCollector>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            reply_delay: DEFAULT_REPLY_DELAY,
            greeting: DEFAULT_GREETING.to_string(),
            suggestions: SUGGESTED_QUESTIONS.iter().map(|q| q.to_string()).collect(),
            suggestion_limit: DEFAULT_SUGGESTION_LIMIT,
            telemetry: None,
        }
    }
}

impl SessionSettings {
    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_suggestion_limit(mut self, limit: usize) -> Self {
        self.suggestion_limit = limit;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }
}

/// Change notifications for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    MessageAppended { message: Message },
    ComposingChanged { composing: bool },
    Closed,
}

struct QueuedUtterance {
    utterance: String,
    due: Instant,
}

struct State {
    transcript: Transcript,
    closed: bool,
    last_activity: Instant,
}

struct Shared {
    id: Uuid,
    settings: SessionSettings,
    state: Mutex<State>,
    pending: watch::Sender<usize>,
    events: broadcast::Sender<SessionEvent>,
    queue: mpsc::UnboundedSender<QueuedUtterance>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn deliver(&self, reply: Reply) {
        let mut state = self.lock();
        if state.closed {
            tracing::debug!(session = %self.id, "dropping reply for closed session");
            return;
        }

        state.transcript.push(Message::assistant(reply.text));
        state.last_activity = Instant::now();
        let appended = state.transcript.last().cloned();

        let mut remaining = 0;
        self.pending.send_modify(|n| {
            *n = n.saturating_sub(1);
            remaining = *n;
        });

        tracing::info!(session = %self.id, rule = %reply.rule_id, "assistant replied");
        if let Some(telemetry) = &self.settings.telemetry {
            telemetry.record(
                "reply",
                serde_json::json!({"session": self.id, "rule": reply.rule_id}),
            );
        }

        if let Some(message) = appended {
            self.emit(SessionEvent::MessageAppended { message });
        }
        if remaining == 0 {
            self.emit(SessionEvent::ComposingChanged { composing: false });
        }
    }
}

/// Handle to a live chat session. Clones share the same session.
#[derive(Clone)]
pub struct ChatSession {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.shared.id)
            .field("pending", &*self.shared.pending.borrow())
            .finish()
    }
}

impl ChatSession {
    /// Open a session seeded with the greeting. Must be called from within
    /// a tokio runtime; the reply worker is spawned onto it.
    pub fn open(settings: SessionSettings, responder: Arc<dyn Responder>) -> Self {
        let id = Uuid::new_v4();
        let (queue, queue_rx) = mpsc::unbounded_channel();
        let (pending, _) = watch::channel(0usize);
        let (events, _) = broadcast::channel(64);

        let shared = Arc::new(Shared {
            id,
            state: Mutex::new(State {
                transcript: Transcript::with_greeting(settings.greeting.clone()),
                closed: false,
                last_activity: Instant::now(),
            }),
            settings,
            pending,
            events,
            queue,
        });

        tokio::spawn(run_replies(Arc::downgrade(&shared), queue_rx, responder));
        tracing::info!(session = %id, "chat session opened");

        Self { shared }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Queue `utterance` for a reply. Blank input and closed sessions are
    /// ignored; the return value tells whether the message was accepted.
    pub fn submit(&self, utterance: &str) -> bool {
        if utterance.trim().is_empty() {
            tracing::debug!(session = %self.shared.id, "ignoring blank utterance");
            return false;
        }

        let mut state = self.shared.lock();
        if state.closed {
            tracing::debug!(session = %self.shared.id, "ignoring utterance for closed session");
            return false;
        }

        state.transcript.push(Message::user(utterance));
        state.last_activity = Instant::now();
        let appended = state.transcript.last().cloned();

        let mut was_idle = false;
        self.shared.pending.send_modify(|n| {
            was_idle = *n == 0;
            *n += 1;
        });

        let queued = QueuedUtterance {
            utterance: utterance.to_string(),
            due: Instant::now() + self.shared.settings.reply_delay,
        };
        if self.shared.queue.send(queued).is_err() {
            tracing::warn!(session = %self.shared.id, "reply worker is gone");
            self.shared.pending.send_modify(|n| *n = n.saturating_sub(1));
            was_idle = false;
        }

        // Emitted under the lock so the worker's reply events cannot
        // overtake them.
        if let Some(message) = appended {
            self.shared.emit(SessionEvent::MessageAppended { message });
        }
        if was_idle {
            self.shared
                .emit(SessionEvent::ComposingChanged { composing: true });
        }
        drop(state);

        tracing::debug!(
            session = %self.shared.id,
            chars = utterance.chars().count(),
            "user message accepted"
        );
        true
    }

    /// Same as [`ChatSession::submit`]; used for the suggested-question
    /// buttons.
    pub fn submit_suggested(&self, question: &str) -> bool {
        self.submit(question)
    }

    /// Snapshot of the transcript in append order.
    pub fn transcript(&self) -> Vec<Message> {
        self.shared.lock().transcript.messages().to_vec()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().transcript.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().transcript.is_empty()
    }

    pub fn is_composing(&self) -> bool {
        *self.shared.pending.borrow() > 0
    }

    pub fn pending_replies(&self) -> usize {
        *self.shared.pending.borrow()
    }

    /// Suggested questions, or nothing once the user has engaged.
    pub fn visible_suggestions(&self) -> &[String] {
        if self.len() <= self.shared.settings.suggestion_limit {
            &self.shared.settings.suggestions
        } else {
            &[]
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Resolves once no reply is outstanding.
    pub async fn wait_idle(&self) {
        let mut pending = self.shared.pending.subscribe();
        // The sender lives in `shared`, which we keep alive.
        let _ = pending.wait_for(|n| *n == 0).await;
    }

    /// Tear the session down. Replies still waiting on their delay are
    /// discarded without touching the transcript.
    pub fn close(&self) {
        let mut state = self.shared.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let was_composing = self.shared.pending.send_replace(0) > 0;
        if was_composing {
            self.shared
                .emit(SessionEvent::ComposingChanged { composing: false });
        }
        self.shared.emit(SessionEvent::Closed);
        drop(state);

        tracing::info!(session = %self.shared.id, "chat session closed");
    }

    /// Time since the last message was appended.
    pub fn idle_for(&self) -> Duration {
        self.shared.lock().last_activity.elapsed()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

async fn run_replies(
    shared: Weak<Shared>,
    mut queue: mpsc::UnboundedReceiver<QueuedUtterance>,
    responder: Arc<dyn Responder>,
) {
    while let Some(job) = queue.recv().await {
        sleep_until(job.due).await;

        let Some(shared) = shared.upgrade() else {
            break;
        };
        if shared.lock().closed {
            break;
        }
        let reply = responder.respond(&job.utterance).await;
        shared.deliver(reply);
    }
}
