use crate::message::Message;

/// Append-only, ordered log of the messages exchanged in one session.
#[derive(Default, Clone, Debug)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Start a transcript seeded with the assistant's greeting.
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        let mut transcript = Self::default();
        transcript.push(Message::assistant(greeting));
        transcript
    }

    /// Append a message. The timestamp is clamped to the previous entry so
    /// `sent_at` never decreases along the transcript.
    pub fn push(&mut self, mut message: Message) {
        if let Some(last) = self.messages.last() {
            if message.sent_at < last.sent_at {
                message.sent_at = last.sent_at;
            }
        }
        self.messages.push(message);
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Message> + '_ {
        self.messages.iter()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::message::Origin;

    #[test]
    fn seeds_greeting() {
        let transcript = Transcript::with_greeting("Hello");
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.messages()[0].origin, Origin::Assistant);
        assert_eq!(transcript.messages()[0].text, "Hello");
    }

    #[test]
    fn clamps_backwards_timestamps() {
        let mut transcript = Transcript::with_greeting("Hello");
        let first = transcript.messages()[0].sent_at;

        let mut stale = Message::user("earlier clock");
        stale.sent_at = first - Duration::from_secs(60);
        transcript.push(stale);

        let times: Vec<_> = transcript.iter().map(|m| m.sent_at).collect();
        assert_eq!(times[1], first);
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }
}
