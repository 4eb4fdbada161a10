//! End-to-end behaviour of a chat session on virtual time.

use std::sync::Arc;
use std::time::Duration;

use softsell_chat::{
    ChatSession, Origin, RuleTable, SessionEvent, SessionSettings, TelemetryCollector,
    DEFAULT_GREETING, DEFAULT_REPLY_DELAY, FALLBACK_RESPONSE, LICENSE_TYPES_RESPONSE,
    SECURITY_RESPONSE, SELL_PROCESS_RESPONSE, TURNAROUND_RESPONSE,
};

fn open() -> ChatSession {
    ChatSession::open(SessionSettings::default(), Arc::new(RuleTable::default()))
}

async fn reply_to(utterance: &str) -> String {
    let session = open();
    assert!(session.submit(utterance));
    session.wait_idle().await;
    let transcript = session.transcript();
    assert_eq!(transcript.len(), 3);
    transcript[2].text.clone()
}

#[tokio::test(start_paused = true)]
async fn starts_with_greeting() {
    let session = open();
    let transcript = session.transcript();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].origin, Origin::Assistant);
    assert_eq!(transcript[0].text, DEFAULT_GREETING);
    assert!(!session.is_composing());
}

#[tokio::test(start_paused = true)]
async fn answers_each_canned_topic() {
    assert_eq!(reply_to("I want to sell my license").await, SELL_PROCESS_RESPONSE);
    assert_eq!(
        reply_to("what license types do you accept").await,
        LICENSE_TYPES_RESPONSE
    );
    assert_eq!(reply_to("how long will this take").await, TURNAROUND_RESPONSE);
    assert_eq!(reply_to("is this secure").await, SECURITY_RESPONSE);
    assert_eq!(reply_to("hello").await, FALLBACK_RESPONSE);
}

#[tokio::test(start_paused = true)]
async fn earlier_rule_takes_precedence() {
    assert_eq!(
        reply_to("how do I sell my license securely").await,
        SELL_PROCESS_RESPONSE
    );
}

#[tokio::test(start_paused = true)]
async fn user_message_is_immediate_and_reply_waits_for_delay() {
    let session = open();
    let before = session.len();

    session.submit("hi");
    assert!(session.is_composing());
    assert_eq!(session.len(), before + 1);
    assert_eq!(session.transcript()[before].origin, Origin::User);

    tokio::time::advance(DEFAULT_REPLY_DELAY - Duration::from_millis(1)).await;
    tokio::task::yield_now().await;
    assert_eq!(session.len(), before + 1);
    assert!(session.is_composing());

    tokio::time::advance(Duration::from_millis(1)).await;
    session.wait_idle().await;
    assert!(!session.is_composing());
    assert_eq!(session.len(), before + 2);
}

#[tokio::test(start_paused = true)]
async fn whitespace_is_a_no_op() {
    let session = open();
    let before = session.transcript();

    for blank in ["", " ", "\n\t  "] {
        assert!(!session.submit(blank));
        assert!(!session.submit_suggested(blank));
    }

    assert_eq!(session.transcript(), before);
    assert!(!session.is_composing());
}

#[tokio::test(start_paused = true)]
async fn reading_does_not_change_the_transcript() {
    let session = open();
    session.submit("is my data safe?");
    session.wait_idle().await;

    assert_eq!(session.transcript(), session.transcript());
}

#[tokio::test(start_paused = true)]
async fn rapid_submits_are_answered_in_order() {
    let session = open();
    session.submit("hello");
    session.submit("is this secure");
    session.submit_suggested("How long does the process take?");
    assert_eq!(session.pending_replies(), 3);

    session.wait_idle().await;

    let transcript = session.transcript();
    assert_eq!(transcript.len(), 7);
    let replies: Vec<&str> = transcript
        .iter()
        .filter(|m| m.origin == Origin::Assistant)
        .skip(1)
        .map(|m| m.text.as_str())
        .collect();
    assert_eq!(
        replies,
        vec![FALLBACK_RESPONSE, SECURITY_RESPONSE, TURNAROUND_RESPONSE]
    );
    assert!(transcript.windows(2).all(|w| w[0].sent_at <= w[1].sent_at));
}

#[tokio::test(start_paused = true)]
async fn each_reply_is_due_after_its_own_submit() {
    let session = open();
    let started = tokio::time::Instant::now();

    session.submit("first");
    tokio::time::advance(Duration::from_millis(1000)).await;
    session.submit("second");

    session.wait_idle().await;
    assert!(started.elapsed() >= Duration::from_millis(2500));
    assert_eq!(session.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn closing_drops_pending_replies() {
    let session = open();
    session.submit("hello");
    session.close();
    session.wait_idle().await;

    tokio::time::sleep(DEFAULT_REPLY_DELAY * 2).await;
    assert_eq!(session.len(), 2);
    assert!(session.is_closed());
}

#[tokio::test(start_paused = true)]
async fn records_rule_hits() {
    let telemetry = TelemetryCollector::default();
    let session = ChatSession::open(
        SessionSettings::default().with_telemetry(telemetry.clone()),
        Arc::new(RuleTable::default()),
    );

    session.submit("Is my data secure?");
    session.submit("what's up");
    session.wait_idle().await;

    let hits = telemetry.rule_hits();
    assert_eq!(hits.get("security"), Some(&1));
    assert_eq!(hits.get("fallback"), Some(&1));
}

#[tokio::test(start_paused = true)]
async fn custom_delay_is_honoured() {
    let session = ChatSession::open(
        SessionSettings::default().with_reply_delay(Duration::from_millis(10)),
        Arc::new(RuleTable::default()),
    );
    let started = tokio::time::Instant::now();
    session.submit("hello");
    session.wait_idle().await;
    assert!(started.elapsed() < DEFAULT_REPLY_DELAY);
    assert_eq!(session.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn events_keep_exchange_order_without_delay() {
    for _ in 0..500 {
        let session = ChatSession::open(
            SessionSettings::default().with_reply_delay(Duration::ZERO),
            Arc::new(RuleTable::default()),
        );
        let mut events = session.subscribe();

        session.submit("hello");
        session.wait_idle().await;

        let mut seen = Vec::new();
        for _ in 0..4 {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("event within timeout")
                .unwrap();
            seen.push(event);
        }

        assert!(
            matches!(&seen[0], SessionEvent::MessageAppended { message } if message.is_user())
        );
        assert_eq!(seen[1], SessionEvent::ComposingChanged { composing: true });
        assert!(
            matches!(&seen[2], SessionEvent::MessageAppended { message } if !message.is_user())
        );
        assert_eq!(seen[3], SessionEvent::ComposingChanged { composing: false });
        session.close();
    }
}
