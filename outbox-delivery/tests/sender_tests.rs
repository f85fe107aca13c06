//! End-to-end behaviour of the sender, runner, and dispatcher over a
//! memory store and a mock transport.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use outbox_common::{config::Config, render::StaticRenderer};
use outbox_delivery::{
    DispatchOptions, Dispatcher, FsAttachmentSource, MockTransport, Runner, SendJob, SendOutcome,
    Sender, TokioDispatcher,
};
use outbox_store::{Attachment, Email, MemoryStore, Store};

fn pending_email(recipient: &str, subject: &str) -> Email {
    let mut email = Email::new();
    email.recipient.insert(recipient.to_string(), None);
    email.from = Some(outbox_common::address::NamedAddress::with_name(
        "noreply@example.com",
        "Example",
    ));
    email.subject = subject.to_string();
    email.body = format!("<p>{subject}</p>");
    email
}

fn sender(store: &Arc<dyn Store>, transport: &Arc<MockTransport>) -> Sender {
    Sender::new(
        Arc::clone(store),
        Arc::clone(transport) as Arc<dyn outbox_delivery::Transport>,
        Arc::new(FsAttachmentSource::new()),
        Arc::new(StaticRenderer::new()),
        3,
    )
}

fn runner(store: &Arc<dyn Store>, transport: &Arc<MockTransport>, config: Config) -> Runner {
    Runner::new(Arc::clone(store), sender(store, transport), config)
}

#[tokio::test]
async fn successful_send_reaches_the_terminal_sent_state() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::new());
    let sender = sender(&store, &transport);

    let email = store
        .insert(pending_email("john@doe.com", "Hello"))
        .await
        .expect("insert");

    let outcome = sender.send(&email).await.expect("send");
    assert_eq!(outcome, SendOutcome::Sent);

    let sent = store.get(&email.id).await.expect("get");
    assert!(sent.sent_at.is_some());
    assert!(!sent.sending);
    assert!(!sent.failed);
    assert!(sent.error.is_none());
    assert_eq!(sent.attempts, 1);

    let deliveries = transport.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].subject, "Hello");
    assert!(deliveries[0].to.contains_key("john@doe.com"));
}

#[tokio::test]
async fn sending_twice_is_idempotent() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::new());
    let sender = sender(&store, &transport);

    let email = store
        .insert(pending_email("john@doe.com", "Once"))
        .await
        .expect("insert");

    assert_eq!(sender.send(&email).await.expect("send"), SendOutcome::Sent);

    let sent = store.get(&email.id).await.expect("get");
    assert_eq!(
        sender.send(&sent).await.expect("send"),
        SendOutcome::AlreadySent
    );

    // No second attempt, no second delivery.
    assert_eq!(store.get(&email.id).await.expect("get").attempts, 1);
    assert_eq!(transport.delivery_count(), 1);
}

#[tokio::test]
async fn a_claimed_record_is_skipped() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::new());
    let sender = sender(&store, &transport);

    let email = store
        .insert(pending_email("john@doe.com", "Contended"))
        .await
        .expect("insert");

    // Another worker claims the record first.
    store
        .claim_sending(&email.id)
        .await
        .expect("claim")
        .expect("claimable");

    assert_eq!(
        sender.send(&email).await.expect("send"),
        SendOutcome::Skipped
    );
    assert_eq!(transport.delivery_count(), 0);
    assert_eq!(store.get(&email.id).await.expect("get").attempts, 1);
}

#[tokio::test]
async fn failures_are_recorded_and_exhaustion_is_terminal() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::failing());
    let sender = sender(&store, &transport);

    let email = store
        .insert(pending_email("john@doe.com", "Doomed"))
        .await
        .expect("insert");

    // Attempts one and two: recorded, retriable.
    for attempt in 1..=2u32 {
        let outcome = sender
            .send(&store.get(&email.id).await.expect("get"))
            .await
            .expect("send");
        assert_eq!(
            outcome,
            SendOutcome::Failed {
                error: "delivery failed: simulated transport failure".into(),
                exhausted: false,
            }
        );

        let record = store.get(&email.id).await.expect("get");
        assert_eq!(record.attempts, attempt);
        assert!(!record.failed);
        assert!(!record.sending);
        assert!(record.error.is_some());
    }

    // Attempt three: eagerly terminal.
    let outcome = sender
        .send(&store.get(&email.id).await.expect("get"))
        .await
        .expect("send");
    assert!(matches!(
        outcome,
        SendOutcome::Failed {
            exhausted: true,
            ..
        }
    ));

    let record = store.get(&email.id).await.expect("get");
    assert_eq!(record.attempts, 3);
    assert!(record.failed);

    // Exhausted records are invisible to the selector.
    assert!(store.select_queue(3, 20).await.expect("select").is_empty());
}

#[tokio::test]
async fn a_missing_attachment_consumes_the_attempt() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::new());
    let sender = sender(&store, &transport);

    let mut email = pending_email("john@doe.com", "With attachment");
    email
        .attachments
        .push(Attachment::from_path("/nonexistent/invoice.pdf"));
    let email = store.insert(email).await.expect("insert");

    let outcome = sender.send(&email).await.expect("send");
    assert!(matches!(outcome, SendOutcome::Failed { .. }));

    let record = store.get(&email.id).await.expect("get");
    assert_eq!(record.attempts, 1);
    assert!(record.error.expect("error").contains("attachment not found"));
    assert_eq!(transport.delivery_count(), 0);
}

#[tokio::test]
async fn an_attachment_created_after_compose_is_picked_up_at_send_time() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("late.pdf");

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::new());
    let sender = sender(&store, &transport);

    let mut email = pending_email("john@doe.com", "Late attachment");
    email
        .attachments
        .push(Attachment::from_path(path.to_string_lossy().into_owned()));
    let email = store.insert(email).await.expect("insert");

    // The file only appears after composition.
    tokio::fs::write(&path, b"%PDF-").await.unwrap();

    assert_eq!(sender.send(&email).await.expect("send"), SendOutcome::Sent);
    let deliveries = transport.deliveries();
    assert_eq!(deliveries[0].attachments.len(), 1);
    assert_eq!(deliveries[0].attachments[0].content, b"%PDF-");
}

#[tokio::test]
async fn retry_creates_a_fresh_record_and_preserves_the_original() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::failing());
    let sender = sender(&store, &transport);

    let email = store
        .insert(pending_email("john@doe.com", "Retry me"))
        .await
        .expect("insert");

    for _ in 0..3 {
        sender
            .send(&store.get(&email.id).await.expect("get"))
            .await
            .expect("send");
    }

    let failed = store.get(&email.id).await.expect("get");
    assert!(failed.failed);

    let fresh = sender.retry(&failed).await.expect("retry");
    assert_ne!(fresh.id, failed.id);
    assert_eq!(fresh.subject, failed.subject);
    assert_eq!(fresh.recipient, failed.recipient);
    assert_eq!(fresh.attempts, 0);
    assert!(!fresh.failed);
    assert!(fresh.error.is_none());

    // The failed original is untouched.
    let original = store.get(&failed.id).await.expect("get");
    assert!(original.failed);
    assert_eq!(original.attempts, 3);
}

#[tokio::test]
async fn a_cycle_reports_per_record_outcomes() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::new());
    transport.fail_next(1);
    let runner = runner(&store, &transport, Config::default());

    store
        .insert(pending_email("first@example.com", "First"))
        .await
        .expect("insert");
    store
        .insert(pending_email("second@example.com", "Second"))
        .await
        .expect("insert");

    let summary = runner.run_cycle().await.expect("cycle");
    assert_eq!(summary.entries.len(), 2);
    assert_eq!(summary.sent(), 1);
    assert_eq!(summary.failed(), 1);
    assert!(!summary.budget_exhausted);

    let report = summary.to_string();
    assert!(report.contains("First"));
    assert!(report.contains("1 sent, 1 failed"));
}

#[tokio::test]
async fn an_empty_cycle_is_not_an_error() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::new());
    let runner = runner(&store, &transport, Config::default());

    let summary = runner.run_cycle().await.expect("cycle");
    assert!(summary.is_empty());
    assert_eq!(summary.to_string().trim(), "There is nothing to send.");
}

#[tokio::test]
async fn repeated_failing_cycles_exhaust_then_exclude_the_record() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::failing());
    let runner = runner(&store, &transport, Config::default());

    let email = store
        .insert(pending_email("john@doe.com", "Doomed"))
        .await
        .expect("insert");

    for _ in 0..3 {
        let summary = runner.run_cycle().await.expect("cycle");
        assert_eq!(summary.entries.len(), 1);
        assert_eq!(summary.failed(), 1);
    }

    let record = store.get(&email.id).await.expect("get");
    assert_eq!(record.attempts, 3);
    assert!(record.failed);

    // The fourth cycle selects nothing.
    let summary = runner.run_cycle().await.expect("cycle");
    assert!(summary.is_empty());
}

#[tokio::test]
async fn retry_failed_requeues_for_the_next_cycle() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::new());
    transport.fail_next(3);
    let runner = runner(&store, &transport, Config::default());

    store
        .insert(pending_email("john@doe.com", "Second chance"))
        .await
        .expect("insert");

    for _ in 0..3 {
        runner.run_cycle().await.expect("cycle");
    }

    let retried = runner.retry_failed(None).await.expect("retry");
    assert_eq!(retried.len(), 1);

    // The transport works again; the fresh record goes out.
    let summary = runner.run_cycle().await.expect("cycle");
    assert_eq!(summary.sent(), 1);
    assert_eq!(transport.delivery_count(), 1);
}

#[tokio::test]
async fn a_zero_budget_defers_the_whole_batch() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::new());
    let config = Config {
        cycle_budget_secs: 0,
        ..Config::default()
    };
    let runner = runner(&store, &transport, config);

    store
        .insert(pending_email("a@example.com", "A"))
        .await
        .expect("insert");
    store
        .insert(pending_email("b@example.com", "B"))
        .await
        .expect("insert");

    let summary = runner.run_cycle().await.expect("cycle");
    assert!(summary.budget_exhausted);
    assert_eq!(summary.deferred(), 2);
    assert_eq!(transport.delivery_count(), 0);

    // Nothing was claimed; the records stay eligible.
    assert_eq!(store.select_queue(3, 20).await.expect("select").len(), 2);
}

#[tokio::test]
async fn dispatched_jobs_send_in_the_background() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::new());
    let dispatcher = TokioDispatcher::new(Arc::clone(&store), sender(&store, &transport));

    let email = store
        .insert(pending_email("john@doe.com", "Background"))
        .await
        .expect("insert");

    dispatcher
        .enqueue(SendJob { email_id: email.id }, DispatchOptions::default())
        .await
        .expect("enqueue");

    // Wait for the spawned task to finish.
    for _ in 0..100 {
        if store.get(&email.id).await.expect("get").is_sent() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    assert!(store.get(&email.id).await.expect("get").is_sent());
    assert_eq!(transport.delivery_count(), 1);
}
