//! Backpressure end-to-end: a saturated worker mailbox surfaces
//! `mailbox_full` immediately through try-send and through the correlator.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use async_trait::async_trait;
use weft_rt::mailbox::DEFAULT_MAILBOX_CAPACITY;
use weft_rt::prelude::*;
use weft_rt::{mailbox, spawn_actor, Correlator, MailboxError, RouterError};

/// Worker that parks forever on its first envelope.
struct StuckBehavior;

#[async_trait]
impl Behavior for StuckBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::LanguageWorker
    }

    async fn handle(
        &mut self,
        _envelope: Envelope,
        _ctx: &mut weft_rt::ActorContext,
    ) -> Result<Vec<Envelope>, HandlerError> {
        std::future::pending::<()>().await;
        Ok(Vec::new())
    }
}

fn call_envelope() -> Envelope {
    Envelope::new(
        EnvelopeKind::Call,
        ActorAddress::local("tester"),
        ActorAddress::local("stuck"),
    )
}

#[tokio::test]
async fn test_mailbox_saturation_and_correlated_error() {
    let router = Router::new(NodeId::new("n1"), NodeRole::Main);
    let correlator = Correlator::start(router.clone(), DEFAULT_MAILBOX_CAPACITY).unwrap();

    let (receiver, sender) = mailbox(DEFAULT_MAILBOX_CAPACITY);
    router.register("stuck", sender.clone(), false).unwrap();
    spawn_actor(
        "stuck",
        None,
        false,
        Box::new(StuckBehavior),
        receiver,
        router.clone(),
    );

    // First envelope is pulled into the handler, which never returns.
    router.send(call_envelope()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Fill the queue to its bound.
    for _ in 0..DEFAULT_MAILBOX_CAPACITY {
        sender.try_send(call_envelope()).unwrap();
    }

    // The next try-send is rejected without blocking.
    let overflow = sender.try_send(call_envelope());
    assert_eq!(
        overflow,
        Err(MailboxError::Full {
            capacity: DEFAULT_MAILBOX_CAPACITY
        })
    );
    assert!(matches!(
        router.send(call_envelope()),
        Err(RouterError::MailboxFull { .. })
    ));

    // A correlated call resolves with the mailbox_full error right away,
    // long before its deadline.
    let started = std::time::Instant::now();
    let err = correlator
        .call(
            ActorAddress::local("stuck"),
            Payload::new(),
            Duration::from_secs(30),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::MailboxFull);
    assert!(started.elapsed() < Duration::from_secs(1));

    router.stop_all();
}
