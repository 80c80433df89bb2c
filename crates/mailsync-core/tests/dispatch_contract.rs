//! Contract Test: Lifecycle Event Dispatch
//!
//! Constraints verified:
//! - Each event name reaches exactly one engine operation
//! - Without the throw-on-error flag, failures never raise
//! - With the flag set, the strict path raises the engine's own error

mod common;

use std::sync::Arc;

use common::*;
use mailsync_core::config::keys;
use mailsync_core::error::Error;
use mailsync_core::traits::ConfigStore;
use mailsync_core::{EventDispatcher, EventKind, LifecycleEvent};

fn dispatcher(harness: &Harness) -> EventDispatcher {
    let (engine, _events) = harness.engine();
    EventDispatcher::new(Arc::new(engine), harness.config.clone())
}

#[tokio::test]
async fn subscribed_events_cover_the_lifecycle() {
    let harness = Harness::new(MockContactApi::new()).await;
    let dispatcher = dispatcher(&harness);

    assert_eq!(
        dispatcher.subscribed_events(),
        vec![
            "newsletter.subscribe",
            "newsletter.update",
            "newsletter.unsubscribe"
        ]
    );
}

#[tokio::test]
async fn events_route_to_their_operation() {
    let harness = Harness::new(MockContactApi::new()).await;
    harness.newsletters.set_email(5, "jane@example.com").await;
    let dispatcher = dispatcher(&harness);

    let outcome = dispatcher
        .dispatch(&LifecycleEvent::subscribe("jane@example.com", "Jane", "Doe", None))
        .await;
    assert!(outcome.success);
    assert_eq!(outcome.event, EventKind::Subscribe);
    assert_eq!(harness.api.create_call_count(), 1);

    let outcome = dispatcher
        .dispatch(&LifecycleEvent::update(5, "jane@new.example.com", "Jane", "Doe", None))
        .await;
    assert!(outcome.success);
    assert_eq!(harness.api.remove_calls().len(), 1);

    let outcome = dispatcher
        .dispatch(&LifecycleEvent::unsubscribe("jane@new.example.com"))
        .await;
    assert!(outcome.success);
    assert_eq!(harness.api.unsubscribe_calls().len(), 1);
}

#[tokio::test]
async fn failures_are_reported_not_raised_by_default() {
    let harness = Harness::new(MockContactApi::new()).await;
    MockContactApi::set(&harness.api.fail_create, true);
    let dispatcher = dispatcher(&harness);
    let event = LifecycleEvent::subscribe("jane@example.com", "Jane", "Doe", None);

    let outcome = dispatcher.dispatch(&event).await;
    assert!(!outcome.success);
    assert!(outcome.message.is_some());
    assert!(!outcome.correlation_id.is_empty());

    let strict = dispatcher
        .dispatch_strict(&event)
        .await
        .expect("flag unset, nothing raised");
    assert!(!strict.success);
}

#[tokio::test]
async fn strict_dispatch_raises_when_flag_set() {
    let harness = Harness::new(MockContactApi::new()).await;
    harness
        .config
        .write(keys::EXCEPTION_ON_ERRORS, "true")
        .await
        .unwrap();
    MockContactApi::set(&harness.api.fail_create, true);
    let dispatcher = dispatcher(&harness);

    let err = dispatcher
        .dispatch_strict(&LifecycleEvent::subscribe("jane@example.com", "Jane", "Doe", None))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RemoteApi { .. }), "got {err:?}");
}

#[tokio::test]
async fn strict_dispatch_keeps_resolution_errors_distinct() {
    let harness = Harness::new(MockContactApi::new()).await;
    harness
        .config
        .write(keys::EXCEPTION_ON_ERRORS, "true")
        .await
        .unwrap();
    harness.config.write(keys::NEWSLETTER_LIST, "").await.unwrap();
    let dispatcher = dispatcher(&harness);

    let err = dispatcher
        .dispatch_strict(&LifecycleEvent::subscribe("jane@example.com", "Jane", "Doe", None))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Resolution { .. }), "got {err:?}");
}

#[tokio::test]
async fn strict_dispatch_passes_successes_through() {
    let harness = Harness::new(MockContactApi::new()).await;
    harness
        .config
        .write(keys::EXCEPTION_ON_ERRORS, "true")
        .await
        .unwrap();
    let dispatcher = dispatcher(&harness);

    let outcome = dispatcher
        .dispatch_strict(&LifecycleEvent::unsubscribe("nobody@example.com"))
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.message.as_deref(), Some("subscriber not synchronized"));
}

#[tokio::test]
async fn update_without_subscription_id_fails_softly() {
    let harness = Harness::new(MockContactApi::new()).await;
    let dispatcher = dispatcher(&harness);
    let mut event = LifecycleEvent::update(1, "jane@example.com", "", "", None);
    event.subscription_id = None;

    let outcome = dispatcher.dispatch(&event).await;

    assert!(!outcome.success);
    assert_eq!(harness.api.total_calls(), 0);
}
