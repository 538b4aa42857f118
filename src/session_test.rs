use std::sync::atomic::Ordering;

use super::*;
use crate::provider::test_helpers::{PASSWORD, ScriptedProvider, session_for};

fn store_with(provider: &Arc<ScriptedProvider>) -> SessionStore {
    SessionStore::new(Arc::clone(provider) as Arc<dyn IdentityProvider>, StoreOptions::default())
}

async fn wait_for_call(provider: &ScriptedProvider, call: &'static str, count: usize) {
    for _ in 0..10_000 {
        if provider.calls().iter().filter(|c| **c == call).count() >= count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("provider never saw {call}");
}

// =============================================================================
// lifecycle
// =============================================================================

#[test]
fn new_store_is_empty_and_loading() {
    let provider = Arc::new(ScriptedProvider::new());
    let store = store_with(&provider);
    let snap = store.snapshot();
    assert!(snap.user.is_none());
    assert!(snap.loading);
    assert!(snap.error.is_none());
    assert!(!snap.is_authenticated());
    assert_eq!(provider.subscriber_count(), 1);
}

#[tokio::test]
async fn start_hydrates_existing_session() {
    let provider = Arc::new(ScriptedProvider::with_session(session_for("a@b.com")));
    let store = SessionStore::start(Arc::clone(&provider) as Arc<dyn IdentityProvider>, StoreOptions::default()).await;
    assert!(store.is_authenticated());
    assert!(!store.is_loading());
    assert_eq!(store.user().unwrap().email.as_deref(), Some("a@b.com"));
}

#[tokio::test]
async fn teardown_detaches_push_subscription() {
    let provider = Arc::new(ScriptedProvider::new());
    let store = store_with(&provider);
    store.teardown();
    store.teardown();
    assert_eq!(provider.subscriber_count(), 0);

    provider.push(SessionChange::new(
        crate::provider::SessionEvent::SignedIn,
        Some(session_for("a@b.com")),
    ));
    assert!(store.user().is_none());
}

#[test]
fn dropping_last_handle_detaches() {
    let provider = Arc::new(ScriptedProvider::new());
    let store = store_with(&provider);
    let clone = store.clone();
    drop(store);
    assert_eq!(provider.subscriber_count(), 1);
    drop(clone);
    assert_eq!(provider.subscriber_count(), 0);
}

// =============================================================================
// check_session
// =============================================================================

#[tokio::test]
async fn check_session_is_idempotent() {
    let provider = Arc::new(ScriptedProvider::with_session(session_for("a@b.com")));
    let store = store_with(&provider);

    store.check_session().await;
    let first = store.user();
    store.check_session().await;
    assert_eq!(store.user(), first);
    assert!(first.is_some());
}

#[tokio::test]
async fn check_session_without_session_leaves_user_empty() {
    let provider = Arc::new(ScriptedProvider::new());
    let store = store_with(&provider);
    store.check_session().await;
    store.check_session().await;
    assert!(store.user().is_none());
    assert!(store.error().is_none());
}

#[tokio::test]
async fn check_session_failure_sets_error_keeps_user() {
    let provider = Arc::new(ScriptedProvider::with_session(session_for("a@b.com")));
    let store = store_with(&provider);
    store.check_session().await;

    provider.fail_session_query.store(true, Ordering::SeqCst);
    store.check_session().await;

    assert_eq!(store.error().as_deref(), Some(messages::CHECK_SESSION_FAILED));
    assert!(store.is_authenticated());
    assert!(!store.is_loading());
}

// =============================================================================
// login / register
// =============================================================================

#[tokio::test]
async fn login_success_sets_user() {
    let provider = Arc::new(ScriptedProvider::new());
    let store = store_with(&provider);
    store.check_session().await;

    let response = store.login("a@b.com", PASSWORD).await.unwrap();
    assert!(response.session.is_some());
    assert!(store.is_authenticated());
    assert_eq!(store.user(), response.user);
    assert!(store.error().is_none());
}

#[tokio::test]
async fn login_wrong_password_sets_error_and_propagates() {
    let provider = Arc::new(ScriptedProvider::new());
    let store = store_with(&provider);
    store.check_session().await;

    let err = store.login("a@b.com", "wrong").await.unwrap_err();
    assert!(err.is_rejection());
    assert!(store.user().is_none());
    assert_eq!(store.error().as_deref(), Some(messages::LOGIN_FAILED));
    assert!(!store.is_loading());
}

#[tokio::test]
async fn login_provider_outage_is_distinguishable() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.unreachable.store(true, Ordering::SeqCst);
    let store = store_with(&provider);

    let err = store.login("a@b.com", PASSWORD).await.unwrap_err();
    assert!(matches!(err, AuthError::Provider(ProviderError::Request(_))));
    assert_eq!(store.error().as_deref(), Some(messages::LOGIN_FAILED));
}

#[tokio::test]
async fn register_does_not_sign_in_when_confirmation_pending() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.require_confirmation.store(true, Ordering::SeqCst);
    let store = store_with(&provider);
    store.check_session().await;

    let response = store.register("new@b.com", "pw123456").await.unwrap();
    assert!(response.session.is_none());
    assert_eq!(response.user.unwrap().email.as_deref(), Some("new@b.com"));
    assert!(store.user().is_none());
}

#[tokio::test]
async fn register_duplicate_sets_error_and_propagates() {
    let provider = Arc::new(ScriptedProvider::new());
    let store = store_with(&provider);

    let err = store.register("a@b.com", "whatever").await.unwrap_err();
    assert!(matches!(err, AuthError::Rejected { status: 422, .. }));
    assert_eq!(store.error().as_deref(), Some(messages::REGISTER_FAILED));
    assert!(!store.is_loading());
}

// =============================================================================
// logout
// =============================================================================

#[tokio::test]
async fn logout_clears_user() {
    let provider = Arc::new(ScriptedProvider::with_session(session_for("a@b.com")));
    let store = store_with(&provider);
    store.check_session().await;

    store.logout().await;
    assert!(store.user().is_none());
    assert!(store.error().is_none());
    assert!(provider.current().is_none());
}

#[tokio::test]
async fn logout_failure_is_reported_not_raised() {
    let provider = Arc::new(ScriptedProvider::with_session(session_for("a@b.com")));
    let store = store_with(&provider);
    store.check_session().await;
    provider.fail_sign_out.store(true, Ordering::SeqCst);

    store.logout().await;

    assert_eq!(store.error().as_deref(), Some(messages::LOGOUT_FAILED));
    assert!(store.is_authenticated());
    assert!(!store.is_loading());
}

// =============================================================================
// loading / error bracket
// =============================================================================

#[tokio::test]
async fn loading_true_while_in_flight_then_false() {
    let provider = Arc::new(ScriptedProvider::new());
    let store = store_with(&provider);
    store.check_session().await;
    assert!(!store.is_loading());

    provider.hold();
    let task = tokio::spawn({
        let store = store.clone();
        async move { store.login("a@b.com", "wrong").await }
    });
    wait_for_call(&provider, "sign_in_with_password", 1).await;
    assert!(store.is_loading());

    provider.release(1);
    assert!(task.await.unwrap().is_err());
    assert!(!store.is_loading());
}

#[tokio::test]
async fn error_cleared_before_provider_resolves() {
    let provider = Arc::new(ScriptedProvider::new());
    let store = store_with(&provider);
    store.login("a@b.com", "wrong").await.unwrap_err();
    assert!(store.error().is_some());

    provider.hold();
    let task = tokio::spawn({
        let store = store.clone();
        async move { store.check_session().await }
    });
    wait_for_call(&provider, "get_current_session", 1).await;
    assert!(store.error().is_none());

    provider.release(1);
    task.await.unwrap();
    assert!(store.error().is_none());
}

#[tokio::test]
async fn dropped_operation_still_resolves_loading() {
    let provider = Arc::new(ScriptedProvider::new());
    let store = store_with(&provider);
    store.check_session().await;

    provider.hold();
    let task = tokio::spawn({
        let store = store.clone();
        async move { store.logout().await }
    });
    wait_for_call(&provider, "sign_out", 1).await;
    assert!(store.is_loading());

    task.abort();
    let _ = task.await;
    assert!(!store.is_loading());
}

#[tokio::test]
async fn operation_timeout_resolves_hung_call() {
    let provider = Arc::new(ScriptedProvider::new());
    let options = StoreOptions { operation_timeout: Some(Duration::from_millis(20)) };
    let store = SessionStore::new(Arc::clone(&provider) as Arc<dyn IdentityProvider>, options);
    provider.hold();

    let err = store.login("a@b.com", PASSWORD).await.unwrap_err();
    assert!(matches!(err, AuthError::Provider(ProviderError::Timeout { .. })));
    assert!(!store.is_loading());
    assert_eq!(store.error().as_deref(), Some(messages::LOGIN_FAILED));
}

#[tokio::test]
async fn last_finisher_wins_between_concurrent_calls() {
    let provider = Arc::new(ScriptedProvider::new());
    let store = store_with(&provider);
    store.check_session().await;
    provider.hold();

    let failing = tokio::spawn({
        let store = store.clone();
        async move { store.login("a@b.com", "wrong").await }
    });
    wait_for_call(&provider, "sign_in_with_password", 1).await;
    let succeeding = tokio::spawn({
        let store = store.clone();
        async move { store.login("a@b.com", PASSWORD).await }
    });
    wait_for_call(&provider, "sign_in_with_password", 2).await;

    provider.release(2);
    assert!(failing.await.unwrap().is_err());
    assert!(succeeding.await.unwrap().is_ok());
    assert!(store.is_authenticated());
    assert!(!store.is_loading());
}

// =============================================================================
// push + observers
// =============================================================================

#[tokio::test]
async fn pushed_absent_session_clears_user() {
    let provider = Arc::new(ScriptedProvider::with_session(session_for("a@b.com")));
    let store = store_with(&provider);
    store.check_session().await;
    assert!(store.is_authenticated());

    provider.push(SessionChange::signed_out());

    assert!(store.user().is_none());
    assert!(provider.calls().iter().all(|c| *c != "sign_out"));
}

#[tokio::test]
async fn pushed_session_sets_user() {
    let provider = Arc::new(ScriptedProvider::new());
    let store = store_with(&provider);
    provider.push(SessionChange::new(
        crate::provider::SessionEvent::TokenRefreshed,
        Some(session_for("other@b.com")),
    ));
    assert_eq!(store.user().unwrap().email.as_deref(), Some("other@b.com"));
}

#[tokio::test]
async fn observers_see_each_transition() {
    let provider = Arc::new(ScriptedProvider::new());
    let store = store_with(&provider);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sub = {
        let seen = Arc::clone(&seen);
        store.subscribe(move |snap| seen.lock().unwrap().push((snap.loading, snap.is_authenticated())))
    };

    store.login("a@b.com", PASSWORD).await.unwrap();

    let seen_now = seen.lock().unwrap().clone();
    assert_eq!(seen_now.first(), Some(&(true, false)));
    assert_eq!(seen_now.last(), Some(&(false, true)));

    sub.unsubscribe();
    store.logout().await;
    assert_eq!(seen.lock().unwrap().len(), seen_now.len());
}
