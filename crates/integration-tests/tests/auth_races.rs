//! Race scenarios: interleavings of sign-in, sign-out, and
//! session-refresh events against the slower role lookup.

use std::sync::{Arc, Mutex};

use taproom_auth::error::AuthError;
use taproom_auth::state::{AuthPhase, Session};
use taproom_core::{Email, Role};
use taproom_integration_tests::{
    MockProvider, MockResolver, settle, start_controller, wait_for_state,
};

/// Sign out while the previous sign-in's role lookup is still in
/// flight: the late result belongs to a superseded generation and must
/// be discarded.
#[tokio::test]
async fn test_sign_out_discards_in_flight_role_resolution() {
    let provider = Arc::new(MockProvider::new());
    let resolver = Arc::new(MockResolver::new());

    let session = provider.add_account("owner@example.com", "secret");
    resolver.set_role(session.user_id, Role::Manager);
    resolver.hold();

    let controller = start_controller(&provider, &resolver);
    wait_for_state(controller.store(), |state| !state.bootstrapping).await;

    controller
        .sign_in("owner@example.com", "secret")
        .await
        .expect("sign in");
    assert_eq!(controller.state().generation, 1);
    assert_eq!(controller.state().role, None, "lookup still held open");

    controller.sign_out().await.expect("sign out");
    assert_eq!(controller.state().generation, 2);

    // The generation-1 lookup now completes with Manager; it must not
    // resurrect a role for a signed-out user.
    resolver.release();
    resolver.wait_for_completions(1).await;
    settle().await;

    let state = controller.state();
    assert_eq!(state.session, None);
    assert_eq!(state.role, None);
    assert_eq!(state.generation, 2);
}

/// A sign-in for user B while user A's lookup is held: both lookups
/// complete after the switch, and only B's is applied.
#[tokio::test]
async fn test_late_role_for_superseded_identity_is_discarded() {
    let provider = Arc::new(MockProvider::new());
    let resolver = Arc::new(MockResolver::new());

    let alice = provider.add_account("alice@example.com", "secret");
    resolver.set_role(alice.user_id, Role::Manager);
    resolver.hold();

    let controller = start_controller(&provider, &resolver);
    wait_for_state(controller.store(), |state| !state.bootstrapping).await;

    controller
        .sign_in("alice@example.com", "secret")
        .await
        .expect("sign in");

    // The provider pushes a session switch to Bob before Alice's
    // lookup completes.
    let bob = taproom_integration_tests::session_for("bob@example.com");
    resolver.set_role(bob.user_id, Role::Bartender);
    provider.push_event(Some(bob.clone()));
    wait_for_state(controller.store(), |state| {
        state.session.as_ref() == Some(&bob)
    })
    .await;

    resolver.release();
    resolver.wait_for_completions(2).await;
    settle().await;

    let state = controller.state();
    assert_eq!(state.session, Some(bob));
    assert_eq!(state.role, Some(Role::Bartender), "Alice's role must not win");
}

#[tokio::test]
async fn test_generation_is_strictly_monotonic() {
    let provider = Arc::new(MockProvider::new());
    let resolver = Arc::new(MockResolver::new());

    let controller = start_controller(&provider, &resolver);
    wait_for_state(controller.store(), |state| !state.bootstrapping).await;

    let generations = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&generations);
    let _guard = controller.store().subscribe(move |state| {
        sink.lock().expect("lock").push(state.generation);
    });

    provider.push_event(Some(taproom_integration_tests::session_for(
        "a@example.com",
    )));
    provider.push_event(Some(taproom_integration_tests::session_for(
        "b@example.com",
    )));
    provider.push_event(None);
    provider.push_event(Some(taproom_integration_tests::session_for(
        "c@example.com",
    )));

    wait_for_state(controller.store(), |state| state.generation == 4).await;

    let seen = generations.lock().expect("lock").clone();
    for pair in seen.windows(2) {
        assert!(pair[0] <= pair[1], "generations went backwards: {seen:?}");
    }
    assert_eq!(seen.last(), Some(&4));
}

#[tokio::test]
async fn test_failed_sign_in_mutates_nothing() {
    let provider = Arc::new(MockProvider::new());
    let resolver = Arc::new(MockResolver::new());
    provider.add_account("owner@example.com", "secret");

    let controller = start_controller(&provider, &resolver);
    wait_for_state(controller.store(), |state| !state.bootstrapping).await;
    let before = controller.state();

    let err = controller
        .sign_in("owner@example.com", "wrong")
        .await
        .expect_err("wrong password must fail");
    assert!(matches!(err, AuthError::InvalidCredentials));

    settle().await;
    assert_eq!(controller.state(), before);
}

#[tokio::test]
async fn test_sign_in_resolves_after_session_is_applied() {
    let provider = Arc::new(MockProvider::new());
    let resolver = Arc::new(MockResolver::new());
    let session = provider.add_account("owner@example.com", "secret");
    resolver.hold();

    let controller = start_controller(&provider, &resolver);
    wait_for_state(controller.store(), |state| !state.bootstrapping).await;

    controller
        .sign_in("owner@example.com", "secret")
        .await
        .expect("sign in");

    // Post-condition: the store already holds the identity, even
    // though the role is still resolving.
    let state = controller.state();
    assert_eq!(state.session, Some(session));
    assert_eq!(state.phase(), AuthPhase::AuthenticatedNoRole);
    resolver.release();
}

/// A profile-store outage downgrades to no elevated role for that
/// generation; an explicit refresh retries at the same generation once
/// the store is back.
#[tokio::test]
async fn test_resolver_outage_downgrades_then_refresh_recovers() {
    let provider = Arc::new(MockProvider::new());
    let resolver = Arc::new(MockResolver::new());
    let session = provider.add_account("lead@example.com", "secret");
    resolver.set_role(session.user_id, Role::ShiftManager);
    resolver.set_reachable(false);

    let controller = start_controller(&provider, &resolver);
    wait_for_state(controller.store(), |state| !state.bootstrapping).await;

    controller
        .sign_in("lead@example.com", "secret")
        .await
        .expect("sign in");
    resolver.wait_for_completions(1).await;
    settle().await;

    let downgraded = controller.state();
    assert_eq!(downgraded.phase(), AuthPhase::AuthenticatedNoRole);

    resolver.set_reachable(true);
    controller.refresh_role();
    let recovered = wait_for_state(controller.store(), |state| {
        state.role == Some(Role::ShiftManager)
    })
    .await;
    assert_eq!(
        recovered.generation, downgraded.generation,
        "refresh re-resolves at the current generation"
    );
}

/// A token refresh for the identity already held mirrors the record
/// without bumping the generation or re-running the lookup.
#[tokio::test]
async fn test_same_identity_refresh_keeps_generation_and_role() {
    let provider = Arc::new(MockProvider::new());
    let resolver = Arc::new(MockResolver::new());
    let session = provider.add_account("owner@example.com", "secret");
    resolver.set_role(session.user_id, Role::Manager);

    let controller = start_controller(&provider, &resolver);
    wait_for_state(controller.store(), |state| !state.bootstrapping).await;
    controller
        .sign_in("owner@example.com", "secret")
        .await
        .expect("sign in");
    wait_for_state(controller.store(), |state| state.role == Some(Role::Manager)).await;

    let refreshed = Session {
        user_id: session.user_id,
        email: Email::parse("owner+renamed@example.com").expect("valid email"),
    };
    provider.push_event(Some(refreshed.clone()));
    let state = wait_for_state(controller.store(), |state| {
        state.session.as_ref() == Some(&refreshed)
    })
    .await;

    assert_eq!(state.generation, 1, "mirror must not bump the generation");
    assert_eq!(state.role, Some(Role::Manager), "role survives the refresh");
    assert_eq!(resolver.completions(), 1, "no second lookup");
}

/// `shutdown` stops the pump and releases the change-stream
/// subscription; events emitted afterwards no longer reach the store.
/// Calling it twice is safe.
#[tokio::test]
async fn test_shutdown_stops_the_pump_and_releases_subscription() {
    let provider = Arc::new(MockProvider::new());
    let resolver = Arc::new(MockResolver::new());

    let controller = start_controller(&provider, &resolver);
    wait_for_state(controller.store(), |state| !state.bootstrapping).await;

    controller.shutdown();
    controller.shutdown();
    settle().await;

    let before = controller.state();
    provider.push_event(Some(taproom_integration_tests::session_for(
        "late@example.com",
    )));
    settle().await;

    assert_eq!(controller.state(), before, "events after shutdown are ignored");
    // The emit above pruned the closed subscription handle.
    assert_eq!(provider.subscriber_count(), 0);
}

/// The provider's own sign-out echo after a local sign-out changes
/// nothing: clearing is idempotent.
#[tokio::test]
async fn test_provider_sign_out_echo_is_a_no_op() {
    let provider = Arc::new(MockProvider::new());
    let resolver = Arc::new(MockResolver::new());
    provider.add_account("owner@example.com", "secret");

    let controller = start_controller(&provider, &resolver);
    wait_for_state(controller.store(), |state| !state.bootstrapping).await;
    controller
        .sign_in("owner@example.com", "secret")
        .await
        .expect("sign in");
    controller.sign_out().await.expect("sign out");

    let after_sign_out = controller.state();
    provider.push_event(None);
    settle().await;

    assert_eq!(controller.state(), after_sign_out);
}
