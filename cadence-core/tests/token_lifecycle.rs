mod common;

use std::sync::Arc;

use cadence_core::{
    error::Error,
    store::{PreferenceStore, TOKEN_KEY},
};
use common::{token_body, Harness, UserAction, MINUTE, NOW};

#[test]
fn fresh_token_is_used_without_network() {
    let harness = Harness::new(UserAction::Ignore);
    harness.store_credential("a0", Some("r0"), NOW + 10 * MINUTE);

    let client = harness.provider.ensure_client().unwrap();
    assert_eq!(client.access_token(), "a0");
    assert_eq!(harness.endpoint.calls(), 0);
    assert!(harness.browser.opened.lock().is_empty());

    let again = harness.provider.ensure_client().unwrap();
    assert!(Arc::ptr_eq(&client, &again));
}

#[test]
fn token_just_outside_margin_is_not_refreshed() {
    let harness = Harness::new(UserAction::Ignore);
    harness.store_credential("a0", Some("r0"), NOW + 5 * MINUTE + 1_000);

    harness.provider.ensure_client().unwrap();
    assert_eq!(harness.endpoint.calls(), 0);
}

#[test]
fn token_expiring_exactly_at_margin_is_refreshed() {
    let harness = Harness::new(UserAction::Ignore);
    harness.store_credential("a0", Some("r0"), NOW + 5 * MINUTE);
    harness.endpoint.reply(200, token_body("a1", Some("r1")));

    let client = harness.provider.ensure_client().unwrap();
    assert_eq!(client.access_token(), "a1");
    assert_eq!(harness.endpoint.grants(), ["refresh_token"]);
}

#[test]
fn token_inside_margin_is_refreshed_once() {
    let harness = Harness::new(UserAction::Ignore);
    harness.store_credential("a0", Some("r0"), NOW + 5 * MINUTE - 1_000);
    harness.endpoint.reply(200, token_body("a1", Some("r1")));

    harness.provider.ensure_client().unwrap();
    harness.provider.ensure_client().unwrap();

    assert_eq!(harness.endpoint.calls(), 1);
    let form = &harness.endpoint.requests.lock()[0];
    assert_eq!(form["refresh_token"], "r0");
    assert_eq!(form["client_id"], "test-client");
}

#[test]
fn refresh_without_new_refresh_token_keeps_the_old_one() {
    let harness = Harness::new(UserAction::Ignore);
    harness.store_credential("a0", Some("r1"), NOW - MINUTE);
    harness.endpoint.reply(200, token_body("a1", None));

    harness.provider.ensure_client().unwrap();

    let stored = harness.stored().unwrap();
    assert_eq!(stored.access_token, "a1");
    assert_eq!(stored.refresh_token.as_deref(), Some("r1"));
    assert_eq!(stored.expires_at, NOW + 3600 * 1000);
}

#[test]
fn refreshed_token_replaces_the_cached_client() {
    let harness = Harness::new(UserAction::Ignore);
    harness.store_credential("a0", Some("r0"), NOW + 10 * MINUTE);
    let first = harness.provider.ensure_client().unwrap();

    harness
        .clock
        .0
        .store(NOW + 60 * MINUTE, std::sync::atomic::Ordering::SeqCst);
    harness.endpoint.reply(200, token_body("a1", Some("r1")));
    let second = harness.provider.ensure_client().unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.access_token(), "a1");
    assert!(Arc::ptr_eq(
        &harness.provider.cached_client().unwrap(),
        &second
    ));
}

#[test]
fn rejected_refresh_falls_through_to_login() {
    let harness = Harness::new(UserAction::Approve);
    harness.store_credential("a0", Some("revoked"), NOW - MINUTE);
    harness
        .endpoint
        .reply(400, r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#);
    harness.endpoint.reply(200, token_body("a2", Some("r2")));

    let client = harness.provider.ensure_client().unwrap();
    assert_eq!(client.access_token(), "a2");
    assert_eq!(
        harness.endpoint.grants(),
        ["refresh_token", "authorization_code"]
    );
    assert_eq!(
        harness.stored().unwrap().refresh_token.as_deref(),
        Some("r2")
    );
    harness.browser.responses();
}

#[test]
fn rejected_refresh_deletes_the_record_even_if_login_fails() {
    let harness = Harness::new(UserAction::Deny);
    harness.store_credential("a0", Some("revoked"), NOW - MINUTE);
    harness.endpoint.reply(401, "");

    let result = harness.provider.ensure_client();
    assert!(matches!(result, Err(Error::AuthorizationDenied(_))));
    assert!(harness.stored().is_none());
    assert!(harness.raw(TOKEN_KEY).is_none());
    harness.browser.responses();
}

#[test]
fn server_error_on_refresh_keeps_the_record() {
    let harness = Harness::new(UserAction::Ignore);
    harness.store_credential("a0", Some("r0"), NOW - MINUTE);
    harness.endpoint.reply(503, "upstream unavailable");

    let result = harness.provider.ensure_client();
    assert!(matches!(
        result,
        Err(Error::TokenRefresh { status: 503, .. })
    ));
    assert_eq!(harness.stored().unwrap().access_token, "a0");
    assert!(harness.browser.opened.lock().is_empty());
    assert_eq!(harness.notifier.messages.lock().len(), 1);
}

#[test]
fn missing_client_id_fails_before_any_network() {
    let config = cadence_core::AuthConfig {
        client_id: "  ".into(),
        ..common::test_config()
    };
    let harness = Harness::with_config(config, UserAction::Ignore);
    harness.store_credential("a0", Some("r0"), NOW + 10 * MINUTE);

    let result = harness.provider.ensure_client();
    assert!(matches!(result, Err(Error::Configuration)));
    assert_eq!(harness.endpoint.calls(), 0);
    assert!(harness.browser.opened.lock().is_empty());
    assert_eq!(
        harness.notifier.messages.lock().as_slice(),
        ["Set your Spotify client ID in the preferences"]
    );
}

#[test]
fn corrupt_record_is_discarded_and_login_runs() {
    let harness = Harness::new(UserAction::Approve);
    harness.store.set(TOKEN_KEY, "{not json").unwrap();
    harness.endpoint.reply(200, token_body("a1", Some("r1")));

    let client = harness.provider.ensure_client().unwrap();
    assert_eq!(client.access_token(), "a1");
    assert_eq!(harness.endpoint.grants(), ["authorization_code"]);
    harness.browser.responses();
}

#[test]
fn logout_forgets_token_and_client() {
    let harness = Harness::new(UserAction::Ignore);
    harness.store_credential("a0", Some("r0"), NOW + 10 * MINUTE);
    harness.provider.ensure_client().unwrap();
    assert!(harness.provider.is_logged_in());

    harness.provider.logout().unwrap();
    assert!(!harness.provider.is_logged_in());
    assert!(harness.provider.cached_client().is_none());
    assert!(harness.raw(TOKEN_KEY).is_none());
}
