//! Settings lifecycle across loads, restarts and concurrent callers.

mod common;

use pretty_assertions::assert_eq;

use common::*;
use mintyflow_lib::session::BIOMETRIC_ENABLED_KEY;
use mintyflow_lib::settings::{LoadState, SettingsError};

async fn settings_rows(ctx: &TestContext, uid: &str) -> i64 {
    ctx.count("settings", uid).await
}

#[tokio::test]
async fn test_first_load_writes_exactly_one_default_row() {
    let ctx = TestContext::new().await;
    let settings = &ctx.state.settings;

    let loaded = settings.load("u1").await.unwrap();
    assert_eq!(loaded.currency, "USD");
    assert!(!loaded.biometric_enabled);
    assert!(loaded.notifications_enabled);
    assert!(loaded.maturity_notifications);
    assert!(loaded.alert_notifications);
    assert!(loaded.additional_currencies.is_empty());
    assert!(!settings.has_currency_set("u1"));
    assert_eq!(settings.load_state("u1").await, LoadState::LoadedDefaulted);
    assert_eq!(settings_rows(&ctx, "u1").await, 1);

    // Loading again, even from a restarted process, reuses the row.
    settings.load("u1").await.unwrap();
    let restarted = ctx.restart().await;
    restarted.settings.load("u1").await.unwrap();
    assert_eq!(restarted.settings.load_state("u1").await, LoadState::Loaded);
    assert_eq!(settings_rows(&ctx, "u1").await, 1);
}

#[tokio::test]
async fn test_concurrent_loads_collapse_into_one() {
    let ctx = TestContext::new().await;
    let settings = &ctx.state.settings;

    let (a, b, c) = tokio::join!(settings.load("u1"), settings.load("u1"), settings.load("u1"));
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(settings_rows(&ctx, "u1").await, 1);

    // Two independent services racing on the same file still converge.
    let other = ctx.restart().await;
    let (x, y) = tokio::join!(other.settings.load("u2"), ctx.state.settings.load("u2"));
    assert_eq!(x.unwrap().user_id, y.unwrap().user_id);
    assert_eq!(settings_rows(&ctx, "u2").await, 1);
}

#[tokio::test]
async fn test_toggles_survive_restart() {
    let ctx = TestContext::new().await;
    ctx.state.settings.load("u1").await.unwrap();

    let after = ctx.state.settings.toggle_notifications("u1").await.unwrap();
    assert!(!after.notifications_enabled);
    // Sub-flags keep their values while the master switch is off.
    assert!(after.maturity_notifications);
    let reloaded = ctx.restart().await.settings.load("u1").await.unwrap();
    assert!(!reloaded.notifications_enabled);
    assert!(reloaded.maturity_notifications);

    ctx.state.settings.toggle_maturity_notifications("u1").await.unwrap();
    ctx.state.settings.toggle_alert_notifications("u1").await.unwrap();
    let reloaded = ctx.restart().await.settings.load("u1").await.unwrap();
    assert!(!reloaded.maturity_notifications);
    assert!(!reloaded.alert_notifications);

    ctx.state.settings.toggle_biometric("u1").await.unwrap();
    let reloaded = ctx.restart().await.settings.load("u1").await.unwrap();
    assert!(reloaded.biometric_enabled);
    assert_eq!(ctx.cache.value(BIOMETRIC_ENABLED_KEY).as_deref(), Some("1"));

    ctx.state.settings.toggle_biometric("u1").await.unwrap();
    let reloaded = ctx.restart().await.settings.load("u1").await.unwrap();
    assert!(!reloaded.biometric_enabled);
    assert_eq!(ctx.cache.value(BIOMETRIC_ENABLED_KEY).as_deref(), Some("0"));
}

#[tokio::test]
async fn test_biometric_requires_hardware() {
    let ctx = TestContext::new().await;
    ctx.biometrics.set_available(false);

    let err = ctx.state.settings.toggle_biometric("u1").await.unwrap_err();
    assert!(matches!(err, SettingsError::Precondition(_)));
    assert!(!ctx.state.settings.snapshot("u1").biometric_enabled);
    assert_eq!(ctx.cache.value(BIOMETRIC_ENABLED_KEY), None);
}

#[tokio::test]
async fn test_first_run_currency_setup() {
    let ctx = TestContext::new().await;
    let settings = &ctx.state.settings;
    let mut updates = settings.subscribe("u1");

    settings.load("u1").await.unwrap();
    assert!(!settings.has_currency_set("u1"));

    let after = settings.set_base_currency("u1", "INR").await.unwrap();
    assert_eq!(after.currency, "INR");
    assert!(settings.has_currency_set("u1"));
    assert!(updates.has_changed().unwrap());
    assert_eq!(updates.borrow_and_update().currency, "INR");

    settings.add_additional_currency("u1", "USD").await.unwrap();
    settings.add_additional_currency("u1", "EUR").await.unwrap();
    let err = settings.add_additional_currency("u1", "INR").await.unwrap_err();
    assert_eq!(err, SettingsError::DuplicateCurrency("INR".to_string()));
    let err = settings.add_additional_currency("u1", "XYZ").await.unwrap_err();
    assert!(matches!(err, SettingsError::Precondition(_)));

    settings.remove_additional_currency("u1", "USD").await.unwrap();
    settings.remove_additional_currency("u1", "GBP").await.unwrap();

    let reloaded = ctx.restart().await.settings.load("u1").await.unwrap();
    assert_eq!(reloaded.currency, "INR");
    assert!(reloaded.currency_configured);
    assert_eq!(reloaded.additional_currencies, vec!["EUR".to_string()]);
}

#[tokio::test]
async fn test_base_currency_cannot_change_once_set() {
    let ctx = TestContext::new().await;
    let settings = &ctx.state.settings;
    settings.set_base_currency("u1", "GBP").await.unwrap();

    let err = settings.set_base_currency("u1", "JPY").await.unwrap_err();
    assert_eq!(err, SettingsError::ImmutableField("currency"));
    // Re-confirming the same code is accepted.
    settings.set_base_currency("u1", "GBP").await.unwrap();

    // Neither memory nor the persisted row moved.
    assert_eq!(settings.snapshot("u1").currency, "GBP");
    let restarted = ctx.restart().await;
    assert_eq!(restarted.settings.load("u1").await.unwrap().currency, "GBP");
    let err = restarted
        .settings
        .set_base_currency("u1", "JPY")
        .await
        .unwrap_err();
    assert_eq!(err, SettingsError::ImmutableField("currency"));
}

#[tokio::test]
async fn test_reset_keeps_persisted_row() {
    let ctx = TestContext::new().await;
    let settings = &ctx.state.settings;
    settings.set_base_currency("u1", "CHF").await.unwrap();

    settings.reset("u1").await;
    assert_eq!(settings.load_state("u1").await, LoadState::Unloaded);
    assert_eq!(settings.snapshot("u1").currency, "USD");

    assert_eq!(settings.load("u1").await.unwrap().currency, "CHF");
    assert_eq!(settings.load_state("u1").await, LoadState::Loaded);
}

#[tokio::test]
async fn test_store_not_initialized_is_reported() {
    let ctx = TestContext::new().await;
    ctx.state.store.shutdown().await;

    let err = ctx.state.settings.load("u1").await.unwrap_err();
    assert_eq!(err, SettingsError::StorageNotInitialized);
}
