use async_trait::async_trait;
use mintyflow_core::{Millis, Settings, User};
use rusqlite::{params, Connection, OptionalExtension};

use super::{Result, SettingsRepository, SqliteRepository, UserRepository};
use crate::db::codec::{decode_bool, encode_bool, encode_string_list, settings_from_row, SETTINGS_COLUMNS};

/// Make sure a `users` row exists so rows that reference it can be written.
fn ensure_user_row(conn: &Connection, uid: &str, now: Millis) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO users (uid, createdAt, lastLogin) VALUES (?1, ?2, ?2)",
        params![uid, now],
    )?;
    Ok(())
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        uid: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        photo_url: row.get(3)?,
        created_at: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
        last_login: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
        onboarding_completed: decode_bool(row.get(6)?),
        currency_setup_completed: decode_bool(row.get(7)?),
        base_currency: row.get(8)?,
    })
}

fn select_settings(conn: &Connection, user_id: &str) -> Result<Option<Settings>> {
    let settings = conn
        .query_row(
            &format!("SELECT {SETTINGS_COLUMNS} FROM settings WHERE userId = ?1"),
            params![user_id],
            settings_from_row,
        )
        .optional()?;
    Ok(settings)
}

#[async_trait]
impl UserRepository for SqliteRepository {
    async fn upsert_user(&self, user: &User) -> Result<()> {
        self.store
            .read(move |conn| {
                // A base currency that was already confirmed is never replaced.
                conn.execute(
                    "INSERT INTO users (uid, email, displayName, photoURL, createdAt, lastLogin,
                        onboardingCompleted, currencySetupCompleted, baseCurrency)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(uid) DO UPDATE SET
                        email = excluded.email,
                        displayName = excluded.displayName,
                        photoURL = excluded.photoURL,
                        lastLogin = excluded.lastLogin,
                        onboardingCompleted = excluded.onboardingCompleted,
                        baseCurrency = CASE
                            WHEN users.currencySetupCompleted = 1 AND users.baseCurrency IS NOT NULL
                            THEN users.baseCurrency ELSE excluded.baseCurrency END,
                        currencySetupCompleted = MAX(COALESCE(users.currencySetupCompleted, 0),
                            excluded.currencySetupCompleted)",
                    params![
                        user.uid,
                        user.email,
                        user.display_name,
                        user.photo_url,
                        user.created_at,
                        user.last_login,
                        encode_bool(user.onboarding_completed),
                        encode_bool(user.currency_setup_completed),
                        user.base_currency,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn get_user(&self, uid: &str) -> Result<Option<User>> {
        self.store
            .read(move |conn| {
                let user = conn
                    .query_row(
                        "SELECT uid, email, displayName, photoURL, createdAt, lastLogin,
                            onboardingCompleted, currencySetupCompleted, baseCurrency
                         FROM users WHERE uid = ?1",
                        params![uid],
                        row_to_user,
                    )
                    .optional()?;
                Ok(user)
            })
            .await
    }
}

#[async_trait]
impl SettingsRepository for SqliteRepository {
    async fn get_settings(&self, user_id: &str) -> Result<Option<Settings>> {
        self.store.read(move |conn| select_settings(conn, user_id)).await
    }

    async fn insert_default_settings(&self, user_id: &str, now: Millis) -> Result<Settings> {
        let defaults = Settings::defaults(user_id);
        self.store
            .transaction(move |conn| {
                ensure_user_row(conn, user_id, now)?;
                conn.execute(
                    "INSERT OR IGNORE INTO settings (userId, currency, biometricEnabled, notificationsEnabled,
                        maturityNotifications, alertNotifications, additionalCurrencies, currencyConfigured, updatedAt)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        defaults.user_id,
                        defaults.currency,
                        encode_bool(defaults.biometric_enabled),
                        encode_bool(defaults.notifications_enabled),
                        encode_bool(defaults.maturity_notifications),
                        encode_bool(defaults.alert_notifications),
                        encode_string_list(&defaults.additional_currencies),
                        encode_bool(defaults.currency_configured),
                        now,
                    ],
                )?;
                Ok(select_settings(conn, user_id)?.unwrap_or(Settings {
                    updated_at: now,
                    ..defaults
                }))
            })
            .await
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.store
            .transaction(move |conn| {
                ensure_user_row(conn, &settings.user_id, settings.updated_at)?;
                conn.execute(
                    "INSERT INTO settings (userId, currency, biometricEnabled, notificationsEnabled,
                        maturityNotifications, alertNotifications, additionalCurrencies, currencyConfigured, updatedAt)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(userId) DO UPDATE SET
                        currency = excluded.currency,
                        biometricEnabled = excluded.biometricEnabled,
                        notificationsEnabled = excluded.notificationsEnabled,
                        maturityNotifications = excluded.maturityNotifications,
                        alertNotifications = excluded.alertNotifications,
                        additionalCurrencies = excluded.additionalCurrencies,
                        currencyConfigured = excluded.currencyConfigured,
                        updatedAt = excluded.updatedAt",
                    params![
                        settings.user_id,
                        settings.currency,
                        encode_bool(settings.biometric_enabled),
                        encode_bool(settings.notifications_enabled),
                        encode_bool(settings.maturity_notifications),
                        encode_bool(settings.alert_notifications),
                        encode_string_list(&settings.additional_currencies),
                        encode_bool(settings.currency_configured),
                        settings.updated_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }
}
