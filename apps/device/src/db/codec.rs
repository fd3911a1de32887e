//! Conversions between domain values and their SQLite column encodings.
//!
//! Booleans are stored as 0/1 integers, currency lists and share lists as
//! JSON arrays, money as decimal text. Money columns created by older builds
//! hold REAL values, so decoding accepts either storage class.

use std::str::FromStr;

use mintyflow_core::{Settings, DEFAULT_CURRENCY};
use rusqlite::types::{Type, ValueRef};
use rusqlite::Row;
use rust_decimal::Decimal;
use tracing::warn;

pub fn encode_bool(value: bool) -> i64 {
    i64::from(value)
}

pub fn decode_bool(value: Option<i64>) -> bool {
    value.unwrap_or(0) != 0
}

pub fn encode_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

fn conversion_error(idx: usize, kind: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, kind, message.into())
}

/// Decimal stored in column `idx`; NULL decodes as zero.
pub fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    Ok(optional_decimal_at(row, idx)?.unwrap_or(Decimal::ZERO))
}

pub fn optional_decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    match row.get_ref(idx)? {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(i) => Ok(Some(Decimal::from(i))),
        // Shortest round-trip form, so 12.34 stays 12.34.
        ValueRef::Real(f) => Decimal::from_str(&f.to_string())
            .map(Some)
            .map_err(|e| conversion_error(idx, Type::Real, e.to_string())),
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| conversion_error(idx, Type::Text, e.to_string()))?;
            Decimal::from_str(text.trim())
                .map(Some)
                .map_err(|e| conversion_error(idx, Type::Text, e.to_string()))
        }
        ValueRef::Blob(_) => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "decimal".to_string(),
            Type::Blob,
        )),
    }
}

/// Text enum stored in column `idx`.
pub fn enum_at<T>(
    row: &Row<'_>,
    idx: usize,
    parse: fn(&str) -> mintyflow_core::Result<T>,
) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    parse(&text).map_err(|e| conversion_error(idx, Type::Text, e.to_string()))
}

pub fn optional_enum_at<T>(
    row: &Row<'_>,
    idx: usize,
    parse: fn(&str) -> mintyflow_core::Result<T>,
) -> rusqlite::Result<Option<T>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(text) if !text.is_empty() => parse(&text)
            .map(Some)
            .map_err(|e| conversion_error(idx, Type::Text, e.to_string())),
        _ => Ok(None),
    }
}

pub fn encode_string_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

/// JSON string array; anything unreadable decodes as empty.
pub fn decode_string_list(raw: Option<String>) -> Vec<String> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(values) => values,
        Err(e) => {
            warn!(error = %e, "discarding malformed JSON list column");
            Vec::new()
        }
    }
}

/// Column list matching [`settings_from_row`].
pub const SETTINGS_COLUMNS: &str = "userId, currency, biometricEnabled, notificationsEnabled, \
     maturityNotifications, alertNotifications, additionalCurrencies, currencyConfigured, updatedAt";

pub fn settings_from_row(row: &Row<'_>) -> rusqlite::Result<Settings> {
    let currency = row
        .get::<_, Option<String>>(1)?
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    let mut additional: Vec<String> = Vec::new();
    for code in decode_string_list(row.get(6)?) {
        if code != currency && !additional.contains(&code) {
            additional.push(code);
        }
    }

    Ok(Settings {
        user_id: row.get(0)?,
        currency,
        biometric_enabled: decode_bool(row.get(2)?),
        notifications_enabled: decode_bool(row.get(3)?),
        maturity_notifications: decode_bool(row.get(4)?),
        alert_notifications: decode_bool(row.get(5)?),
        additional_currencies: additional,
        currency_configured: decode_bool(row.get(7)?),
        updated_at: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
    })
}
