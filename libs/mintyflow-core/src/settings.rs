//! Per-user preferences and the typed mutations that change them.

use serde::{Deserialize, Serialize};

use crate::currency::{self, DEFAULT_CURRENCY};
use crate::error::SettingsRuleError;
use crate::types::Millis;

/// One user's preference set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub user_id: String,
    pub currency: String,
    pub biometric_enabled: bool,
    pub notifications_enabled: bool,
    pub maturity_notifications: bool,
    pub alert_notifications: bool,
    /// Insertion-ordered, unique, never containing `currency`.
    pub additional_currencies: Vec<String>,
    /// Set once the user explicitly picked a base currency.
    pub currency_configured: bool,
    pub updated_at: Millis,
}

impl Settings {
    /// Defaults for a user who has never configured anything.
    pub fn defaults(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            currency: DEFAULT_CURRENCY.to_string(),
            biometric_enabled: false,
            notifications_enabled: true,
            maturity_notifications: true,
            alert_notifications: true,
            additional_currencies: Vec::new(),
            currency_configured: false,
            updated_at: 0,
        }
    }

    /// Apply a mutation, returning the resulting settings without touching `self`.
    pub fn apply(
        &self,
        mutation: &SettingsMutation,
        now: Millis,
    ) -> Result<Settings, SettingsRuleError> {
        let mut next = self.clone();
        match mutation {
            SettingsMutation::SetBaseCurrency(code) => {
                require_supported(code)?;
                if self.currency_configured {
                    if *code == self.currency {
                        return Ok(next);
                    }
                    return Err(SettingsRuleError::BaseCurrencyLocked);
                }
                next.currency = code.clone();
                next.currency_configured = true;
                next.additional_currencies.retain(|c| c != code);
            }
            SettingsMutation::ToggleBiometric => {
                next.biometric_enabled = !self.biometric_enabled;
            }
            SettingsMutation::ToggleNotifications => {
                // Sub-preferences keep their values for when the master flag comes back.
                next.notifications_enabled = !self.notifications_enabled;
            }
            SettingsMutation::ToggleMaturityNotifications => {
                next.maturity_notifications = !self.maturity_notifications;
            }
            SettingsMutation::ToggleAlertNotifications => {
                next.alert_notifications = !self.alert_notifications;
            }
            SettingsMutation::AddAdditionalCurrency(code) => {
                if *code == self.currency || self.additional_currencies.contains(code) {
                    return Err(SettingsRuleError::DuplicateCurrency(code.clone()));
                }
                require_supported(code)?;
                next.additional_currencies.push(code.clone());
            }
            SettingsMutation::RemoveAdditionalCurrency(code) => {
                next.additional_currencies.retain(|c| c != code);
            }
        }
        next.updated_at = now;
        Ok(next)
    }

    /// Whether maturity alerts should actually fire.
    pub fn maturity_alerts_active(&self) -> bool {
        self.notifications_enabled && self.maturity_notifications
    }

    /// Whether budget/bill alerts should actually fire.
    pub fn alert_notifications_active(&self) -> bool {
        self.notifications_enabled && self.alert_notifications
    }
}

fn require_supported(code: &str) -> Result<(), SettingsRuleError> {
    if currency::is_supported(code) {
        Ok(())
    } else {
        Err(SettingsRuleError::UnknownCurrency(code.to_string()))
    }
}

/// Closed set of settings changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "code", rename_all = "snake_case")]
pub enum SettingsMutation {
    SetBaseCurrency(String),
    ToggleBiometric,
    ToggleNotifications,
    ToggleMaturityNotifications,
    ToggleAlertNotifications,
    AddAdditionalCurrency(String),
    RemoveAdditionalCurrency(String),
}

impl SettingsMutation {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetBaseCurrency(_) => "set_base_currency",
            Self::ToggleBiometric => "toggle_biometric",
            Self::ToggleNotifications => "toggle_notifications",
            Self::ToggleMaturityNotifications => "toggle_maturity_notifications",
            Self::ToggleAlertNotifications => "toggle_alert_notifications",
            Self::AddAdditionalCurrency(_) => "add_additional_currency",
            Self::RemoveAdditionalCurrency(_) => "remove_additional_currency",
        }
    }
}
