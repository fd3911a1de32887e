//! Static currency catalogue.

use serde::Serialize;

/// Currency used until the user picks one.
pub const DEFAULT_CURRENCY: &str = "USD";

/// A supported currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Currency {
    pub code: &'static str,
    pub symbol: &'static str,
    pub name: &'static str,
}

/// Every currency the app can be configured with.
pub const CURRENCIES: &[Currency] = &[
    Currency { code: "USD", symbol: "$", name: "US Dollar" },
    Currency { code: "EUR", symbol: "€", name: "Euro" },
    Currency { code: "GBP", symbol: "£", name: "British Pound" },
    Currency { code: "INR", symbol: "₹", name: "Indian Rupee" },
    Currency { code: "JPY", symbol: "¥", name: "Japanese Yen" },
    Currency { code: "AUD", symbol: "A$", name: "Australian Dollar" },
    Currency { code: "CAD", symbol: "C$", name: "Canadian Dollar" },
    Currency { code: "CHF", symbol: "Fr", name: "Swiss Franc" },
    Currency { code: "CNY", symbol: "¥", name: "Chinese Yuan" },
];

/// Look up a currency by its ISO code.
pub fn find(code: &str) -> Option<&'static Currency> {
    CURRENCIES.iter().find(|c| c.code == code)
}

/// Whether the code is in the catalogue.
pub fn is_supported(code: &str) -> bool {
    find(code).is_some()
}
