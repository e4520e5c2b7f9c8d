// crates/sqlforage-core/src/key.rs
// ============================================================================
// Module: Key Normalization
// Description: Normalized string keys for key-value stores.
// Purpose: Coerce caller keys to a single canonical string form.
// Dependencies: serde, tracing
// ============================================================================

//! ## Overview
//! Every key is normalized to a string before any lookup or write. Strings
//! pass through untouched; numbers are coerced to their canonical decimal
//! text and the coercion is logged, since a numeric key usually indicates a
//! caller bug.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

/// Normalized key-value store key.
///
/// # Invariants
/// - Always holds the canonical string form of the caller's key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreKey(String);

impl StoreKey {
    /// Returns the key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the key and returns its text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Builds a key from a non-string value, logging the coercion.
    fn coerced(text: String) -> Self {
        warn!(key = %text, "key used as a key-value store key is not a string; coercing");
        Self(text)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StoreKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StoreKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&String> for StoreKey {
    fn from(value: &String) -> Self {
        Self(value.clone())
    }
}

/// Implements numeric key coercion for integer types.
macro_rules! integer_keys {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StoreKey {
                fn from(value: $ty) -> Self {
                    Self::coerced(value.to_string())
                }
            }
        )*
    };
}

integer_keys!(i32, i64, u32, u64, usize);

impl From<f64> for StoreKey {
    fn from(value: f64) -> Self {
        Self::coerced(float_key_text(value))
    }
}

/// Formats a float the way a script host prints numbers.
fn float_key_text(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value.is_sign_positive() { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e21 {
        return format!("{value:.0}");
    }
    value.to_string()
}
