//! Secret redaction for sensitive data in logs, serialization, and display.
//!
//! Use [`Redacted`] to wrap values that must never appear in logs, error
//! messages, or serialized output (e.g., JSON). The wrapped value is never
//! exposed through `Debug`, `Display`, or `Serialize` — all output as
//! `"<redacted>"`.

use std::fmt::{self, Debug, Display};

/// Wrapper that redacts its inner value when formatted or serialized.
///
/// Use for OAuth client secrets, relayer private keys, keystore master keys,
/// bearer tokens, or any value that must not appear in logs, error messages,
/// or structured output.
///
/// # Example
///
/// ```ignore
/// use canton_rs::redact::Redacted;
///
/// let bearer = "eyJhbGci...";
/// tracing::info!(token = %Redacted(bearer), "Token refreshed");
/// // Logs: token = <redacted>
/// ```
#[derive(Clone, Copy)]
pub struct Redacted<T>(pub T);

impl<T> Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> serde::Serialize for Redacted<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        "<redacted>".serialize(serializer)
    }
}
