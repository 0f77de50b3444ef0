//! Ledger value codec for the Canton JSON Ledger API
//!
//! Canton returns heterogeneous record/variant values. The JSON API encodes
//! them structurally: records as objects, lists as arrays, variants as
//! `{"tag": ..., "value": ...}`, and the scalar kinds Numeric, Party,
//! Timestamp, and ContractId all as strings. [`LfValue`] models that wire
//! shape, and the typed extractors (`get_text`, `get_numeric`, ...) interpret
//! fields with the kind the caller expects, keeping template knowledge local
//! to the component that decodes a given payload.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

/// Errors from typed extraction of ledger values
#[derive(Debug, Error)]
pub enum ValueError {
    #[error("missing record field '{0}'")]
    MissingField(String),
    #[error("field '{field}' is not a {expected}")]
    WrongKind {
        field: String,
        expected: &'static str,
    },
    #[error("field '{field}' is not a valid numeric: {value}")]
    InvalidNumeric { field: String, value: String },
    #[error("field '{field}' is not a valid timestamp: {value}")]
    InvalidTimestamp { field: String, value: String },
    #[error("value is not a record")]
    NotARecord,
}

/// A Daml-LF value as encoded by the JSON Ledger API.
///
/// Numeric, Party, Timestamp, and ContractId all arrive as JSON strings; the
/// extractors below give them their intended kind at the use site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LfValue {
    /// Unit, or an absent Optional
    Unit,
    Bool(bool),
    /// Int64 — small values may arrive as JSON numbers
    Int(i64),
    /// Text, Numeric, Party, Timestamp, and ContractId on the wire
    Text(String),
    List(Vec<LfValue>),
    /// Records, and variants as `{"tag": ..., "value": ...}`
    Record(BTreeMap<String, LfValue>),
}

impl LfValue {
    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    pub fn text(s: impl Into<String>) -> Self {
        LfValue::Text(s.into())
    }

    pub fn party(s: impl Into<String>) -> Self {
        LfValue::Text(s.into())
    }

    pub fn contract_id(s: impl Into<String>) -> Self {
        LfValue::Text(s.into())
    }

    /// Numeric values are serialized as their plain decimal string
    pub fn numeric(n: &BigDecimal) -> Self {
        LfValue::Text(n.to_string())
    }

    pub fn int(n: i64) -> Self {
        LfValue::Int(n)
    }

    /// Timestamps travel as RFC 3339 text
    pub fn timestamp(t: DateTime<Utc>) -> Self {
        LfValue::Text(t.to_rfc3339())
    }

    pub fn record<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, LfValue)>,
        K: Into<String>,
    {
        LfValue::Record(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        )
    }

    pub fn variant(tag: impl Into<String>, value: LfValue) -> Self {
        LfValue::record([
            ("tag", LfValue::Text(tag.into())),
            ("value", value),
        ])
    }

    pub fn optional(value: Option<LfValue>) -> Self {
        value.unwrap_or(LfValue::Unit)
    }

    pub fn list<I: IntoIterator<Item = LfValue>>(items: I) -> Self {
        LfValue::List(items.into_iter().collect())
    }

    // ------------------------------------------------------------------
    // Typed extractors
    // ------------------------------------------------------------------

    pub fn as_record(&self) -> Result<&BTreeMap<String, LfValue>, ValueError> {
        match self {
            LfValue::Record(fields) => Ok(fields),
            _ => Err(ValueError::NotARecord),
        }
    }

    pub fn field(&self, name: &str) -> Result<&LfValue, ValueError> {
        self.as_record()?
            .get(name)
            .ok_or_else(|| ValueError::MissingField(name.to_string()))
    }

    fn text_field(&self, name: &str, expected: &'static str) -> Result<&str, ValueError> {
        match self.field(name)? {
            LfValue::Text(s) => Ok(s),
            _ => Err(ValueError::WrongKind {
                field: name.to_string(),
                expected,
            }),
        }
    }

    pub fn get_text(&self, name: &str) -> Result<&str, ValueError> {
        self.text_field(name, "text")
    }

    pub fn get_party(&self, name: &str) -> Result<&str, ValueError> {
        self.text_field(name, "party")
    }

    pub fn get_contract_id(&self, name: &str) -> Result<&str, ValueError> {
        self.text_field(name, "contract id")
    }

    pub fn get_numeric(&self, name: &str) -> Result<BigDecimal, ValueError> {
        let raw = self.text_field(name, "numeric")?;
        BigDecimal::from_str(raw).map_err(|_| ValueError::InvalidNumeric {
            field: name.to_string(),
            value: raw.to_string(),
        })
    }

    pub fn get_int(&self, name: &str) -> Result<i64, ValueError> {
        match self.field(name)? {
            LfValue::Int(n) => Ok(*n),
            LfValue::Text(s) => s.parse().map_err(|_| ValueError::WrongKind {
                field: name.to_string(),
                expected: "int64",
            }),
            _ => Err(ValueError::WrongKind {
                field: name.to_string(),
                expected: "int64",
            }),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, ValueError> {
        match self.field(name)? {
            LfValue::Bool(b) => Ok(*b),
            _ => Err(ValueError::WrongKind {
                field: name.to_string(),
                expected: "bool",
            }),
        }
    }

    pub fn get_timestamp(&self, name: &str) -> Result<DateTime<Utc>, ValueError> {
        let raw = self.text_field(name, "timestamp")?;
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| ValueError::InvalidTimestamp {
                field: name.to_string(),
                value: raw.to_string(),
            })
    }

    /// Optional field: absent, or present-as-Unit, both decode to `None`.
    pub fn get_optional(&self, name: &str) -> Result<Option<&LfValue>, ValueError> {
        match self.as_record()?.get(name) {
            None | Some(LfValue::Unit) => Ok(None),
            Some(v) => Ok(Some(v)),
        }
    }

    pub fn get_optional_text(&self, name: &str) -> Result<Option<&str>, ValueError> {
        match self.get_optional(name)? {
            None => Ok(None),
            Some(LfValue::Text(s)) => Ok(Some(s)),
            Some(_) => Err(ValueError::WrongKind {
                field: name.to_string(),
                expected: "optional text",
            }),
        }
    }

    /// Variant field as a `(tag, value)` pair
    pub fn get_variant(&self, name: &str) -> Result<(&str, &LfValue), ValueError> {
        let inner = self.field(name)?;
        let tag = inner.text_field("tag", "variant tag")?;
        let value = inner
            .as_record()?
            .get("value")
            .unwrap_or(&LfValue::Unit);
        Ok((tag, value))
    }

    pub fn get_list(&self, name: &str) -> Result<&[LfValue], ValueError> {
        match self.field(name)? {
            LfValue::List(items) => Ok(items),
            _ => Err(ValueError::WrongKind {
                field: name.to_string(),
                expected: "list",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_holding_payload() {
        let json = r#"{
            "issuer": "issuer::1220aa",
            "owner": "wayfinder::1220bb",
            "symbol": "PROMPT",
            "amount": "100.0",
            "lockedUntil": null
        }"#;
        let value: LfValue = serde_json::from_str(json).unwrap();

        assert_eq!(value.get_party("owner").unwrap(), "wayfinder::1220bb");
        assert_eq!(value.get_text("symbol").unwrap(), "PROMPT");
        assert_eq!(
            value.get_numeric("amount").unwrap(),
            BigDecimal::from(100)
        );
        assert!(value.get_optional("lockedUntil").unwrap().is_none());
        assert!(value.get_optional("absent").unwrap().is_none());
    }

    #[test]
    fn test_decode_variant_status() {
        let json = r#"{"status": {"tag": "Pending", "value": null}}"#;
        let value: LfValue = serde_json::from_str(json).unwrap();
        let (tag, inner) = value.get_variant("status").unwrap();
        assert_eq!(tag, "Pending");
        assert_eq!(inner, &LfValue::Unit);
    }

    #[test]
    fn test_encode_record_round_trip() {
        let record = LfValue::record([
            ("recipient", LfValue::party("user::1220cc")),
            ("amount", LfValue::numeric(&"42.5".parse().unwrap())),
            ("evmTxHash", LfValue::optional(Some(LfValue::text("0xdead")))),
            ("index", LfValue::int(7)),
        ]);

        let json = serde_json::to_string(&record).unwrap();
        let back: LfValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.get_numeric("amount").unwrap().to_string(), "42.5");
        assert_eq!(back.get_int("index").unwrap(), 7);
        assert_eq!(back.get_optional_text("evmTxHash").unwrap(), Some("0xdead"));
    }

    #[test]
    fn test_int_from_string() {
        let json = r#"{"count": "9007199254740993"}"#;
        let value: LfValue = serde_json::from_str(json).unwrap();
        assert_eq!(value.get_int("count").unwrap(), 9007199254740993);
    }

    #[test]
    fn test_wrong_kind_errors() {
        let value = LfValue::record([("amount", LfValue::text("not-a-number"))]);
        assert!(matches!(
            value.get_numeric("amount"),
            Err(ValueError::InvalidNumeric { .. })
        ));
        assert!(matches!(
            value.get_bool("amount"),
            Err(ValueError::WrongKind { .. })
        ));
        assert!(matches!(
            value.get_text("missing"),
            Err(ValueError::MissingField(_))
        ));
        assert!(matches!(
            LfValue::Int(1).get_text("x"),
            Err(ValueError::NotARecord)
        ));
    }
}
