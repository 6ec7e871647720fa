//! Local collections and record keys

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// A keyed entity collection in the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Products,
    Purchases,
    Consumption,
    Transactions,
    Messages,
}

impl Collection {
    /// Every collection, in pull-application order.
    pub const ALL: [Self; 5] = [
        Self::Products,
        Self::Purchases,
        Self::Consumption,
        Self::Transactions,
        Self::Messages,
    ];

    /// `SQLite` table backing this collection
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Products => "produtos",
            Self::Purchases => "compras",
            Self::Consumption => "consumo",
            Self::Transactions => "transacoes",
            Self::Messages => "mensagens",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "products" | "produtos" => Ok(Self::Products),
            "purchases" | "compras" => Ok(Self::Purchases),
            "consumption" | "consumo" | "consumos" => Ok(Self::Consumption),
            "transactions" | "transacoes" => Ok(Self::Transactions),
            "messages" | "mensagens" => Ok(Self::Messages),
            other => Err(Error::InvalidInput(format!("unknown collection '{other}'"))),
        }
    }
}

/// Key of a record inside a collection.
///
/// Records are keyed by their `id` field. Integer ids are keyed by their
/// decimal form, so `1` and `"1"` address the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey(String);

impl RecordKey {
    /// Extract the key from a record's `id` field.
    pub fn from_record(record: &Value) -> Result<Self> {
        match record.get("id") {
            Some(Value::String(id)) if !id.trim().is_empty() => Ok(Self(id.clone())),
            Some(Value::Number(id)) => Ok(Self(id.to_string())),
            Some(other) => Err(Error::InvalidInput(format!(
                "record id must be a non-empty string or a number, got {other}"
            ))),
            None => Err(Error::InvalidInput(
                "record is missing its `id` field".to_string(),
            )),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for RecordKey {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collection_parses_both_spellings() {
        assert_eq!("products".parse::<Collection>().unwrap(), Collection::Products);
        assert_eq!("consumo".parse::<Collection>().unwrap(), Collection::Consumption);
        assert_eq!("Mensagens".parse::<Collection>().unwrap(), Collection::Messages);
        assert!("estoque".parse::<Collection>().is_err());
    }

    #[test]
    fn display_uses_table_name() {
        assert_eq!(Collection::Consumption.to_string(), "consumo");
        assert_eq!(Collection::Transactions.to_string(), "transacoes");
    }

    #[test]
    fn record_key_accepts_strings_and_numbers() {
        let text = RecordKey::from_record(&json!({"id": "abc"})).unwrap();
        assert_eq!(text.as_str(), "abc");

        let number = RecordKey::from_record(&json!({"id": 1})).unwrap();
        assert_eq!(number, RecordKey::from(1));
    }

    #[test]
    fn record_key_rejects_missing_or_blank_id() {
        assert!(RecordKey::from_record(&json!({"nome": "Ureia"})).is_err());
        assert!(RecordKey::from_record(&json!({"id": "  "})).is_err());
        assert!(RecordKey::from_record(&json!({"id": null})).is_err());
    }
}
