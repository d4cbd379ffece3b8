//! Wire formats for scalar fields: amounts and timestamps.
//!
//! Amounts are decimal strings with exactly two fractional digits. Floats
//! never touch money. Timestamps are UTC, second precision, `Z` suffix.

use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;

use crate::config::AMOUNT_SCALE;
use crate::PaymentError;

/// Timestamp layout used on the wire.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Current time truncated to whole seconds, so that a value survives a
/// serialize/parse cycle unchanged.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Normalize an amount to the wire scale. Rejects anything that would lose
/// precision.
pub fn rescale(amount: Decimal) -> Result<Decimal, PaymentError> {
    let normalized = amount.normalize();
    if normalized.scale() > AMOUNT_SCALE {
        return Err(PaymentError::Protocol(format!(
            "amount {amount} has more than {AMOUNT_SCALE} decimals"
        )));
    }
    let mut scaled = normalized;
    scaled.rescale(AMOUNT_SCALE);
    Ok(scaled)
}

/// Serde adapter for [`Decimal`] amounts as fixed-scale strings.
pub mod amount {
    use rust_decimal::Decimal;
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        let mut scaled = *value;
        scaled.rescale(crate::config::AMOUNT_SCALE);
        serializer.serialize_str(&scaled.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let parsed = Decimal::from_str(&raw).map_err(de::Error::custom)?;
        let scaled = super::rescale(parsed).map_err(de::Error::custom)?;
        if scaled.to_string() != raw {
            return Err(de::Error::custom(format!(
                "amount must have exactly two decimals: {raw}"
            )));
        }
        Ok(scaled)
    }
}

/// Serde adapter for required timestamps.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(de::Error::custom)
    }

    /// Only the exact layout written by `serialize` is accepted.
    pub(super) fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        let parsed = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|e| format!("bad timestamp {raw}: {e}"))?;
        if parsed.format(TIMESTAMP_FORMAT).to_string() != raw {
            return Err(format!("non-canonical timestamp: {raw}"));
        }
        Ok(parsed)
    }
}

/// Serde adapter for optional timestamps. Pair with
/// `#[serde(default, skip_serializing_if = "Option::is_none")]`.
pub mod optional_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| super::timestamp::parse(&s).map_err(de::Error::custom))
            .transpose()
    }
}
