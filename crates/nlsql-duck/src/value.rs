//! DuckDB cell to JSON conversion

use chrono::{DateTime, NaiveDate, NaiveTime};
use duckdb::types::{TimeUnit, ValueRef};
use serde_json::Value;

/// Days between 0001-01-01 (CE day 1) and the Unix epoch
const UNIX_EPOCH_CE_DAYS: i32 = 719_163;

fn to_micros(unit: TimeUnit, v: i64) -> i64 {
    match unit {
        TimeUnit::Second => v.saturating_mul(1_000_000),
        TimeUnit::Millisecond => v.saturating_mul(1_000),
        TimeUnit::Microsecond => v,
        TimeUnit::Nanosecond => v / 1_000,
    }
}

/// Convert a borrowed DuckDB value to JSON
///
/// Integers that do not fit in an `i64` (DuckDB returns HUGEINT for `SUM`
/// over integers) fall back to their decimal string.
pub fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(i) => Value::from(i),
        ValueRef::SmallInt(i) => Value::from(i),
        ValueRef::Int(i) => Value::from(i),
        ValueRef::BigInt(i) => Value::from(i),
        ValueRef::HugeInt(i) => i64::try_from(i)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(i.to_string())),
        ValueRef::UTinyInt(i) => Value::from(i),
        ValueRef::USmallInt(i) => Value::from(i),
        ValueRef::UInt(i) => Value::from(i),
        ValueRef::UBigInt(i) => Value::from(i),
        ValueRef::Float(f) => Value::from(f64::from(f)),
        ValueRef::Double(f) => Value::from(f),
        ValueRef::Decimal(d) => {
            let text = d.to_string();
            text.parse::<f64>()
                .map(Value::from)
                .unwrap_or(Value::String(text))
        }
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
        ValueRef::Date32(days) => NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_CE_DAYS)
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        ValueRef::Timestamp(unit, v) => DateTime::from_timestamp_micros(to_micros(unit, v))
            .map(|dt| Value::String(dt.naive_utc().to_string()))
            .unwrap_or(Value::Null),
        ValueRef::Time64(unit, v) => {
            let micros = to_micros(unit, v);
            NaiveTime::from_num_seconds_from_midnight_opt(
                (micros / 1_000_000) as u32,
                ((micros % 1_000_000) * 1_000) as u32,
            )
            .map(|t| Value::String(t.to_string()))
            .unwrap_or(Value::Null)
        }
        _ => Value::String("<unsupported>".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars() {
        assert_eq!(to_json(ValueRef::Null), Value::Null);
        assert_eq!(to_json(ValueRef::Int(2)), Value::from(2));
        assert_eq!(to_json(ValueRef::Text(b"Baldwin Bikes")), Value::from("Baldwin Bikes"));
        assert_eq!(to_json(ValueRef::Blob(&[1, 2, 3])), Value::from("<blob 3 bytes>"));
    }

    #[test]
    fn test_hugeint_falls_back_to_string() {
        assert_eq!(to_json(ValueRef::HugeInt(42)), Value::from(42));
        let big = i128::from(i64::MAX) + 1;
        assert_eq!(to_json(ValueRef::HugeInt(big)), Value::String(big.to_string()));
    }

    #[test]
    fn test_date_and_timestamp() {
        // 2016-01-01 is 16801 days after the epoch
        assert_eq!(to_json(ValueRef::Date32(16_801)), Value::from("2016-01-01"));
        assert_eq!(
            to_json(ValueRef::Timestamp(TimeUnit::Second, 0)),
            Value::from("1970-01-01 00:00:00")
        );
    }
}
