//! Runtime values for migrated records.

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use tokio_postgres::types::{IsNull, ToSql, Type, WrongType, to_sql_checked};

use crate::error::BoxError;

/// A record: column name → value, in column order.
pub type Record = IndexMap<String, Value>;

/// Build a [`Record`] from name/value pairs.
///
/// ```
/// use resync::{Value, record};
///
/// let r = record([("id", Value::from(7i64)), ("name", Value::from("Ann"))]);
/// assert_eq!(r["name"], Value::String("Ann".into()));
/// ```
pub fn record<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Record
where
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// A runtime SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL
    Null,

    /// Boolean
    Bool(bool),

    /// 16-bit signed integer (SMALLINT)
    I16(i16),

    /// 32-bit signed integer (INTEGER)
    I32(i32),

    /// 64-bit signed integer (BIGINT)
    I64(i64),

    /// 32-bit float (REAL)
    F32(f32),

    /// 64-bit float (DOUBLE PRECISION)
    F64(f64),

    /// Decimal (NUMERIC)
    Decimal(Decimal),

    /// Text (TEXT, VARCHAR, etc.)
    String(String),

    /// Binary data (BYTEA)
    Bytes(Vec<u8>),

    /// TIMESTAMPTZ
    Timestamp(DateTime<Utc>),

    /// TIMESTAMP without time zone
    NaiveTimestamp(NaiveDateTime),

    /// DATE
    Date(NaiveDate),

    /// TIME
    Time(NaiveTime),

    /// JSON/JSONB document as text
    Json(String),
}

impl Value {
    /// Returns true if this is a NULL value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

fn checked<T: ToSql>(v: &T, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if !T::accepts(ty) {
        return Err(Box::new(WrongType::new::<T>(ty.clone())));
    }
    v.to_sql(ty, out)
}

/// Integers bind to any integer, float or numeric parameter, narrowing with a
/// range check.
fn int_to_sql(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::INT8 => v.to_sql(ty, out),
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(v).to_sql(ty, out),
        _ => Err(Box::new(WrongType::new::<i64>(ty.clone()))),
    }
}

fn float_to_sql(v: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => v.to_sql(ty, out),
        Type::NUMERIC => Decimal::try_from(v)?.to_sql(ty, out),
        _ => Err(Box::new(WrongType::new::<f64>(ty.clone()))),
    }
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => checked(v, ty, out),
            Value::I16(v) => int_to_sql(i64::from(*v), ty, out),
            Value::I32(v) => int_to_sql(i64::from(*v), ty, out),
            Value::I64(v) => int_to_sql(*v, ty, out),
            Value::F32(v) => float_to_sql(f64::from(*v), ty, out),
            Value::F64(v) => float_to_sql(*v, ty, out),
            Value::Decimal(v) => checked(v, ty, out),
            Value::String(v) => checked(v, ty, out),
            Value::Bytes(v) => checked(v, ty, out),
            Value::Timestamp(v) => checked(v, ty, out),
            Value::NaiveTimestamp(v) => checked(v, ty, out),
            Value::Date(v) => checked(v, ty, out),
            Value::Time(v) => checked(v, ty, out),
            Value::Json(v) => {
                if *ty == Type::JSONB {
                    // jsonb binary format version
                    out.put_u8(1);
                } else if *ty != Type::JSON {
                    return Err(Box::new(WrongType::new::<String>(ty.clone())));
                }
                out.extend_from_slice(v.as_bytes());
                Ok(IsNull::No)
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // Conversion is decided per value in `to_sql`.
        true
    }

    to_sql_checked!();
}

// Convenient From impls
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::I16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::NaiveTimestamp(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_narrows_to_parameter_type() {
        let mut out = BytesMut::new();
        Value::I64(7).to_sql(&Type::INT4, &mut out).unwrap();
        assert_eq!(&out[..], &7i32.to_be_bytes());

        let mut out = BytesMut::new();
        Value::I16(7).to_sql(&Type::INT8, &mut out).unwrap();
        assert_eq!(&out[..], &7i64.to_be_bytes());
    }

    #[test]
    fn test_int_out_of_range_is_error() {
        let mut out = BytesMut::new();
        assert!(Value::I64(i64::MAX).to_sql(&Type::INT2, &mut out).is_err());
    }

    #[test]
    fn test_string_rejects_integer_parameter() {
        let mut out = BytesMut::new();
        assert!(Value::from("x").to_sql(&Type::INT4, &mut out).is_err());
    }

    #[test]
    fn test_null_binds_to_anything() {
        let mut out = BytesMut::new();
        assert!(matches!(
            Value::Null.to_sql(&Type::INT4, &mut out).unwrap(),
            IsNull::Yes
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn test_jsonb_has_version_byte() {
        let mut out = BytesMut::new();
        Value::Json("{}".into())
            .to_sql(&Type::JSONB, &mut out)
            .unwrap();
        assert_eq!(&out[..], b"\x01{}");
    }

    #[test]
    fn test_time_converts_and_binds() {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let value = Value::from(noon);
        assert_eq!(value, Value::Time(noon));
        assert_eq!(Value::from(Some(noon)), Value::Time(noon));

        let mut out = BytesMut::new();
        value.to_sql(&Type::TIME, &mut out).unwrap();
        assert_eq!(&out[..], &(12i64 * 3600 * 1_000_000).to_be_bytes());
    }

    #[test]
    fn test_record_helper_keeps_order() {
        let r = record([("b", 1i64), ("a", 2i64)]);
        let keys: Vec<&str> = r.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }
}
