//! Reading source rows from Postgres into [`Record`]s.

use crate::error::{BoxError, Error};
use crate::mapper::FieldMapper;
use crate::upsert::Dialect;
use crate::value::{Record, Value};
use crate::Result;
use rust_decimal::Decimal;
use std::error::Error as StdError;
use tokio_postgres::types::{FromSql, Type, WrongType};

/// JSON or JSONB column read as text.
struct JsonText(String);

impl<'a> FromSql<'a> for JsonText {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        let raw = match (*ty == Type::JSONB, raw.split_first()) {
            // jsonb binary format starts with a version byte
            (true, Some((&1, rest))) => rest,
            (true, _) => return Err(format!("unsupported jsonb encoding for {}", ty).into()),
            (false, _) => raw,
        };
        Ok(JsonText(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::JSON || *ty == Type::JSONB
    }
}

/// Convert a Postgres row into a record keyed by column name.
///
/// `table` is only used for error reporting.
pub fn pg_row_to_record(row: &tokio_postgres::Row, table: &str) -> Result<Record> {
    let mut record = Record::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = pg_value_to_value(row, idx, table, column.name(), column.type_())?;
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

fn pg_value_to_value(
    row: &tokio_postgres::Row,
    idx: usize,
    table: &str,
    column: &str,
    ty: &Type,
) -> Result<Value> {
    // A WrongType source means the column type and the Rust type disagree;
    // anything else is a decoding failure.
    let read_error = |expected: &str, e: tokio_postgres::Error| {
        if e.source()
            .and_then(|s| s.downcast_ref::<WrongType>())
            .is_some()
        {
            return Error::TypeMismatch {
                table: table.to_string(),
                column: column.to_string(),
                expected: expected.to_string(),
                actual: ty.name().to_string(),
            };
        }
        Error::ColumnRead {
            table: table.to_string(),
            column: column.to_string(),
            expected: expected.to_string(),
            message: e.to_string(),
        }
    };

    let value = match *ty {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .map_err(|e| read_error("bool", e))?
            .map(Value::Bool),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .map_err(|e| read_error("smallint", e))?
            .map(Value::I16),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .map_err(|e| read_error("integer", e))?
            .map(Value::I32),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .map_err(|e| read_error("bigint", e))?
            .map(Value::I64),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .map_err(|e| read_error("real", e))?
            .map(Value::F32),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)
            .map_err(|e| read_error("double precision", e))?
            .map(Value::F64),
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(idx)
            .map_err(|e| read_error("numeric", e))?
            .map(Value::Decimal),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => row
            .try_get::<_, Option<String>>(idx)
            .map_err(|e| read_error("text", e))?
            .map(Value::String),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .map_err(|e| read_error("bytea", e))?
            .map(Value::Bytes),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .map_err(|e| read_error("timestamptz", e))?
            .map(Value::Timestamp),
        Type::TIMESTAMP => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .map_err(|e| read_error("timestamp", e))?
            .map(Value::NaiveTimestamp),
        Type::DATE => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)
            .map_err(|e| read_error("date", e))?
            .map(Value::Date),
        Type::TIME => row
            .try_get::<_, Option<chrono::NaiveTime>>(idx)
            .map_err(|e| read_error("time", e))?
            .map(Value::Time),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<JsonText>>(idx)
            .map_err(|e| read_error("json", e))?
            .map(|j| Value::Json(j.0)),
        _ => {
            return Err(Error::TypeMismatch {
                table: table.to_string(),
                column: column.to_string(),
                expected: "a supported column type".to_string(),
                actual: ty.name().to_string(),
            });
        }
    };

    Ok(value.unwrap_or(Value::Null))
}

/// `SELECT` of the mapper's source fields from its source table, in mapping
/// order.
pub fn select_mapped_sql(mapper: &FieldMapper) -> String {
    let d = Dialect::Postgres;
    let cols: Vec<String> = mapper.source_fields().map(|c| d.quote_ident(c)).collect();
    format!(
        "SELECT {} FROM {}",
        cols.join(", "),
        d.quote_ident(&mapper.source_table().name)
    )
}

/// Read every source row for a mapping.
pub async fn fetch_mapped(
    client: &tokio_postgres::Client,
    mapper: &FieldMapper,
) -> Result<Vec<Record>> {
    let sql = select_mapped_sql(mapper);
    let table = &mapper.source_table().name;
    let rows = {
        use tracing::Instrument;
        let span = tracing::debug_span!("db.query", sql = %sql, rows = tracing::field::Empty);
        let rows = client.query(&sql, &[]).instrument(span.clone()).await?;
        span.record("rows", rows.len());
        rows
    };
    rows.iter().map(|row| pg_row_to_record(row, table)).collect()
}
