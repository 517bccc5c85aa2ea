use std::borrow::Cow;

#[cfg(any(feature = "postgres", feature = "mysql"))]
use base64::Engine;
use serde::{Deserialize, Deserializer};

#[cfg(feature = "postgres")]
use crate::error::SiteDbError;

/// A result row keyed by column name.
pub type JsonRow = serde_json::Map<String, serde_json::Value>;

/// Trims `sql` and appends a `;` if it does not already end with one.
pub fn terminate_statement(sql: &str) -> Cow<'_, str> {
    let trimmed = sql.trim();
    if trimmed.ends_with(';') {
        Cow::Borrowed(trimmed)
    } else {
        Cow::Owned(format!("{};", trimmed))
    }
}

/// Accepts `true`/`false` as well as the `0`/`1` integers MySQL returns
/// for boolean expressions.
pub fn bool_from_int_or_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

#[cfg(any(feature = "postgres", feature = "mysql"))]
fn timestamp_to_json(value: chrono::NaiveDateTime) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

/// Decimal text as a JSON number when it fits an `f64`, else as the text.
#[cfg(any(feature = "postgres", feature = "mysql"))]
fn decimal_to_json(text: &str) -> serde_json::Value {
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
        .unwrap_or_else(|| serde_json::Value::String(text.to_string()))
}

#[cfg(any(feature = "postgres", feature = "mysql"))]
fn bytes_to_json(value: &[u8]) -> serde_json::Value {
    serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(value))
}

/// Shapes a Postgres row into a [`JsonRow`].
///
/// A column whose type cannot be read fails the row with
/// [`SiteDbError::DeserializationError`] instead of turning into `null`.
#[cfg(feature = "postgres")]
pub(crate) fn pg_row_to_json(row: &tokio_postgres::Row) -> Result<JsonRow, SiteDbError> {
    let mut json_obj = JsonRow::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = pg_value_to_json(row, i, column.type_().oid()).map_err(|e| {
            log::error!("Column {} ({}) could not be read: {}", column.name(), column.type_(), e);
            SiteDbError::DeserializationError(format!(
                "column {} of type {}: {}",
                column.name(),
                column.type_(),
                e
            ))
        })?;
        json_obj.insert(column.name().to_string(), value);
    }
    Ok(json_obj)
}

/// `numeric` in its binary wire form, rendered as decimal text.
#[cfg(feature = "postgres")]
struct PgNumeric(String);

#[cfg(feature = "postgres")]
impl<'a> tokio_postgres::types::FromSql<'a> for PgNumeric {
    fn from_sql(
        _ty: &tokio_postgres::types::Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        numeric_to_string(raw).map(PgNumeric)
    }

    fn accepts(ty: &tokio_postgres::types::Type) -> bool {
        *ty == tokio_postgres::types::Type::NUMERIC
    }
}

/// Decodes the binary `numeric` layout: digit count, weight, sign, display
/// scale, then base-10000 digits.
#[cfg(feature = "postgres")]
fn numeric_to_string(raw: &[u8]) -> Result<String, Box<dyn std::error::Error + Sync + Send>> {
    const NEGATIVE: u16 = 0x4000;
    const NAN: u16 = 0xC000;
    const POS_INFINITY: u16 = 0xD000;
    const NEG_INFINITY: u16 = 0xF000;

    let word = |at: usize| -> Option<u16> {
        raw.get(at..at + 2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    };
    let header = |at: usize| word(at).ok_or("numeric header is truncated");

    let ndigits = usize::from(header(0)?);
    let weight = i32::from(header(2)? as i16);
    let sign = header(4)?;
    let dscale = usize::from(header(6)?);

    match sign {
        NAN => return Ok("NaN".to_string()),
        POS_INFINITY => return Ok("Infinity".to_string()),
        NEG_INFINITY => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| word(8 + 2 * i))
        .collect::<Option<Vec<u16>>>()
        .ok_or("numeric digits are truncated")?;
    let digit = |pos: i32| -> u16 {
        usize::try_from(pos)
            .ok()
            .and_then(|pos| digits.get(pos).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == NEGATIVE {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&digit(0).to_string());
        for pos in 1..=weight {
            text.push_str(&format!("{:04}", digit(pos)));
        }
    }
    if dscale > 0 {
        let mut fraction = String::new();
        let mut pos = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(pos)));
            pos += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }
    Ok(text)
}

#[cfg(feature = "postgres")]
fn pg_value_to_json(
    row: &tokio_postgres::Row,
    index: usize,
    type_oid: u32,
) -> Result<serde_json::Value, tokio_postgres::Error> {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
    use serde_json::Value;

    Ok(match type_oid {
        // bool
        16 => row.try_get::<_, Option<bool>>(index)?.map_or(Value::Null, Value::Bool),
        // int2
        21 => row.try_get::<_, Option<i16>>(index)?.map_or(Value::Null, Value::from),
        // int4
        23 => row.try_get::<_, Option<i32>>(index)?.map_or(Value::Null, Value::from),
        // int8
        20 => row.try_get::<_, Option<i64>>(index)?.map_or(Value::Null, Value::from),
        // float4
        700 => row.try_get::<_, Option<f32>>(index)?.map_or(Value::Null, |v| Value::from(f64::from(v))),
        // float8
        701 => row.try_get::<_, Option<f64>>(index)?.map_or(Value::Null, Value::from),
        // timestamp
        1114 => row.try_get::<_, Option<NaiveDateTime>>(index)?.map_or(Value::Null, timestamp_to_json),
        // timestamptz, reported in UTC
        1184 => row
            .try_get::<_, Option<DateTime<Utc>>>(index)?
            .map_or(Value::Null, |v| timestamp_to_json(v.naive_utc())),
        // date
        1082 => row
            .try_get::<_, Option<NaiveDate>>(index)?
            .map_or(Value::Null, |v| Value::String(v.to_string())),
        // json/jsonb
        114 | 3802 => row.try_get::<_, Option<Value>>(index)?.unwrap_or(Value::Null),
        // bytea
        17 => row.try_get::<_, Option<Vec<u8>>>(index)?.map_or(Value::Null, |v| bytes_to_json(&v)),
        // numeric
        1700 => row
            .try_get::<_, Option<PgNumeric>>(index)?
            .map_or(Value::Null, |v| decimal_to_json(&v.0)),
        // inet
        869 => row
            .try_get::<_, Option<std::net::IpAddr>>(index)?
            .map_or(Value::Null, |v| Value::String(v.to_string())),
        // text/varchar/bpchar/name and anything else readable as text
        _ => row.try_get::<_, Option<String>>(index)?.map_or(Value::Null, Value::String),
    })
}

/// Shapes a MySQL row into a [`JsonRow`].
#[cfg(feature = "mysql")]
pub(crate) fn mysql_row_to_json(row: &mysql::Row) -> JsonRow {
    let mut json_obj = JsonRow::new();
    for (i, column) in row.columns_ref().iter().enumerate() {
        let value = row
            .as_ref(i)
            .map(|value| mysql_value_to_json(value, column.column_type()))
            .unwrap_or(serde_json::Value::Null);
        json_obj.insert(column.name_str().to_string(), value);
    }
    json_obj
}

/// Converts one MySQL cell. Text-encoded decimals become numbers; binary
/// blobs are base64-encoded; zero dates become `null`.
#[cfg(feature = "mysql")]
pub(crate) fn mysql_value_to_json(
    value: &mysql::Value,
    column_type: mysql::consts::ColumnType,
) -> serde_json::Value {
    use mysql::consts::ColumnType;
    use serde_json::Value;

    match value {
        mysql::Value::NULL => Value::Null,
        mysql::Value::Int(v) => Value::from(*v),
        mysql::Value::UInt(v) => Value::from(*v),
        mysql::Value::Float(v) => Value::from(f64::from(*v)),
        mysql::Value::Double(v) => Value::from(*v),
        mysql::Value::Bytes(bytes) => match column_type {
            ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
                decimal_to_json(&String::from_utf8_lossy(bytes))
            }
            ColumnType::MYSQL_TYPE_TINY_BLOB
            | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
            | ColumnType::MYSQL_TYPE_LONG_BLOB
            | ColumnType::MYSQL_TYPE_BLOB => match std::str::from_utf8(bytes) {
                // TEXT columns are reported as BLOB types too
                Ok(text) => Value::String(text.to_string()),
                Err(_) => bytes_to_json(bytes),
            },
            _ => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        },
        mysql::Value::Date(year, month, day, hour, minute, second, micros) => {
            chrono::NaiveDate::from_ymd_opt(i32::from(*year), u32::from(*month), u32::from(*day))
                .and_then(|date| {
                    date.and_hms_micro_opt(
                        u32::from(*hour),
                        u32::from(*minute),
                        u32::from(*second),
                        *micros,
                    )
                })
                .map_or(Value::Null, timestamp_to_json)
        }
        mysql::Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = u64::from(*days) * 24 + u64::from(*hours);
            let sign = if *negative { "-" } else { "" };
            let mut text = format!("{}{:02}:{:02}:{:02}", sign, total_hours, minutes, seconds);
            if *micros > 0 {
                text.push_str(&format!(".{:06}", micros));
            }
            Value::String(text)
        }
    }
}
