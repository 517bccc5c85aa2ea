use chrono::NaiveDateTime;

#[cfg(feature = "postgres")]
use chrono::{DateTime, Utc};
#[cfg(feature = "postgres")]
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

/// A statement parameter understood by both drivers.
///
/// Postgres binding is width-aware: an `Int` bound to an `INT2`/`INT4`
/// column is narrowed (and rejected if it does not fit), a `Float` bound to
/// `FLOAT4` is narrowed, and a `Timestamp` bound to `TIMESTAMPTZ` is
/// treated as UTC.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        SqlValue::Text(value.clone())
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value.into())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(value: NaiveDateTime) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

#[cfg(feature = "mysql")]
impl From<&SqlValue> for mysql::Value {
    fn from(value: &SqlValue) -> Self {
        use chrono::{Datelike, Timelike};

        match value {
            SqlValue::Null => mysql::Value::NULL,
            SqlValue::Bool(v) => mysql::Value::Int(i64::from(*v)),
            SqlValue::Int(v) => mysql::Value::Int(*v),
            SqlValue::Float(v) => mysql::Value::Double(*v),
            SqlValue::Text(v) => mysql::Value::Bytes(v.as_bytes().to_vec()),
            SqlValue::Timestamp(v) => mysql::Value::Date(
                v.year() as u16,
                v.month() as u8,
                v.day() as u8,
                v.hour() as u8,
                v.minute() as u8,
                v.second() as u8,
                v.nanosecond() / 1_000,
            ),
        }
    }
}

#[cfg(feature = "postgres")]
impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql(ty, out),
            SqlValue::Int(v) => {
                if *ty == Type::INT2 {
                    i16::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*v as f64).to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::Float(v) => {
                if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::Text(v) => v.to_sql(ty, out),
            SqlValue::Timestamp(v) => {
                if *ty == Type::TIMESTAMPTZ {
                    DateTime::<Utc>::from_naive_utc_and_offset(*v, Utc).to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
        }
    }

    // Narrowing and the per-variant encoders decide; the server rejects the rest.
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Borrows a parameter list in the shape `tokio_postgres` expects.
#[cfg(feature = "postgres")]
pub(crate) fn pg_params(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

/// Converts a parameter list for the `mysql` driver.
#[cfg(feature = "mysql")]
pub(crate) fn mysql_params(params: &[SqlValue]) -> Vec<mysql::Value> {
    params.iter().map(mysql::Value::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 6, 13)
            .unwrap()
            .and_hms_micro_opt(12, 30, 45, 250)
            .unwrap()
    }

    #[test]
    fn options_map_to_null() {
        let none: Option<String> = None;
        assert_eq!(SqlValue::from(none), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("hi")), SqlValue::Text("hi".to_string()));
        assert_eq!(SqlValue::from(2023), SqlValue::Int(2023));
    }

    #[cfg(feature = "mysql")]
    #[test]
    fn mysql_conversion() {
        assert_eq!(mysql::Value::from(&SqlValue::Null), mysql::Value::NULL);
        assert_eq!(mysql::Value::from(&SqlValue::Bool(true)), mysql::Value::Int(1));
        assert_eq!(
            mysql::Value::from(&SqlValue::Text("::1".to_string())),
            mysql::Value::Bytes(b"::1".to_vec())
        );
        assert_eq!(
            mysql::Value::from(&SqlValue::Timestamp(noon())),
            mysql::Value::Date(2023, 6, 13, 12, 30, 45, 250)
        );
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn postgres_int_narrows_to_int4() {
        let mut buf = bytes::BytesMut::new();
        let is_null = SqlValue::Int(2023).to_sql(&Type::INT4, &mut buf).unwrap();
        assert!(matches!(is_null, IsNull::No));
        assert_eq!(&buf[..], &2023i32.to_be_bytes());
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn postgres_int_overflow_is_rejected() {
        let mut buf = bytes::BytesMut::new();
        assert!(SqlValue::Int(i64::MAX).to_sql(&Type::INT2, &mut buf).is_err());
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn postgres_null_binds_as_null() {
        let mut buf = bytes::BytesMut::new();
        let is_null = SqlValue::Null.to_sql(&Type::TEXT, &mut buf).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(buf.is_empty());
    }
}
