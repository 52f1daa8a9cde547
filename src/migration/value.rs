// ABOUTME: Tagged row value decoded from the source and re-encoded for the target
// ABOUTME: Unknown column types pass through as raw binary wire bytes

use std::error::Error;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tokio_postgres::types::{FromSql, IsNull, Kind, ToSql, Type};
use tokio_postgres::Row;
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

/// Binary-format value of a column type without a dedicated variant.
///
/// The bytes are only valid for a column of the same type, so encoding checks
/// the type name (OIDs of user-defined types differ between databases).
/// Arrays and composites embed element and field OIDs; those are rewritten to
/// the target's on encode, one level deep. An array of composites, or a
/// composite holding a user-defined array, still carries source OIDs in its
/// nested values and is rejected by a target whose OIDs differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawValue {
    pub type_name: String,
    pub bytes: Vec<u8>,
}

impl<'a> FromSql<'a> for RawValue {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(RawValue {
            type_name: ty.name().to_string(),
            bytes: raw.to_vec(),
        })
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// JSONB binary format version written ahead of the text.
const JSONB_VERSION: u8 = 1;

/// Text of a `json` or `jsonb` value, exactly as the server sent it.
///
/// Going through a parsed document would reorder keys and round numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonText(pub String);

impl<'a> FromSql<'a> for JsonText {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let text = if *ty == Type::JSONB {
            match raw.split_first() {
                Some((&JSONB_VERSION, rest)) => rest,
                Some((version, _)) => {
                    return Err(format!("unsupported jsonb version {}", version).into())
                }
                None => return Err("empty jsonb value".into()),
            }
        } else {
            raw
        };
        Ok(JsonText(std::str::from_utf8(text)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::JSON || *ty == Type::JSONB
    }
}

fn write_json(text: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::JSONB => out.extend_from_slice(&[JSONB_VERSION]),
        Type::JSON => {}
        _ => return Err(format!("cannot write a json value into a {} column", ty.name()).into()),
    }
    out.extend_from_slice(text.as_bytes());
    Ok(IsNull::No)
}

/// One column value of a copied row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(JsonText),
    Raw(RawValue),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

fn typed<'a, T, F>(row: &'a Row, idx: usize, wrap: F) -> Result<SqlValue, tokio_postgres::Error>
where
    T: FromSql<'a>,
    F: FnOnce(T) -> SqlValue,
{
    Ok(row
        .try_get::<_, Option<T>>(idx)?
        .map(wrap)
        .unwrap_or(SqlValue::Null))
}

/// Decode column `idx` of `row` using the column's source type.
///
/// Values a typed decoder rejects (for example `infinity` timestamps) fall
/// back to `Raw`, which preserves them bit for bit.
pub fn decode_column(row: &Row, idx: usize) -> Result<SqlValue, tokio_postgres::Error> {
    let ty = row.columns()[idx].type_().clone();

    let decoded = match ty {
        Type::BOOL => typed(row, idx, SqlValue::Bool),
        Type::INT2 => typed(row, idx, SqlValue::I16),
        Type::INT4 => typed(row, idx, SqlValue::I32),
        Type::INT8 => typed(row, idx, SqlValue::I64),
        Type::FLOAT4 => typed(row, idx, SqlValue::F32),
        Type::FLOAT8 => typed(row, idx, SqlValue::F64),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => typed(row, idx, SqlValue::Text),
        Type::BYTEA => typed(row, idx, SqlValue::Bytes),
        Type::DATE => typed(row, idx, SqlValue::Date),
        Type::TIME => typed(row, idx, SqlValue::Time),
        Type::TIMESTAMP => typed(row, idx, SqlValue::Timestamp),
        Type::TIMESTAMPTZ => typed(row, idx, SqlValue::TimestampTz),
        Type::UUID => typed(row, idx, SqlValue::Uuid),
        Type::JSON | Type::JSONB => typed(row, idx, SqlValue::Json),
        _ => return typed(row, idx, SqlValue::Raw),
    };

    match decoded {
        Ok(value) => Ok(value),
        Err(_) => typed(row, idx, SqlValue::Raw),
    }
}

/// Decode every column of `row` in result-set order.
pub fn decode_row(row: &Row) -> Result<Vec<SqlValue>, tokio_postgres::Error> {
    (0..row.len()).map(|idx| decode_column(row, idx)).collect()
}

// Integers are written at the target column's width when the value fits.
fn write_integer(value: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(value)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(value)?.to_sql(ty, out),
        _ => value.to_sql_checked(ty, out),
    }
}

fn read_i32(bytes: &[u8], at: usize) -> Result<i32, BoxError> {
    let field = bytes
        .get(at..at + 4)
        .ok_or("truncated binary value")?;
    Ok(i32::from_be_bytes([field[0], field[1], field[2], field[3]]))
}

fn write_oid(bytes: &mut [u8], at: usize, oid: u32) -> Result<(), BoxError> {
    bytes
        .get_mut(at..at + 4)
        .ok_or("truncated binary value")?
        .copy_from_slice(&oid.to_be_bytes());
    Ok(())
}

/// Replace the element/field OIDs embedded in array and composite values with
/// the target's.
fn retarget_oids(bytes: &mut [u8], ty: &Type) -> Result<(), BoxError> {
    match ty.kind() {
        // ndim, has-null flag, element OID, dimensions...
        Kind::Array(element) => write_oid(bytes, 8, element.oid()),
        // field count, then per field: OID, length (-1 for NULL), data
        Kind::Composite(fields) => {
            let count = read_i32(bytes, 0)?;
            if count < 0 || count as usize != fields.len() {
                return Err(format!(
                    "composite value has {} fields, target type {} has {}",
                    count,
                    ty.name(),
                    fields.len()
                )
                .into());
            }
            let mut pos = 4;
            for field in fields {
                write_oid(bytes, pos, field.type_().oid())?;
                let len = read_i32(bytes, pos + 4)?;
                pos += 8 + usize::try_from(len).unwrap_or(0);
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn write_raw(raw: &RawValue, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if raw.type_name != ty.name() {
        return Err(format!(
            "cannot write a {} value into a {} column",
            raw.type_name,
            ty.name()
        )
        .into());
    }
    let start = out.len();
    out.extend_from_slice(&raw.bytes);
    retarget_oids(&mut out[start..], ty)?;
    Ok(IsNull::No)
}

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        self.to_sql_checked(ty, out)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn to_sql_checked(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql_checked(ty, out),
            SqlValue::I16(v) => write_integer(i64::from(*v), ty, out),
            SqlValue::I32(v) => write_integer(i64::from(*v), ty, out),
            SqlValue::I64(v) => write_integer(*v, ty, out),
            SqlValue::F32(v) if *ty == Type::FLOAT8 => f64::from(*v).to_sql(ty, out),
            SqlValue::F32(v) => v.to_sql_checked(ty, out),
            SqlValue::F64(v) => v.to_sql_checked(ty, out),
            SqlValue::Text(v) => v.to_sql_checked(ty, out),
            SqlValue::Bytes(v) => v.to_sql_checked(ty, out),
            SqlValue::Date(v) => v.to_sql_checked(ty, out),
            SqlValue::Time(v) => v.to_sql_checked(ty, out),
            SqlValue::Timestamp(v) => v.to_sql_checked(ty, out),
            SqlValue::TimestampTz(v) => v.to_sql_checked(ty, out),
            SqlValue::Uuid(v) => v.to_sql_checked(ty, out),
            SqlValue::Json(v) => write_json(&v.0, ty, out),
            SqlValue::Raw(raw) => write_raw(raw, ty, out),
        }
    }
}
