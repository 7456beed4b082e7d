//! Row scanning: column values coerce to strings per the gateway's
//! uniform stringification rules.

use sqlx::postgres::{PgColumn, PgRow};
use sqlx::{Column, Row, TypeInfo};

use crate::application::executor::{ExecutorError, RowMap};
use crate::domain::value::{db_bytes, db_text};

use super::map_sqlx_error;

pub(crate) fn row_to_map(row: &PgRow) -> Result<RowMap, ExecutorError> {
    let mut map = RowMap::new();
    for (index, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_lowercase(), decode_column(row, index, column)?);
    }
    Ok(map)
}

fn decode_column(row: &PgRow, index: usize, column: &PgColumn) -> Result<String, ExecutorError> {
    let type_name = column.type_info().name();

    let text = match type_name {
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" | "UNKNOWN" => {
            db_text(get::<String>(row, index)?)
        }
        "INT2" => db_text(get::<i16>(row, index)?),
        "INT4" => db_text(get::<i32>(row, index)?),
        "INT8" => db_text(get::<i64>(row, index)?),
        "FLOAT4" => db_text(get::<f32>(row, index)?),
        "FLOAT8" => db_text(get::<f64>(row, index)?),
        "BOOL" => db_text(get::<bool>(row, index)?),
        "BYTEA" => db_bytes(get::<Vec<u8>>(row, index)?),
        "UUID" => db_text(get::<uuid::Uuid>(row, index)?),
        "TIMESTAMPTZ" => db_text(get::<time::OffsetDateTime>(row, index)?),
        "TIMESTAMP" => db_text(get::<time::PrimitiveDateTime>(row, index)?),
        "DATE" => db_text(get::<time::Date>(row, index)?),
        "TIME" => db_text(get::<time::Time>(row, index)?),
        "JSON" | "JSONB" => match get::<serde_json::Value>(row, index)? {
            Some(value) => value.to_string(),
            None => String::new(),
        },
        other => {
            return Err(ExecutorError::UnsupportedColumn {
                column: column.name().to_string(),
                type_name: other.to_string(),
            });
        }
    };

    Ok(text)
}

fn get<'r, T>(row: &'r PgRow, index: usize) -> Result<Option<T>, ExecutorError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<Option<T>, _>(index).map_err(map_sqlx_error)
}
