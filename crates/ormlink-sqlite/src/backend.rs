//! SQLite implementation of the persistence backend.
//!
//! One table per entity type, named after the lowercased type name, with one
//! column per persistent field. UUIDs and enum variants are stored as text,
//! timestamps as fractional seconds since the Unix epoch, booleans as 0/1.

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, trace};
use uuid::Uuid;

use ormlink_core::backend::{Backend, Record, Row};
use ormlink_core::catalog::{EntityDef, FieldDef, FieldType, ScalarType};
use ormlink_core::error::BackendError;
use ormlink_core::query::Filter;
use ormlink_core::Value;

use crate::config::SqliteConfig;
use crate::error::{Result, SqliteError};

/// Backend storing entities in a SQLite database.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open a database as configured.
    pub fn open(config: SqliteConfig) -> Result<Self> {
        let conn = match &config.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(config.busy_timeout)?;

        debug!(path = ?config.path, "SQLite backend opened");
        Ok(Self { conn })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(SqliteConfig::in_memory())
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create the entity's table if it does not exist.
    pub fn create_table(&self, entity: &EntityDef) -> Result<()> {
        let sql = create_table_sql(entity);
        self.conn.execute_batch(&sql)?;
        debug!(table = %entity.table_name(), "Table ensured");
        Ok(())
    }

    /// Rows of the entity's table matching an equality filter.
    pub fn select(&self, entity: &EntityDef, filter: &Filter) -> Result<Vec<Row>> {
        let table = entity.table_name();
        let fields: Vec<&FieldDef> = entity.persistent_fields().collect();
        let columns = fields
            .iter()
            .map(|f| quote(&f.name))
            .collect::<Vec<_>>()
            .join(", ");

        let (clause, params) = where_clause(entity, filter)?;
        let sql = format!("SELECT {columns} FROM {}{clause}", quote(&table));

        let mut stmt = self.conn.prepare(&sql)?;
        let raw_rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            (0..fields.len())
                .map(|i| row.get::<_, SqlValue>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?;

        let mut rows = Vec::new();
        for raw in raw_rows {
            let mut row = Row::new();
            for (field, value) in fields.iter().zip(raw?) {
                row.set(field.name.clone(), from_sql(&table, field, value)?);
            }
            rows.push(row);
        }
        Ok(rows)
    }

    /// Insert or update a record.
    pub fn write(&self, entity: &EntityDef, record: &Record) -> Result<()> {
        let table = entity.table_name();
        let fields: Vec<&FieldDef> = entity.persistent_fields().collect();

        let mut params = Vec::with_capacity(fields.len() + 1);
        for field in &fields {
            let value = record.row.get(&field.name).unwrap_or(&Value::Null);
            params.push(to_sql(&table, field, value)?);
        }

        if record.in_storage {
            let assignments = fields
                .iter()
                .enumerate()
                .map(|(i, f)| format!("{} = ?{}", quote(&f.name), i + 1))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "UPDATE {} SET {assignments} WHERE {} = ?{}",
                quote(&table),
                quote(&entity.identity_field),
                fields.len() + 1
            );
            params.push(SqlValue::Text(record.id.to_string()));

            let updated = self.conn.execute(&sql, params_from_iter(params.iter()))?;
            if updated == 0 {
                return Err(SqliteError::MissingRow {
                    table,
                    id: record.id,
                });
            }
        } else {
            let columns = fields
                .iter()
                .map(|f| quote(&f.name))
                .collect::<Vec<_>>()
                .join(", ");
            let placeholders = (1..=fields.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "INSERT INTO {} ({columns}) VALUES ({placeholders})",
                quote(&table)
            );
            self.conn.execute(&sql, params_from_iter(params.iter()))?;
        }

        trace!(table = %table, id = %record.id, update = record.in_storage, "Row written");
        Ok(())
    }
}

impl Backend for SqliteBackend {
    fn create(&self, entity: &EntityDef) -> std::result::Result<(), BackendError> {
        Ok(self.create_table(entity)?)
    }

    fn find(&self, entity: &EntityDef, filter: &Filter) -> std::result::Result<Vec<Row>, BackendError> {
        Ok(self.select(entity, filter)?)
    }

    fn save(&self, entity: &EntityDef, record: &Record) -> std::result::Result<(), BackendError> {
        Ok(self.write(entity, record)?)
    }
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.conn.path())
            .finish()
    }
}

/// Quote an identifier.
fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_type(field_type: &FieldType) -> &'static str {
    match field_type {
        FieldType::Scalar(ScalarType::Bool | ScalarType::Int64) => "INTEGER",
        FieldType::Scalar(ScalarType::Float64 | ScalarType::Timestamp) => "REAL",
        FieldType::Scalar(ScalarType::String | ScalarType::Uuid)
        | FieldType::Enum { .. }
        | FieldType::Reference { .. }
        | FieldType::Collection { .. } => "TEXT",
    }
}

fn create_table_sql(entity: &EntityDef) -> String {
    let columns = entity
        .persistent_fields()
        .map(|f| {
            let mut column = format!("{} {}", quote(&f.name), column_type(&f.field_type));
            if f.name == entity.identity_field {
                column.push_str(" PRIMARY KEY");
            }
            column
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({columns})",
        quote(&entity.table_name())
    )
}

fn where_clause(entity: &EntityDef, filter: &Filter) -> Result<(String, Vec<SqlValue>)> {
    let table = entity.table_name();
    let mut conditions = Vec::new();
    let mut params = Vec::new();

    for condition in filter.conditions() {
        let (name, value) = condition
            .as_equality()
            .map_err(|_| SqliteError::UnsupportedFilter(condition.to_string()))?;
        let field = entity.get_field(name).ok_or_else(|| {
            SqliteError::UnsupportedFilter(format!("no column `{table}.{name}`"))
        })?;

        if value.is_null() {
            conditions.push(format!("{} IS NULL", quote(name)));
        } else {
            params.push(to_sql(&table, field, value)?);
            conditions.push(format!("{} = ?{}", quote(name), params.len()));
        }
    }

    if conditions.is_empty() {
        Ok((String::new(), params))
    } else {
        Ok((format!(" WHERE {}", conditions.join(" AND ")), params))
    }
}

fn timestamp_to_secs(t: &DateTime<Utc>) -> f64 {
    t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) / 1_000_000_000.0
}

fn secs_to_timestamp(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1_000_000_000.0).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

fn to_sql(table: &str, field: &FieldDef, value: &Value) -> Result<SqlValue> {
    let sql = match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Uuid(u) => SqlValue::Text(u.to_string()),
        Value::Timestamp(t) => SqlValue::Real(timestamp_to_secs(t)),
        Value::Ref(r) => {
            return Err(SqliteError::Unstorable {
                table: table.to_string(),
                column: field.name.clone(),
                found: format!("live handle {r}"),
            })
        }
    };
    Ok(sql)
}

fn from_sql(table: &str, field: &FieldDef, value: SqlValue) -> Result<Value> {
    let mismatch = |found: &str| SqliteError::Column {
        table: table.to_string(),
        column: field.name.clone(),
        expected: field.field_type.describe(),
        found: found.to_string(),
    };

    let value = match (&field.field_type, value) {
        (_, SqlValue::Null) => Value::Null,
        (FieldType::Scalar(ScalarType::Bool), SqlValue::Integer(i)) => Value::Bool(i != 0),
        (FieldType::Scalar(ScalarType::Int64), SqlValue::Integer(i)) => Value::Int(i),
        (FieldType::Scalar(ScalarType::Float64), SqlValue::Real(f)) => Value::Float(f),
        (FieldType::Scalar(ScalarType::Float64), SqlValue::Integer(i)) => Value::Float(i as f64),
        (FieldType::Scalar(ScalarType::Timestamp), SqlValue::Real(secs)) => {
            Value::Timestamp(secs_to_timestamp(secs).ok_or_else(|| mismatch("out of range seconds"))?)
        }
        (FieldType::Scalar(ScalarType::Timestamp), SqlValue::Integer(secs)) => Value::Timestamp(
            DateTime::from_timestamp(secs, 0).ok_or_else(|| mismatch("out of range seconds"))?,
        ),
        (FieldType::Scalar(ScalarType::Uuid) | FieldType::Reference { .. }, SqlValue::Text(s)) => {
            Value::Uuid(Uuid::parse_str(&s).map_err(|_| mismatch("malformed uuid text"))?)
        }
        (FieldType::Scalar(ScalarType::String) | FieldType::Enum { .. }, SqlValue::Text(s)) => {
            Value::String(s)
        }
        (_, SqlValue::Integer(_)) => return Err(mismatch("integer")),
        (_, SqlValue::Real(_)) => return Err(mismatch("real")),
        (_, SqlValue::Text(_)) => return Err(mismatch("text")),
        (_, SqlValue::Blob(_)) => return Err(mismatch("blob")),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormlink_core::query::FilterExpr;

    fn user() -> EntityDef {
        EntityDef::new("User", "id")
            .with_field(FieldDef::identity("id"))
            .with_field(FieldDef::new("name", FieldType::scalar(ScalarType::String)))
            .with_field(FieldDef::optional("score", FieldType::scalar(ScalarType::Float64)))
            .with_field(FieldDef::reference("team", "Team"))
            .with_field(FieldDef::collection("posts", "Post"))
    }

    #[test]
    fn test_create_table_sql() {
        assert_eq!(
            create_table_sql(&user()),
            "CREATE TABLE IF NOT EXISTS \"user\" (\"id\" TEXT PRIMARY KEY, \"name\" TEXT, \
             \"score\" REAL, \"team\" TEXT)"
        );
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("order"), "\"order\"");
        assert_eq!(quote("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_where_clause() {
        let team = Uuid::new_v4();
        let filter = Filter::new().eq("name", "Bob").eq("team", team).eq("score", Value::Null);
        let (clause, params) = where_clause(&user(), &filter).unwrap();

        assert_eq!(clause, " WHERE \"name\" = ?1 AND \"team\" = ?2 AND \"score\" IS NULL");
        assert_eq!(
            params,
            vec![SqlValue::Text("Bob".into()), SqlValue::Text(team.to_string())]
        );
    }

    #[test]
    fn test_where_clause_rejects_comparisons() {
        let filter = Filter::new().with(FilterExpr::Lt {
            field: "score".into(),
            value: Value::Float(1.0),
        });
        assert!(matches!(
            where_clause(&user(), &filter),
            Err(SqliteError::UnsupportedFilter(_))
        ));
    }

    #[test]
    fn test_timestamp_seconds() {
        let t = DateTime::from_timestamp(1_700_000_000, 500_000_000).unwrap();
        let secs = timestamp_to_secs(&t);
        assert_eq!(secs, 1_700_000_000.5);
        assert_eq!(secs_to_timestamp(secs), Some(t));
    }

    #[test]
    fn test_read_mismatch() {
        let def = user();
        let field = def.get_field("team").unwrap();
        let err = from_sql("user", field, SqlValue::Text("nope".into())).unwrap_err();
        assert!(matches!(err, SqliteError::Column { .. }));
    }
}
