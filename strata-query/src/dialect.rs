//! Dialect adapters: identifier quoting, placeholders and type mapping.
//!
//! Every statement is assembled with neutral `?` placeholders and rewritten
//! through [`Dialect::bind_var`] only once it is complete, so placeholder
//! numbering always follows textual order.

use std::fmt;
use std::sync::Arc;

use crate::connection::Executor;
use crate::error::{QueryError, QueryResult};
use crate::model::{FieldDescriptor, StorageKind};
use crate::value::Value;

/// The quoting, placeholder and type-mapping capability of one SQL engine.
pub trait Dialect: Send + Sync + fmt::Debug {
    /// Canonical dialect name.
    fn name(&self) -> &'static str;

    /// Placeholder for the 1-based `index`-th bound value.
    fn bind_var(&self, index: usize) -> String;

    /// Quote one identifier.
    fn quote(&self, identifier: &str) -> String;

    /// Column type used in DDL.
    fn data_type_of(&self, field: &FieldDescriptor) -> String;

    /// Whether a table exists.
    fn has_table(&self, exec: &dyn Executor, table: &str) -> QueryResult<bool>;

    /// Whether a column exists.
    fn has_column(&self, exec: &dyn Executor, table: &str, column: &str) -> QueryResult<bool>;

    /// `LIMIT`/`OFFSET` clause, including the leading space.
    fn limit_and_offset_sql(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut sql = String::new();
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        sql
    }

    /// Dummy `FROM` clause for table-less selects.
    fn select_from_dummy_table(&self) -> &'static str {
        ""
    }

    /// Suffix returning a generated key from an insert.
    fn last_insert_id_returning_suffix(&self, _table: &str, _column: &str) -> String {
        String::new()
    }

    /// Clause between the column list and `VALUES` returning a generated key.
    fn last_insert_id_output_interstitial(&self, _table: &str, _column: &str) -> String {
        String::new()
    }

    /// Insert body for a row with no explicit values.
    fn default_values(&self) -> &'static str {
        "DEFAULT VALUES"
    }

    /// Quote a possibly qualified name (`users.id`), leaving `*` alone.
    fn quote_path(&self, name: &str) -> String {
        name.split('.')
            .map(|part| if part == "*" { part.to_string() } else { self.quote(part) })
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Look up a dialect by name.
pub fn by_name(name: &str) -> QueryResult<Arc<dyn Dialect>> {
    match name.to_ascii_lowercase().as_str() {
        "postgres" | "postgresql" => Ok(Arc::new(Postgres)),
        "mysql" | "mariadb" => Ok(Arc::new(MySql)),
        "mssql" | "sqlserver" => Ok(Arc::new(MsSql)),
        "sqlite" | "sqlite3" => Ok(Arc::new(Sqlite)),
        _ => Err(QueryError::unknown_dialect(name)),
    }
}

fn count_is_positive(exec: &dyn Executor, sql: &str, values: &[Value]) -> QueryResult<bool> {
    let count: i64 = exec
        .query(sql, values)?
        .next()
        .map(|row| row.get(0))
        .transpose()?
        .unwrap_or(0);
    Ok(count > 0)
}

fn text_type(field: &FieldDescriptor, unbounded: &str, bounded: impl Fn(u32) -> String) -> String {
    match field.size {
        Some(size) if size > 0 && size < 65532 => bounded(size),
        _ => unbounded.to_string(),
    }
}

/// PostgreSQL and compatible engines.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn bind_var(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    fn data_type_of(&self, field: &FieldDescriptor) -> String {
        if let Some(sql_type) = &field.sql_type {
            return sql_type.clone();
        }
        match field.kind {
            StorageKind::Bool => "boolean".into(),
            StorageKind::Int if field.auto_increment => "serial".into(),
            StorageKind::Int => "integer".into(),
            StorageKind::BigInt if field.auto_increment => "bigserial".into(),
            StorageKind::BigInt => "bigint".into(),
            StorageKind::Float => "numeric".into(),
            StorageKind::Text => text_type(field, "text", |n| format!("varchar({})", n)),
            StorageKind::Bytes => "bytea".into(),
            StorageKind::Timestamp => "timestamp with time zone".into(),
            StorageKind::Json => "jsonb".into(),
            StorageKind::Uuid => "uuid".into(),
        }
    }

    fn has_table(&self, exec: &dyn Executor, table: &str) -> QueryResult<bool> {
        count_is_positive(
            exec,
            "SELECT count(*) FROM INFORMATION_SCHEMA.tables WHERE table_name = $1 \
             AND table_type = 'BASE TABLE' AND table_schema = CURRENT_SCHEMA()",
            &[table.into()],
        )
    }

    fn has_column(&self, exec: &dyn Executor, table: &str, column: &str) -> QueryResult<bool> {
        count_is_positive(
            exec,
            "SELECT count(*) FROM INFORMATION_SCHEMA.columns WHERE table_name = $1 \
             AND column_name = $2 AND table_schema = CURRENT_SCHEMA()",
            &[table.into(), column.into()],
        )
    }

    fn last_insert_id_returning_suffix(&self, table: &str, column: &str) -> String {
        format!(" RETURNING {}.{}", self.quote(table), self.quote(column))
    }
}

/// MySQL and MariaDB.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn bind_var(&self, _index: usize) -> String {
        "?".into()
    }

    fn quote(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "``"))
    }

    fn data_type_of(&self, field: &FieldDescriptor) -> String {
        if let Some(sql_type) = &field.sql_type {
            return sql_type.clone();
        }
        let auto = if field.auto_increment { " AUTO_INCREMENT" } else { "" };
        match field.kind {
            StorageKind::Bool => "boolean".into(),
            StorageKind::Int => format!("int{}", auto),
            StorageKind::BigInt => format!("bigint{}", auto),
            StorageKind::Float => "double".into(),
            StorageKind::Text if field.size.is_none() && (field.is_primary_key || field.unique) => {
                "varchar(255)".into()
            }
            StorageKind::Text => text_type(field, "longtext", |n| format!("varchar({})", n)),
            StorageKind::Bytes => "longblob".into(),
            StorageKind::Timestamp => "DATETIME".into(),
            StorageKind::Json => "json".into(),
            StorageKind::Uuid => "char(36)".into(),
        }
    }

    fn has_table(&self, exec: &dyn Executor, table: &str) -> QueryResult<bool> {
        count_is_positive(
            exec,
            "SELECT count(*) FROM INFORMATION_SCHEMA.TABLES WHERE table_schema = DATABASE() \
             AND table_name = ?",
            &[table.into()],
        )
    }

    fn has_column(&self, exec: &dyn Executor, table: &str, column: &str) -> QueryResult<bool> {
        count_is_positive(
            exec,
            "SELECT count(*) FROM INFORMATION_SCHEMA.COLUMNS WHERE table_schema = DATABASE() \
             AND table_name = ? AND column_name = ?",
            &[table.into(), column.into()],
        )
    }

    fn limit_and_offset_sql(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(limit), Some(offset)) => format!(" LIMIT {} OFFSET {}", limit, offset),
            (Some(limit), None) => format!(" LIMIT {}", limit),
            (None, Some(offset)) => format!(" LIMIT 18446744073709551615 OFFSET {}", offset),
            (None, None) => String::new(),
        }
    }

    fn select_from_dummy_table(&self) -> &'static str {
        "FROM DUAL"
    }

    fn default_values(&self) -> &'static str {
        "VALUES()"
    }
}

/// Microsoft SQL Server.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsSql;

impl Dialect for MsSql {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn bind_var(&self, index: usize) -> String {
        format!("@p{}", index)
    }

    fn quote(&self, identifier: &str) -> String {
        format!("[{}]", identifier.replace(']', "]]"))
    }

    fn data_type_of(&self, field: &FieldDescriptor) -> String {
        if let Some(sql_type) = &field.sql_type {
            return sql_type.clone();
        }
        let identity = if field.auto_increment { " IDENTITY(1,1)" } else { "" };
        match field.kind {
            StorageKind::Bool => "bit".into(),
            StorageKind::Int => format!("int{}", identity),
            StorageKind::BigInt => format!("bigint{}", identity),
            StorageKind::Float => "float".into(),
            StorageKind::Text => text_type(field, "nvarchar(max)", |n| {
                if n <= 4000 {
                    format!("nvarchar({})", n)
                } else {
                    "nvarchar(max)".into()
                }
            }),
            StorageKind::Bytes => "varbinary(max)".into(),
            StorageKind::Timestamp => "datetimeoffset".into(),
            StorageKind::Json => "nvarchar(max)".into(),
            StorageKind::Uuid => "uniqueidentifier".into(),
        }
    }

    fn has_table(&self, exec: &dyn Executor, table: &str) -> QueryResult<bool> {
        count_is_positive(
            exec,
            "SELECT count(*) FROM INFORMATION_SCHEMA.tables WHERE table_name = @p1 \
             AND table_catalog = DB_NAME()",
            &[table.into()],
        )
    }

    fn has_column(&self, exec: &dyn Executor, table: &str, column: &str) -> QueryResult<bool> {
        count_is_positive(
            exec,
            "SELECT count(*) FROM INFORMATION_SCHEMA.columns WHERE table_catalog = DB_NAME() \
             AND table_name = @p1 AND column_name = @p2",
            &[table.into(), column.into()],
        )
    }

    fn limit_and_offset_sql(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        if limit.is_none() && offset.is_none() {
            return String::new();
        }
        let mut sql = format!(" OFFSET {} ROWS", offset.unwrap_or(0));
        if let Some(limit) = limit {
            sql.push_str(&format!(" FETCH NEXT {} ROWS ONLY", limit));
        }
        sql
    }

    fn last_insert_id_output_interstitial(&self, _table: &str, column: &str) -> String {
        format!("OUTPUT INSERTED.{}", self.quote(column))
    }
}

/// SQLite.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn bind_var(&self, _index: usize) -> String {
        "?".into()
    }

    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    fn data_type_of(&self, field: &FieldDescriptor) -> String {
        if let Some(sql_type) = &field.sql_type {
            return sql_type.clone();
        }
        match field.kind {
            StorageKind::Bool => "bool".into(),
            StorageKind::Int | StorageKind::BigInt if field.auto_increment => {
                "integer primary key autoincrement".into()
            }
            StorageKind::Int => "integer".into(),
            StorageKind::BigInt => "bigint".into(),
            StorageKind::Float => "real".into(),
            StorageKind::Text => text_type(field, "text", |n| format!("varchar({})", n)),
            StorageKind::Bytes => "blob".into(),
            StorageKind::Timestamp => "datetime".into(),
            StorageKind::Json => "text".into(),
            StorageKind::Uuid => "varchar(36)".into(),
        }
    }

    fn has_table(&self, exec: &dyn Executor, table: &str) -> QueryResult<bool> {
        count_is_positive(
            exec,
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            &[table.into()],
        )
    }

    fn has_column(&self, exec: &dyn Executor, table: &str, column: &str) -> QueryResult<bool> {
        count_is_positive(
            exec,
            "SELECT count(*) FROM pragma_table_info(?) WHERE name = ?",
            &[table.into(), column.into()],
        )
    }

    fn limit_and_offset_sql(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(limit), Some(offset)) => format!(" LIMIT {} OFFSET {}", limit, offset),
            (Some(limit), None) => format!(" LIMIT {}", limit),
            (None, Some(offset)) => format!(" LIMIT -1 OFFSET {}", offset),
            (None, None) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(kind: StorageKind) -> FieldDescriptor {
        FieldDescriptor {
            path: "f".into(),
            column: "f".into(),
            kind,
            nullable: false,
            is_primary_key: false,
            auto_increment: false,
            not_null: false,
            unique: false,
            default: None,
            size: None,
            sql_type: None,
            soft_delete: false,
            generate: None,
        }
    }

    #[test]
    fn test_by_name() {
        assert_eq!(by_name("postgresql").unwrap().name(), "postgres");
        assert_eq!(by_name("sqlite3").unwrap().name(), "sqlite");
        assert_eq!(by_name("SqlServer").unwrap().name(), "mssql");
        let err = by_name("oracle").unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_bind_vars_and_quoting() {
        assert_eq!(Postgres.bind_var(3), "$3");
        assert_eq!(MsSql.bind_var(2), "@p2");
        assert_eq!(MySql.bind_var(9), "?");
        assert_eq!(MySql.quote("order"), "`order`");
        assert_eq!(Sqlite.quote_path("users.id"), "\"users\".\"id\"");
        assert_eq!(Postgres.quote_path("users.*"), "\"users\".*");
    }

    #[test]
    fn test_data_types() {
        let mut id = field(StorageKind::BigInt);
        id.auto_increment = true;
        assert_eq!(Postgres.data_type_of(&id), "bigserial");
        assert_eq!(Sqlite.data_type_of(&id), "integer primary key autoincrement");
        assert_eq!(MySql.data_type_of(&id), "bigint AUTO_INCREMENT");

        let mut name = field(StorageKind::Text);
        assert_eq!(Postgres.data_type_of(&name), "text");
        name.size = Some(64);
        assert_eq!(MySql.data_type_of(&name), "varchar(64)");

        name.sql_type = Some("citext".into());
        assert_eq!(Postgres.data_type_of(&name), "citext");
    }

    #[test]
    fn test_limit_offset() {
        assert_eq!(Sqlite.limit_and_offset_sql(None, Some(5)), " LIMIT -1 OFFSET 5");
        assert_eq!(Postgres.limit_and_offset_sql(Some(3), None), " LIMIT 3");
        assert_eq!(
            MsSql.limit_and_offset_sql(Some(3), None),
            " OFFSET 0 ROWS FETCH NEXT 3 ROWS ONLY"
        );
    }
}
