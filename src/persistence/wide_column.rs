//! Wide-column-table store: fields written individually with a conditional
//! keyed update, the way a wide-column database applies per-attribute
//! upserts.
//!
//! Expected table shape:
//!
//! ```sql
//! CREATE TABLE <table> (
//!     key        TEXT PRIMARY KEY,
//!     attributes JSONB NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL
//! );
//! ```

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::Row;

use super::store::{reject_primary_key_shadowing, validate_identifier, Record, Store, StoreError};

pub struct WideColumnStore {
    pool: PgPool,
    table: String,
    primary_key_field: String,
}

impl WideColumnStore {
    pub fn new(
        pool: PgPool,
        table: impl Into<String>,
        primary_key_field: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let table = table.into();
        validate_identifier(&table, "configure")?;
        Ok(Self {
            pool,
            table,
            primary_key_field: primary_key_field.into(),
        })
    }

    fn backend_error(operation: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
        move |e| StoreError::Backend {
            operation,
            message: e.to_string(),
        }
    }
}

/// Build the per-field update statement: a `jsonb_set` per field, applied
/// in one conditional keyed update.
fn update_sql(table: &str, fields: &[&String]) -> String {
    let mut expression = "attributes".to_string();
    for (index, field) in fields.iter().enumerate() {
        expression = format!(
            "jsonb_set({expression}, '{{{field}}}', ${}::jsonb, true)",
            index + 2
        );
    }
    format!("UPDATE {table} SET attributes = {expression}, updated_at = now() WHERE key = $1")
}

#[async_trait]
impl Store for WideColumnStore {
    fn primary_key_field(&self) -> &str {
        &self.primary_key_field
    }

    async fn add(&self, key: &str, value: Record) -> Result<(), StoreError> {
        reject_primary_key_shadowing(&self.primary_key_field, &value)?;
        let sql = format!(
            "INSERT INTO {} (key, attributes, created_at, updated_at) \
             VALUES ($1, $2, now(), now()) ON CONFLICT (key) DO NOTHING",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(key)
            .bind(Value::Object(value))
            .execute(&self.pool)
            .await
            .map_err(Self::backend_error("add"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Record>, StoreError> {
        let sql = format!("SELECT attributes FROM {} WHERE key = $1", self.table);
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::backend_error("get"))?;
        match row {
            Some(row) => {
                let attributes: Value = row
                    .try_get("attributes")
                    .map_err(Self::backend_error("get"))?;
                match attributes {
                    Value::Object(map) => Ok(Some(map)),
                    other => Err(StoreError::Backend {
                        operation: "get",
                        message: format!("stored attributes are not an object: {other}"),
                    }),
                }
            }
            None => Ok(None),
        }
    }

    async fn update(&self, key: &str, partial: Record) -> Result<(), StoreError> {
        reject_primary_key_shadowing(&self.primary_key_field, &partial)?;
        if partial.is_empty() {
            return Ok(());
        }
        let fields: Vec<&String> = partial.keys().collect();
        for field in &fields {
            validate_identifier(field, "update")?;
        }
        let sql = update_sql(&self.table, &fields);
        let mut query = sqlx::query(&sql).bind(key);
        for field in &fields {
            query = query.bind(partial[field.as_str()].clone());
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(Self::backend_error("update"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let sql = format!("DELETE FROM {} WHERE key = $1", self.table);
        let result = sqlx::query(&sql)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(Self::backend_error("delete"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                key: key.to_string(),
            });
        }
        Ok(())
    }
}
