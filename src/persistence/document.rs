//! Document-table store: one JSONB value column, whole-document merge in a
//! single statement.
//!
//! Expected table shape:
//!
//! ```sql
//! CREATE TABLE <table> (
//!     key        TEXT PRIMARY KEY,
//!     document   JSONB NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL
//! );
//! ```

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::Row;

use super::store::{reject_primary_key_shadowing, validate_identifier, Record, Store, StoreError};

#[derive(Debug)]
pub struct DocumentStore {
    pool: PgPool,
    table: String,
    primary_key_field: String,
}

impl DocumentStore {
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

#[async_trait]
impl Store for DocumentStore {
    fn primary_key_field(&self) -> &str {
        &self.primary_key_field
    }

    async fn add(&self, key: &str, value: Record) -> Result<(), StoreError> {
        reject_primary_key_shadowing(&self.primary_key_field, &value)?;
        let sql = format!(
            "INSERT INTO {} (key, document, created_at, updated_at) \
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
        let sql = format!("SELECT document FROM {} WHERE key = $1", self.table);
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::backend_error("get"))?;
        match row {
            Some(row) => {
                let document: Value = row.try_get("document").map_err(Self::backend_error("get"))?;
                match document {
                    Value::Object(map) => Ok(Some(map)),
                    other => Err(StoreError::Backend {
                        operation: "get",
                        message: format!("stored document is not an object: {other}"),
                    }),
                }
            }
            None => Ok(None),
        }
    }

    async fn update(&self, key: &str, partial: Record) -> Result<(), StoreError> {
        reject_primary_key_shadowing(&self.primary_key_field, &partial)?;
        // One statement, so concurrent updates for a key serialize in the
        // database rather than interleaving field-by-field.
        let sql = format!(
            "UPDATE {} SET document = document || $2::jsonb, updated_at = now() WHERE key = $1",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(key)
            .bind(Value::Object(partial))
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
