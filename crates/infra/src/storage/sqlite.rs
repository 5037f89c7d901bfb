//! SQLite-backed document store (sqlx).
//!
//! Documents live in one table keyed by `(collection, id)`; the JSON body is
//! queried with `json_extract`. Field paths and values are always bound as
//! parameters, never spliced into SQL.
//!
//! ## Matching the reference semantics
//!
//! | Reference rule | SQL rendering |
//! |----------------|---------------|
//! | comparison with missing/null field is false | leaf wrapped in `COALESCE(.., 0)` |
//! | booleans compare as 0/1 | `json_extract` yields integers, bools bound as integers |
//! | null < number < text | SQLite's native cross-type ordering |
//! | text compares bytewise | default `BINARY` collation |
//!
//! Guarded writes run in a `BEGIN IMMEDIATE` transaction: the write lock is
//! taken before the check, so concurrent writers queue instead of racing.

use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};

use worklane_core::entity::fields;
use worklane_core::query::validate_field;
use worklane_core::{EntityId, Predicate, SortDirection, StorageQuery};

use super::{StoragePort, StoreError, conflicting_row, document_id, document_tenant};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id         TEXT NOT NULL,
    tenant_id  TEXT,
    body       TEXT NOT NULL,
    PRIMARY KEY (collection, id)
)
"#;

const CREATE_TENANT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS documents_tenant ON documents (collection, tenant_id)";

/// sqlx/SQLite implementation of [`StoragePort`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| map_sqlx_error("connect", e))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Self::with_pool(pool).await
    }

    /// Private in-memory database. A single pinned connection keeps it alive.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| map_sqlx_error("connect", e))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        for ddl in [CREATE_TABLE, CREATE_TENANT_INDEX] {
            sqlx::query(ddl)
                .execute(&pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(Self { pool })
    }

    async fn exists(
        conn: &mut SqliteConnection,
        collection: &str,
        filter: &Predicate,
    ) -> Result<bool, StoreError> {
        let mut sql = SqlBuilder::new(
            "SELECT EXISTS (SELECT 1 FROM documents WHERE collection = ? AND ",
        );
        sql.bind(Bind::Text(collection.to_string()));
        sql.push_predicate(filter)?;
        sql.push(") AS hit");

        let (text, binds) = sql.finish();
        let row = bind_all(sqlx::query(&text), binds)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("exists", e))?;
        let hit: i64 = row.try_get("hit").map_err(|e| map_sqlx_error("exists", e))?;
        Ok(hit != 0)
    }
}

#[async_trait]
impl StoragePort for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn count(&self, collection: &str, filter: &Predicate) -> Result<u64, StoreError> {
        let mut sql = SqlBuilder::new("SELECT COUNT(*) AS n FROM documents WHERE collection = ?");
        sql.bind(Bind::Text(collection.to_string()));
        sql.push(" AND ");
        sql.push_predicate(filter)?;

        let (text, binds) = sql.finish();
        let row = bind_all(sqlx::query(&text), binds)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count", e))?;
        let n: i64 = row.try_get("n").map_err(|e| map_sqlx_error("count", e))?;
        Ok(n.max(0) as u64)
    }

    async fn find(
        &self,
        collection: &str,
        query: &StorageQuery,
    ) -> Result<Vec<JsonValue>, StoreError> {
        let mut sql = SqlBuilder::new("SELECT body FROM documents WHERE collection = ?");
        sql.bind(Bind::Text(collection.to_string()));
        sql.push(" AND ");
        sql.push_predicate(&query.filter)?;

        for (idx, key) in query.order.iter().enumerate() {
            validate_field(&key.field).map_err(|e| StoreError::InvalidQuery(e.to_string()))?;
            sql.push(if idx == 0 { " ORDER BY " } else { ", " });
            sql.push("json_extract(body, ?)");
            sql.bind(Bind::Text(json_path(&key.field)));
            sql.push(match key.direction {
                SortDirection::Asc => " ASC",
                SortDirection::Desc => " DESC",
            });
        }

        sql.push(" LIMIT ? OFFSET ?");
        sql.bind(Bind::Int(query.take.map(clamp_i64).unwrap_or(-1)));
        sql.bind(Bind::Int(clamp_i64(query.skip)));

        let (text, binds) = sql.finish();
        let rows = bind_all(sqlx::query(&text), binds)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find", e))?;

        rows.into_iter()
            .map(|row| {
                let body: String = row.try_get("body").map_err(|e| map_sqlx_error("find", e))?;
                serde_json::from_str(&body).map_err(|e| StoreError::Backend(e.to_string()))
            })
            .collect()
    }

    async fn insert(&self, collection: &str, doc: JsonValue) -> Result<(), StoreError> {
        let id = document_id(&doc)?;
        let tenant = document_tenant(&doc).map(|t| t.to_string());
        let body = serde_json::to_string(&doc).map_err(|e| StoreError::InvalidDocument(e.to_string()))?;

        sqlx::query("INSERT INTO documents (collection, id, tenant_id, body) VALUES (?, ?, ?, ?)")
            .bind(collection)
            .bind(id.to_string())
            .bind(tenant)
            .bind(body)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict(format!("{collection} row {id} already exists"))
                } else {
                    map_sqlx_error("insert", e)
                }
            })?;
        Ok(())
    }

    async fn replace(&self, collection: &str, doc: JsonValue) -> Result<bool, StoreError> {
        let id = document_id(&doc)?;
        let tenant = document_tenant(&doc).map(|t| t.to_string());
        let body = serde_json::to_string(&doc).map_err(|e| StoreError::InvalidDocument(e.to_string()))?;

        let done = sqlx::query(
            "UPDATE documents SET tenant_id = ?, body = ? WHERE collection = ? AND id = ?",
        )
        .bind(tenant)
        .bind(body)
        .bind(collection)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("replace", e))?;
        Ok(done.rows_affected() > 0)
    }

    async fn insert_unless(
        &self,
        collection: &str,
        doc: JsonValue,
        conflict: &Predicate,
    ) -> Result<(), StoreError> {
        let id = document_id(&doc)?;
        let tenant = document_tenant(&doc).map(|t| t.to_string());
        let body = serde_json::to_string(&doc).map_err(|e| StoreError::InvalidDocument(e.to_string()))?;
        conflict
            .validate()
            .map_err(|e| StoreError::InvalidQuery(e.to_string()))?;

        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| map_sqlx_error("insert", e))?;
        if Self::exists(&mut *tx, collection, conflict).await? {
            return Err(conflicting_row(collection));
        }
        sqlx::query("INSERT INTO documents (collection, id, tenant_id, body) VALUES (?, ?, ?, ?)")
            .bind(collection)
            .bind(id.to_string())
            .bind(tenant)
            .bind(body)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict(format!("{collection} row {id} already exists"))
                } else {
                    map_sqlx_error("insert", e)
                }
            })?;
        tx.commit().await.map_err(|e| map_sqlx_error("insert", e))
    }

    async fn replace_if(
        &self,
        collection: &str,
        doc: JsonValue,
        guard: &Predicate,
        conflict: &Predicate,
    ) -> Result<bool, StoreError> {
        let id = document_id(&doc)?;
        let tenant = document_tenant(&doc).map(|t| t.to_string());
        let body = serde_json::to_string(&doc).map_err(|e| StoreError::InvalidDocument(e.to_string()))?;
        let target = Predicate::eq(fields::ID, id.to_string()).and(guard.clone());

        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| map_sqlx_error("replace", e))?;
        if !Self::exists(&mut *tx, collection, &target).await? {
            return Ok(false);
        }
        if Self::exists(&mut *tx, collection, conflict).await? {
            return Err(conflicting_row(collection));
        }
        sqlx::query("UPDATE documents SET tenant_id = ?, body = ? WHERE collection = ? AND id = ?")
            .bind(tenant)
            .bind(body)
            .bind(collection)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("replace", e))?;
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: EntityId) -> Result<bool, StoreError> {
        let done = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;
        Ok(done.rows_affected() > 0)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Bind {
    Text(String),
    Int(i64),
    Real(f64),
}

impl Bind {
    fn scalar(value: &JsonValue) -> Result<Self, StoreError> {
        match value {
            JsonValue::Bool(b) => Ok(Bind::Int(i64::from(*b))),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Ok(Bind::Int(i)),
                None => Ok(Bind::Real(n.as_f64().unwrap_or(0.0))),
            },
            JsonValue::String(s) => Ok(Bind::Text(s.clone())),
            _ => Err(StoreError::InvalidQuery("comparison value must be a scalar".into())),
        }
    }
}

/// WHERE-clause compiler. Every leaf is two-valued (never SQL NULL).
struct SqlBuilder {
    sql: String,
    binds: Vec<Bind>,
}

impl SqlBuilder {
    fn new(head: &str) -> Self {
        Self {
            sql: head.to_string(),
            binds: Vec::new(),
        }
    }

    fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    fn bind(&mut self, b: Bind) {
        self.binds.push(b);
    }

    fn finish(self) -> (String, Vec<Bind>) {
        (self.sql, self.binds)
    }

    fn push_predicate(&mut self, pred: &Predicate) -> Result<(), StoreError> {
        pred.validate()
            .map_err(|e| StoreError::InvalidQuery(e.to_string()))?;
        self.compile(pred)
    }

    fn compile(&mut self, pred: &Predicate) -> Result<(), StoreError> {
        match pred {
            Predicate::All => self.push("1"),
            Predicate::Eq { field, value } => self.comparison(field, "=", value)?,
            Predicate::Ne { field, value } => self.comparison(field, "<>", value)?,
            Predicate::Gt { field, value } => self.comparison(field, ">", value)?,
            Predicate::Gte { field, value } => self.comparison(field, ">=", value)?,
            Predicate::Lt { field, value } => self.comparison(field, "<", value)?,
            Predicate::Lte { field, value } => self.comparison(field, "<=", value)?,
            Predicate::In { field, values } => {
                if values.is_empty() {
                    self.push("0");
                } else {
                    self.push("COALESCE(json_extract(body, ?) IN (");
                    self.bind(Bind::Text(json_path(field)));
                    for (idx, v) in values.iter().enumerate() {
                        self.push(if idx == 0 { "?" } else { ", ?" });
                        self.bind(Bind::scalar(v)?);
                    }
                    self.push("), 0)");
                }
            }
            Predicate::IsNull { field } => {
                self.push("json_extract(body, ?) IS NULL");
                self.bind(Bind::Text(json_path(field)));
            }
            Predicate::NotNull { field } => {
                self.push("json_extract(body, ?) IS NOT NULL");
                self.bind(Bind::Text(json_path(field)));
            }
            Predicate::And { all } => self.junction(all, " AND ", "1")?,
            Predicate::Or { any } => self.junction(any, " OR ", "0")?,
            Predicate::Not { not } => {
                self.push("(NOT ");
                self.compile(not)?;
                self.push(")");
            }
        }
        Ok(())
    }

    fn comparison(&mut self, field: &str, op: &str, value: &JsonValue) -> Result<(), StoreError> {
        self.push("COALESCE(json_extract(body, ?) ");
        self.push(op);
        self.push(" ?, 0)");
        self.bind(Bind::Text(json_path(field)));
        self.bind(Bind::scalar(value)?);
        Ok(())
    }

    fn junction(&mut self, parts: &[Predicate], sep: &str, empty: &str) -> Result<(), StoreError> {
        if parts.is_empty() {
            self.push(empty);
            return Ok(());
        }
        self.push("(");
        for (idx, p) in parts.iter().enumerate() {
            if idx > 0 {
                self.push(sep);
            }
            self.compile(p)?;
        }
        self.push(")");
        Ok(())
    }
}

fn json_path(field: &str) -> String {
    format!("$.{field}")
}

fn clamp_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    binds: Vec<Bind>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for b in binds {
        query = match b {
            Bind::Text(s) => query.bind(s),
            Bind::Int(i) => query.bind(i),
            Bind::Real(f) => query.bind(f),
        };
    }
    query
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) => {
            StoreError::Backend(format!("database error in {operation}: {}", db.message()))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compiles_nested_predicates_with_bound_paths() {
        let pred = Predicate::eq("tenant_id", "t1").and(Predicate::any(vec![
            Predicate::is_null("organization_id"),
            Predicate::negate(Predicate::gt("rank", 3)),
        ]));
        let mut sql = SqlBuilder::new("");
        sql.push_predicate(&pred).unwrap();
        let (text, binds) = sql.finish();

        assert_eq!(
            text,
            "(COALESCE(json_extract(body, ?) = ?, 0) AND (json_extract(body, ?) IS NULL OR \
             (NOT COALESCE(json_extract(body, ?) > ?, 0))))"
        );
        assert_eq!(
            binds,
            vec![
                Bind::Text("$.tenant_id".into()),
                Bind::Text("t1".into()),
                Bind::Text("$.organization_id".into()),
                Bind::Text("$.rank".into()),
                Bind::Int(3),
            ]
        );
    }

    #[test]
    fn rejects_unsafe_paths_before_building_sql() {
        let mut sql = SqlBuilder::new("");
        let err = sql
            .push_predicate(&Predicate::eq("a') OR 1=1 --", json!(1)))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery(_)));
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let mut sql = SqlBuilder::new("");
        sql.push_predicate(&Predicate::is_in("id", Vec::<String>::new()))
            .unwrap();
        assert_eq!(sql.finish().0, "0");
    }
}
