use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use duckdb::Connection;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info};

use sparkify_core::statement::{Dialect, Statement, StatementBody};
use sparkify_core::warehouse::Warehouse;

use crate::loader;

/// An embedded DuckDB warehouse.
///
/// Used for local runs against a directory that mirrors the object store, and
/// as the in-memory warehouse in tests. Statements are rendered in
/// [`Dialect::DuckDb`]; bulk loads are executed by [`loader`] instead of SQL.
///
/// Like the production warehouse, work is implicitly transactional: the first
/// statement after a commit issues `BEGIN TRANSACTION`. `close` drops the
/// connection, which releases the database file.
pub struct DuckDbWarehouse {
    conn: Mutex<Option<Connection>>,
    data_root: PathBuf,
    in_transaction: bool,
}

impl DuckDbWarehouse {
    /// Open (or create) a DuckDB database at `path`. `:memory:` opens an
    /// in-memory database.
    ///
    /// `data_root` is the local directory `s3://bucket/key` locations resolve
    /// against.
    pub fn open(path: &str, data_root: impl Into<PathBuf>) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path).with_context(|| format!("opening DuckDB at {path}"))?
        };
        let data_root = data_root.into();
        info!(path, data_root = %data_root.display(), "DuckDB opened");
        Ok(Self::from_connection(conn, data_root))
    }

    /// Open an **in-memory** database. Data is discarded on drop.
    pub fn open_in_memory(data_root: impl Into<PathBuf>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn, data_root.into()))
    }

    fn from_connection(conn: Connection, data_root: PathBuf) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
            data_root,
            in_transaction: false,
        }
    }

    /// Acquire the connection lock for direct queries.
    ///
    /// Intended for integration tests that need to verify stored data.
    pub async fn conn_for_test(&self) -> Result<MappedMutexGuard<'_, Connection>> {
        lock_open(&self.conn).await
    }
}

async fn lock_open(conn: &Mutex<Option<Connection>>) -> Result<MappedMutexGuard<'_, Connection>> {
    MutexGuard::try_map(conn.lock().await, Option::as_mut)
        .map_err(|_| anyhow::anyhow!("DuckDB connection already closed"))
}

#[async_trait]
impl Warehouse for DuckDbWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::DuckDb
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        let conn = lock_open(&self.conn).await?;

        if !self.in_transaction {
            conn.execute_batch("BEGIN TRANSACTION")?;
            self.in_transaction = true;
        }

        match &statement.body {
            StatementBody::Sql(sql) => {
                let rows = conn.execute(sql, [])?;
                Ok(rows as u64)
            }
            StatementBody::BulkLoad(load) => loader::load(&conn, &self.data_root, load),
        }
    }

    async fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        let conn = lock_open(&self.conn).await?;
        conn.execute_batch("COMMIT")?;
        self.in_transaction = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let Some(conn) = self.conn.get_mut().take() else {
            return Ok(());
        };
        if self.in_transaction {
            self.in_transaction = false;
            conn.execute_batch("ROLLBACK")?;
            debug!("Discarded uncommitted work on close");
        }
        conn.close().map_err(|(_, e)| e)?;
        info!("DuckDB connection closed");
        Ok(())
    }
}
