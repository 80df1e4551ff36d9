use std::borrow::Cow;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Executor};
use tracing::{debug, info};

use sparkify_core::config::ClusterConfig;
use sparkify_core::statement::{Dialect, Statement, StatementBody};
use sparkify_core::warehouse::Warehouse;

/// Amazon Redshift over the Postgres wire protocol.
///
/// One connection for the whole run, no pool. Statements go through the
/// simple query protocol (`sqlx::raw_sql`) since `COPY ... IAM_ROLE` and the
/// DDL carry no bind parameters. The first statement after a commit sends
/// `BEGIN`; `commit` sends `COMMIT`; `close` rolls back anything pending.
pub struct RedshiftWarehouse {
    conn: Option<PgConnection>,
    in_transaction: bool,
}

impl RedshiftWarehouse {
    pub async fn connect(cluster: &ClusterConfig) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&cluster.host)
            .port(cluster.db_port)
            .username(&cluster.db_user)
            .password(&cluster.db_password)
            .database(&cluster.db_name);

        let conn = PgConnection::connect_with(&options)
            .await
            .with_context(|| {
                format!(
                    "connecting to Redshift at {}:{}/{}",
                    cluster.host, cluster.db_port, cluster.db_name
                )
            })?;
        info!(
            host = %cluster.host,
            port = cluster.db_port,
            database = %cluster.db_name,
            "Connected to Redshift"
        );
        Ok(Self {
            conn: Some(conn),
            in_transaction: false,
        })
    }
}

/// SQL text sent for `statement`: plain SQL as-is, bulk loads as `COPY`.
pub fn render(statement: &Statement) -> Cow<'_, str> {
    match &statement.body {
        StatementBody::Sql(sql) => Cow::Borrowed(sql.as_str()),
        StatementBody::BulkLoad(load) => Cow::Owned(load.to_redshift_sql()),
    }
}

#[async_trait]
impl Warehouse for RedshiftWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Redshift
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        let conn = self
            .conn
            .as_mut()
            .context("Redshift connection already closed")?;

        if !self.in_transaction {
            conn.execute(sqlx::raw_sql("BEGIN")).await?;
            self.in_transaction = true;
        }

        let sql = render(statement);
        let result = conn.execute(sqlx::raw_sql(&sql)).await?;
        Ok(result.rows_affected())
    }

    async fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        let conn = self
            .conn
            .as_mut()
            .context("Redshift connection already closed")?;
        conn.execute(sqlx::raw_sql("COMMIT")).await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        if self.in_transaction {
            conn.execute(sqlx::raw_sql("ROLLBACK")).await?;
            self.in_transaction = false;
            debug!("Discarded uncommitted work on close");
        }
        conn.close().await?;
        info!("Redshift connection closed");
        Ok(())
    }
}
