use anyhow::Result;
use tracing::{info, warn};

use sparkify_core::config::{Config, WarehouseConfig};
use sparkify_core::error::EtlError;
use sparkify_core::pipeline::{self, PhaseReport};
use sparkify_core::warehouse::Warehouse;
use sparkify_duckdb::DuckDbWarehouse;
use sparkify_redshift::RedshiftWarehouse;

use crate::cli::Command;

/// Run `command` on an already-open warehouse. Does not close it.
pub async fn run_command<W: Warehouse + ?Sized>(
    warehouse: &mut W,
    command: Command,
    cfg: &Config,
) -> Result<Vec<PhaseReport>, EtlError> {
    let policy = cfg.commit_policy;
    match command {
        Command::CreateTables => Ok(vec![pipeline::create_tables(warehouse, policy).await?]),
        Command::Etl => pipeline::run_etl(warehouse, &cfg.staging, policy).await,
        Command::Run => {
            let mut reports = vec![pipeline::create_tables(warehouse, policy).await?];
            reports.extend(pipeline::run_etl(warehouse, &cfg.staging, policy).await?);
            Ok(reports)
        }
    }
}

/// Run `command` and close the warehouse whatever the outcome. A pipeline
/// error takes precedence over a close error.
pub async fn run_and_close<W: Warehouse + ?Sized>(
    warehouse: &mut W,
    command: Command,
    cfg: &Config,
) -> Result<Vec<PhaseReport>> {
    let result = run_command(warehouse, command, cfg).await;
    let closed = warehouse.close().await;

    match (result, closed) {
        (Ok(reports), Ok(())) => Ok(reports),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), closed) => {
            if let Err(close_err) = closed {
                warn!(error = %close_err, "Failed to close warehouse connection");
            }
            Err(e.into())
        }
    }
}

/// Connect to the configured warehouse and run `command` on it.
pub async fn execute(command: Command, cfg: &Config) -> Result<Vec<PhaseReport>> {
    info!(command = command.as_str(), "Starting");
    let reports = match &cfg.warehouse {
        WarehouseConfig::Redshift(cluster) => {
            let mut warehouse = RedshiftWarehouse::connect(cluster).await?;
            run_and_close(&mut warehouse, command, cfg).await?
        }
        WarehouseConfig::DuckDb(duck) => {
            let mut warehouse = DuckDbWarehouse::open(&duck.path, duck.data_root.clone())?;
            run_and_close(&mut warehouse, command, cfg).await?
        }
    };
    let rows: u64 = reports.iter().map(|r| r.rows).sum();
    info!(
        command = command.as_str(),
        phases = reports.len(),
        rows,
        "Finished"
    );
    Ok(reports)
}
