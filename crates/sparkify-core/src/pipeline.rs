//! Sequential driver for the statement lists.
//!
//! Statements run strictly one after another on a single connection. Nothing
//! is retried and nothing already committed is rolled back; the first failure
//! stops the run and is returned tagged with its phase and statement.

use std::time::Instant;

use tracing::{debug, info};

use crate::error::EtlError;
use crate::schema;
use crate::staging::{self, StagingSources};
use crate::statement::{Phase, Statement};
use crate::transform;
use crate::warehouse::Warehouse;

/// When the pipeline commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitPolicy {
    /// After every statement. A later failure leaves earlier statements in
    /// place.
    #[default]
    PerStatement,
    /// Once at the end of each phase. A failure discards the whole phase when
    /// the connection is closed.
    PerPhase,
}

impl CommitPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "statement" | "per_statement" | "per-statement" => Some(Self::PerStatement),
            "phase" | "per_phase" | "per-phase" => Some(Self::PerPhase),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub statements: usize,
    pub rows: u64,
}

/// Run `statements` in order, committing according to `policy`.
pub async fn execute_phase<W: Warehouse + ?Sized>(
    warehouse: &mut W,
    phase: Phase,
    statements: &[Statement],
    policy: CommitPolicy,
) -> Result<PhaseReport, EtlError> {
    let started = Instant::now();
    let mut rows = 0;

    for statement in statements {
        let t0 = Instant::now();
        debug!(phase = %phase, statement = %statement.name, "Executing statement");
        let affected = warehouse
            .execute(statement)
            .await
            .map_err(|source| EtlError::Statement {
                phase,
                statement: statement.name.clone(),
                source,
            })?;

        if policy == CommitPolicy::PerStatement {
            commit(warehouse, phase, &statement.name).await?;
        }

        rows += affected;
        info!(
            phase = %phase,
            statement = %statement.name,
            rows = affected,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Statement complete"
        );
    }

    if policy == CommitPolicy::PerPhase {
        if let Some(last) = statements.last() {
            commit(warehouse, phase, &last.name).await?;
        }
    }

    info!(
        phase = %phase,
        statements = statements.len(),
        rows,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Phase complete"
    );
    Ok(PhaseReport {
        phase,
        statements: statements.len(),
        rows,
    })
}

async fn commit<W: Warehouse + ?Sized>(
    warehouse: &mut W,
    phase: Phase,
    statement: &str,
) -> Result<(), EtlError> {
    warehouse
        .commit()
        .await
        .map_err(|source| EtlError::Commit {
            phase,
            statement: statement.to_string(),
            source,
        })
}

/// Schema Manager: drop all seven tables, then create them.
pub async fn create_tables<W: Warehouse + ?Sized>(
    warehouse: &mut W,
    policy: CommitPolicy,
) -> Result<PhaseReport, EtlError> {
    let statements = schema::reset_statements(warehouse.dialect());
    execute_phase(warehouse, Phase::Schema, &statements, policy).await
}

/// Reset both staging tables and bulk-load them.
pub async fn load_staging_tables<W: Warehouse + ?Sized>(
    warehouse: &mut W,
    sources: &StagingSources,
    policy: CommitPolicy,
) -> Result<PhaseReport, EtlError> {
    let statements = staging::load_statements(warehouse.dialect(), sources);
    execute_phase(warehouse, Phase::Staging, &statements, policy).await
}

/// Run the five transform inserts.
pub async fn insert_tables<W: Warehouse + ?Sized>(
    warehouse: &mut W,
    policy: CommitPolicy,
) -> Result<PhaseReport, EtlError> {
    let statements = transform::insert_statements(warehouse.dialect());
    execute_phase(warehouse, Phase::Transform, &statements, policy).await
}

/// Staging load followed by the transform inserts.
pub async fn run_etl<W: Warehouse + ?Sized>(
    warehouse: &mut W,
    sources: &StagingSources,
    policy: CommitPolicy,
) -> Result<Vec<PhaseReport>, EtlError> {
    let staging = load_staging_tables(warehouse, sources, policy).await?;
    let transform = insert_tables(warehouse, policy).await?;
    Ok(vec![staging, transform])
}
