//! Staging Loader statements.
//!
//! A run resets both staging tables and then bulk-loads them from object
//! storage: events through an explicit JSONPaths manifest, songs through
//! `'auto'` key matching.

use crate::schema::{TableDef, STAGING_EVENTS, STAGING_SONGS};
use crate::statement::{quote_literal, Dialect, Phase, Statement};

pub const DEFAULT_REGION: &str = "us-west-2";

/// Object-storage locations and credentials for the staging loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingSources {
    /// Key prefix holding the event log files.
    pub log_data: String,
    /// JSONPaths manifest mapping event fields to `staging_events` columns.
    pub log_jsonpath: String,
    /// Key prefix holding the song catalog files.
    pub song_data: String,
    pub iam_role: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonFormat {
    /// Match object keys to column names.
    Auto,
    /// Positional field mapping from the manifest at this location.
    JsonPaths(String),
}

/// Newline-delimited JSON ingestion into one table.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkLoad {
    pub table: &'static TableDef,
    pub source: String,
    pub format: JsonFormat,
    pub iam_role: String,
    pub region: String,
}

impl BulkLoad {
    /// Render as a Redshift `COPY`.
    pub fn to_redshift_sql(&self) -> String {
        let format = match &self.format {
            JsonFormat::Auto => "'auto'".to_string(),
            JsonFormat::JsonPaths(manifest) => quote_literal(manifest),
        };
        format!(
            "COPY {}\nFROM {}\nIAM_ROLE {}\nREGION {}\nFORMAT AS JSON {}",
            self.table.ident(),
            quote_literal(&self.source),
            quote_literal(&self.iam_role),
            quote_literal(&self.region),
            format
        )
    }
}

pub fn copy_statements(sources: &StagingSources) -> Vec<Statement> {
    vec![
        Statement::bulk_load(
            Phase::Staging,
            "copy staging_events",
            BulkLoad {
                table: &STAGING_EVENTS,
                source: sources.log_data.clone(),
                format: JsonFormat::JsonPaths(sources.log_jsonpath.clone()),
                iam_role: sources.iam_role.clone(),
                region: sources.region.clone(),
            },
        ),
        Statement::bulk_load(
            Phase::Staging,
            "copy staging_songs",
            BulkLoad {
                table: &STAGING_SONGS,
                source: sources.song_data.clone(),
                format: JsonFormat::Auto,
                iam_role: sources.iam_role.clone(),
                region: sources.region.clone(),
            },
        ),
    ]
}

/// Drop and recreate both staging tables so a rerun never appends to the
/// previous run's rows.
pub fn reset_statements(dialect: Dialect) -> Vec<Statement> {
    [&STAGING_EVENTS, &STAGING_SONGS]
        .iter()
        .flat_map(|t| {
            [
                Statement::sql(Phase::Staging, format!("drop {}", t.name), t.drop_sql()),
                Statement::sql(
                    Phase::Staging,
                    format!("create {}", t.name),
                    t.create_sql(dialect),
                ),
            ]
        })
        .collect()
}

/// Everything the staging phase runs, in order.
pub fn load_statements(dialect: Dialect, sources: &StagingSources) -> Vec<Statement> {
    let mut statements = reset_statements(dialect);
    statements.extend(copy_statements(sources));
    statements
}
