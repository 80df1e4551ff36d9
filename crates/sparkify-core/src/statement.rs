use std::fmt;

use crate::staging::BulkLoad;

/// SQL flavour a statement list is rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Amazon Redshift, the production warehouse.
    Redshift,
    /// Embedded DuckDB, used for local runs and tests.
    DuckDb,
}

/// Group a statement belongs to. Errors and logs carry it so a failure can be
/// located without reading the statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Schema,
    Staging,
    Transform,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Schema => "schema",
            Phase::Staging => "staging",
            Phase::Transform => "transform",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementBody {
    /// Plain SQL, executed as-is.
    Sql(String),
    /// A bulk load. Each backend decides how to run it: Redshift renders a
    /// `COPY`, DuckDB reads the local mirror of the object store.
    BulkLoad(BulkLoad),
}

/// One entry of an ordered statement list.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub phase: Phase,
    /// Short identity used in logs and errors, e.g. `create songplays`.
    pub name: String,
    pub body: StatementBody,
}

impl Statement {
    pub fn sql(phase: Phase, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            phase,
            name: name.into(),
            body: StatementBody::Sql(sql.into()),
        }
    }

    pub fn bulk_load(phase: Phase, name: impl Into<String>, load: BulkLoad) -> Self {
        Self {
            phase,
            name: name.into(),
            body: StatementBody::BulkLoad(load),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.phase, self.name)
    }
}

/// Quote `value` as a SQL string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
