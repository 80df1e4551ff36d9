//! Table definitions and the Schema Manager statement lists.
//!
//! Every table is described once as a [`TableDef`] and rendered per
//! [`Dialect`]. Redshift gets the full declaration: key constraints (which
//! Redshift records but never enforces) and the distribution/sort layout.
//! DuckDB enforces key constraints, and the fact table is loaded before its
//! dimensions, so its rendering keeps only columns and `NOT NULL`.

use crate::statement::{Dialect, Phase, Statement};
use ColumnType::{BigInt, DoublePrecision, Integer, Timestamp, Varchar};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// `VARCHAR` with an optional declared length.
    Varchar(Option<u16>),
    Integer,
    BigInt,
    DoublePrecision,
    Timestamp,
}

impl ColumnType {
    pub fn render(&self, dialect: Dialect) -> String {
        match (self, dialect) {
            (ColumnType::Varchar(None), _) => "VARCHAR".to_string(),
            (ColumnType::Varchar(Some(len)), _) => format!("VARCHAR({len})"),
            (ColumnType::Integer, _) => "INTEGER".to_string(),
            (ColumnType::BigInt, _) => "BIGINT".to_string(),
            (ColumnType::DoublePrecision, Dialect::Redshift) => "DOUBLE PRECISION".to_string(),
            (ColumnType::DoublePrecision, Dialect::DuckDb) => "DOUBLE".to_string(),
            (ColumnType::Timestamp, _) => "TIMESTAMP".to_string(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Integer | ColumnType::BigInt | ColumnType::DoublePrecision
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub not_null: bool,
}

const fn col(name: &'static str, ty: ColumnType) -> ColumnDef {
    ColumnDef {
        name,
        ty,
        not_null: false,
    }
}

const fn req(name: &'static str, ty: ColumnType) -> ColumnDef {
    ColumnDef {
        name,
        ty,
        not_null: true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub table: &'static str,
    pub references: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    pub primary_key: &'static [&'static str],
    pub foreign_keys: &'static [ForeignKey],
    /// Redshift distribution and sort clauses, one per line.
    pub layout: &'static [&'static str],
}

impl TableDef {
    /// Identifier to use in SQL. `time` is a type keyword in both dialects,
    /// so it is always quoted.
    pub fn ident(&self) -> String {
        quote_ident(self.name)
    }

    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.ident())
    }

    pub fn create_sql(&self, dialect: Dialect) -> String {
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut line = format!("  {:<18} {}", c.name, c.ty.render(dialect));
                if c.not_null {
                    line.push_str(" NOT NULL");
                }
                line
            })
            .collect();

        if dialect == Dialect::Redshift {
            if !self.primary_key.is_empty() {
                lines.push(format!("  PRIMARY KEY({})", self.primary_key.join(", ")));
            }
            for fk in self.foreign_keys {
                lines.push(format!(
                    "  FOREIGN KEY({}) REFERENCES {}({})",
                    fk.column,
                    quote_ident(fk.table),
                    fk.references
                ));
            }
        }

        let mut sql = format!("CREATE TABLE {} (\n{}\n)", self.ident(), lines.join(",\n"));
        if dialect == Dialect::Redshift {
            for clause in self.layout {
                sql.push('\n');
                sql.push_str(clause);
            }
        }
        sql
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

pub fn quote_ident(name: &str) -> String {
    match name {
        "time" | "user" => format!("\"{name}\""),
        _ => name.to_string(),
    }
}

pub static STAGING_EVENTS: TableDef = TableDef {
    name: "staging_events",
    columns: &[
        col("artist", Varchar(None)),
        col("auth", Varchar(None)),
        col("firstName", Varchar(None)),
        col("gender", Varchar(None)),
        col("itemInSession", Integer),
        col("lastName", Varchar(None)),
        col("length", DoublePrecision),
        col("level", Varchar(None)),
        col("location", Varchar(None)),
        col("method", Varchar(None)),
        col("page", Varchar(None)),
        col("registration", DoublePrecision),
        col("sessionId", Integer),
        col("song", Varchar(None)),
        col("status", Integer),
        col("ts", BigInt),
        col("userAgent", Varchar(None)),
        col("userId", Integer),
    ],
    primary_key: &[],
    foreign_keys: &[],
    layout: &[],
};

pub static STAGING_SONGS: TableDef = TableDef {
    name: "staging_songs",
    columns: &[
        col("song_id", Varchar(None)),
        col("num_songs", Integer),
        col("title", Varchar(Some(255))),
        col("artist_name", Varchar(Some(255))),
        col("artist_latitude", DoublePrecision),
        col("year", Integer),
        col("duration", DoublePrecision),
        col("artist_id", Varchar(None)),
        col("artist_longitude", DoublePrecision),
        col("artist_location", Varchar(Some(255))),
    ],
    primary_key: &[],
    foreign_keys: &[],
    layout: &[],
};

pub static SONGPLAYS: TableDef = TableDef {
    name: "songplays",
    columns: &[
        req("start_time", Timestamp),
        req("user_id", Integer),
        col("level", Varchar(None)),
        col("song_id", Varchar(None)),
        col("artist_id", Varchar(None)),
        col("session_id", Integer),
        col("location", Varchar(None)),
        col("user_agent", Varchar(None)),
    ],
    primary_key: &["start_time"],
    foreign_keys: &[
        ForeignKey {
            column: "artist_id",
            table: "artists",
            references: "artist_id",
        },
        ForeignKey {
            column: "song_id",
            table: "songs",
            references: "song_id",
        },
        ForeignKey {
            column: "user_id",
            table: "users",
            references: "user_id",
        },
        ForeignKey {
            column: "start_time",
            table: "time",
            references: "start_time",
        },
    ],
    layout: &["DISTSTYLE EVEN", "COMPOUND SORTKEY (start_time, user_id)"],
};

pub static USERS: TableDef = TableDef {
    name: "users",
    columns: &[
        req("user_id", Integer),
        req("first_name", Varchar(None)),
        req("last_name", Varchar(None)),
        col("gender", Varchar(None)),
        req("level", Varchar(None)),
    ],
    primary_key: &["user_id"],
    foreign_keys: &[],
    layout: &["DISTKEY (user_id)", "SORTKEY (user_id)"],
};

pub static SONGS: TableDef = TableDef {
    name: "songs",
    columns: &[
        req("song_id", Varchar(None)),
        req("title", Varchar(None)),
        req("artist_id", Varchar(None)),
        col("year", Integer),
        col("duration", DoublePrecision),
    ],
    primary_key: &["song_id"],
    foreign_keys: &[ForeignKey {
        column: "artist_id",
        table: "artists",
        references: "artist_id",
    }],
    layout: &["DISTKEY (song_id)", "SORTKEY (song_id)"],
};

pub static ARTISTS: TableDef = TableDef {
    name: "artists",
    columns: &[
        req("artist_id", Varchar(None)),
        req("name", Varchar(None)),
        col("location", Varchar(None)),
        col("latitude", DoublePrecision),
        col("longitude", DoublePrecision),
    ],
    primary_key: &["artist_id"],
    foreign_keys: &[],
    layout: &["DISTKEY (artist_id)", "SORTKEY (artist_id)"],
};

pub static TIME: TableDef = TableDef {
    name: "time",
    columns: &[
        req("start_time", Timestamp),
        req("hour", Integer),
        req("day", Integer),
        req("week", Integer),
        req("month", Integer),
        req("year", Integer),
        req("weekday", Integer),
    ],
    primary_key: &["start_time"],
    foreign_keys: &[],
    layout: &["DISTKEY (start_time)", "SORTKEY (start_time)"],
};

/// Drop order: staging first, then the fact table, then dimensions.
pub static DROP_ORDER: [&TableDef; 7] = [
    &STAGING_EVENTS,
    &STAGING_SONGS,
    &SONGPLAYS,
    &USERS,
    &SONGS,
    &ARTISTS,
    &TIME,
];

/// Create order: staging, dimensions, and the fact table last since it
/// references every dimension.
pub static CREATE_ORDER: [&TableDef; 7] = [
    &STAGING_EVENTS,
    &STAGING_SONGS,
    &USERS,
    &ARTISTS,
    &SONGS,
    &TIME,
    &SONGPLAYS,
];

pub fn drop_table_statements() -> Vec<Statement> {
    DROP_ORDER
        .iter()
        .map(|t| Statement::sql(Phase::Schema, format!("drop {}", t.name), t.drop_sql()))
        .collect()
}

pub fn create_table_statements(dialect: Dialect) -> Vec<Statement> {
    CREATE_ORDER
        .iter()
        .map(|t| {
            Statement::sql(
                Phase::Schema,
                format!("create {}", t.name),
                t.create_sql(dialect),
            )
        })
        .collect()
}

/// Full schema reset: every drop, then every create.
pub fn reset_statements(dialect: Dialect) -> Vec<Statement> {
    let mut statements = drop_table_statements();
    statements.extend(create_table_statements(dialect));
    statements
}
