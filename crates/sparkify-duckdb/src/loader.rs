//! Local execution of bulk loads.
//!
//! Reads newline-delimited JSON from a directory that mirrors the object
//! store and inserts it into a staging table the way a Redshift `COPY ...
//! FORMAT AS JSON` would: the location is a key prefix, columns are fed
//! either by key name (`'auto'`) or positionally through a JSONPaths
//! manifest.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use duckdb::types::Value;
use duckdb::Connection;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::info;

use sparkify_core::schema::{ColumnDef, ColumnType, TableDef};
use sparkify_core::staging::{BulkLoad, JsonFormat};

/// Run `load` against `conn`, returning the number of inserted rows.
pub(crate) fn load(conn: &Connection, data_root: &Path, load: &BulkLoad) -> Result<u64> {
    let source = resolve_location(data_root, &load.source);
    let files = matching_files(&source)?;
    if files.is_empty() {
        bail!("no files match {} ({})", load.source, source.display());
    }

    let extractor = match &load.format {
        JsonFormat::Auto => Extractor::Auto,
        JsonFormat::JsonPaths(manifest) => {
            let path = resolve_location(data_root, manifest);
            let paths = read_manifest(&path)?;
            if paths.len() != load.table.columns.len() {
                bail!(
                    "JSONPaths manifest {} has {} paths but {} has {} columns",
                    manifest,
                    paths.len(),
                    load.table.name,
                    load.table.columns.len()
                );
            }
            Extractor::Paths(paths)
        }
    };

    let placeholders = vec!["?"; load.table.columns.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {} VALUES ({placeholders})",
        load.table.ident()
    ))?;

    let mut rows = 0u64;
    for file in &files {
        let reader = File::open(file)
            .map(BufReader::new)
            .with_context(|| format!("reading {}", file.display()))?;
        for (idx, record) in serde_json::Deserializer::from_reader(reader)
            .into_iter::<JsonValue>()
            .enumerate()
        {
            let record = record
                .with_context(|| format!("{}: record {} is not valid JSON", file.display(), idx + 1))?;
            let values = extractor
                .row(load.table, &record)
                .with_context(|| format!("{}: record {}", file.display(), idx + 1))?;
            stmt.execute(duckdb::params_from_iter(values))?;
            rows += 1;
        }
    }

    info!(
        table = load.table.name,
        files = files.len(),
        rows,
        "Bulk load complete"
    );
    Ok(rows)
}

/// Map an object-store location onto the local mirror.
///
/// `s3://bucket/key` becomes `data_root/bucket/key`; other relative paths are
/// taken relative to `data_root`, absolute paths are used as-is.
pub fn resolve_location(data_root: &Path, location: &str) -> PathBuf {
    if let Some(rest) = location.strip_prefix("s3://") {
        return data_root.join(rest.trim_start_matches('/'));
    }
    let path = Path::new(location);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        data_root.join(path)
    }
}

/// Every regular file whose path, relative to the prefix's parent directory,
/// starts with the prefix's final component. Sorted for a stable load order.
pub fn matching_files(prefix: &Path) -> Result<Vec<PathBuf>> {
    let parent = prefix
        .parent()
        .ok_or_else(|| anyhow!("location {} has no parent directory", prefix.display()))?;
    let stem = prefix
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("location {} has no file name", prefix.display()))?;

    if !parent.is_dir() {
        bail!("directory {} does not exist", parent.display());
    }

    let mut all = Vec::new();
    walk(parent, &mut all)?;

    let mut files: Vec<PathBuf> = all
        .into_iter()
        .filter(|file| {
            file.strip_prefix(parent)
                .ok()
                .map(relative_key)
                .is_some_and(|key| key.starts_with(stem))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

/// Relative path joined with `/`, like an object key.
fn relative_key(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Deserialize)]
struct JsonPathsManifest {
    jsonpaths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

fn read_manifest(path: &Path) -> Result<Vec<Vec<PathSegment>>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading JSONPaths manifest {}", path.display()))?;
    let manifest: JsonPathsManifest = serde_json::from_str(&text)
        .with_context(|| format!("parsing JSONPaths manifest {}", path.display()))?;
    manifest
        .jsonpaths
        .iter()
        .map(|p| parse_json_path(p))
        .collect()
}

/// Parse the JSONPath subset Redshift accepts in a manifest: `$` followed by
/// `['key']`, `["key"]`, `.key` or `[n]` segments.
pub fn parse_json_path(path: &str) -> Result<Vec<PathSegment>> {
    let rest = path
        .trim()
        .strip_prefix('$')
        .ok_or_else(|| anyhow!("JSONPath `{path}` must start with `$`"))?;
    let mut segments = Vec::new();
    let mut rest = rest;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let end = after.find(['.', '[']).unwrap_or(after.len());
            if end == 0 {
                bail!("JSONPath `{path}` has an empty key");
            }
            segments.push(PathSegment::Key(after[..end].to_string()));
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let quote = after.chars().next().filter(|c| *c == '\'' || *c == '"');
            if let Some(q) = quote {
                let body = &after[1..];
                let close = body
                    .find(q)
                    .ok_or_else(|| anyhow!("JSONPath `{path}` has an unterminated key"))?;
                let tail = body[close + 1..]
                    .strip_prefix(']')
                    .ok_or_else(|| anyhow!("JSONPath `{path}` is missing `]`"))?;
                segments.push(PathSegment::Key(body[..close].to_string()));
                rest = tail;
            } else {
                let close = after
                    .find(']')
                    .ok_or_else(|| anyhow!("JSONPath `{path}` is missing `]`"))?;
                let index = after[..close]
                    .trim()
                    .parse()
                    .with_context(|| format!("JSONPath `{path}` has a bad array index"))?;
                segments.push(PathSegment::Index(index));
                rest = &after[close + 1..];
            }
        } else {
            bail!("JSONPath `{path}` has unexpected text `{rest}`");
        }
    }

    if segments.is_empty() {
        bail!("JSONPath `{path}` selects the whole record");
    }
    Ok(segments)
}

enum Extractor {
    Auto,
    Paths(Vec<Vec<PathSegment>>),
}

impl Extractor {
    fn row(&self, table: &TableDef, record: &JsonValue) -> Result<Vec<Value>> {
        if !record.is_object() {
            bail!("expected a JSON object");
        }
        table
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let field = match self {
                    Extractor::Auto => record.get(column.name.to_ascii_lowercase()),
                    Extractor::Paths(paths) => lookup(record, &paths[i]),
                };
                convert(column, field)
            })
            .collect()
    }
}

fn lookup<'a>(record: &'a JsonValue, path: &[PathSegment]) -> Option<&'a JsonValue> {
    path.iter().try_fold(record, |value, segment| match segment {
        PathSegment::Key(key) => value.get(key),
        PathSegment::Index(i) => value.get(*i),
    })
}

/// Coerce one JSON field into the column's type. Missing fields and JSON
/// null load as NULL; numeric columns also accept numeric strings, with the
/// empty string loading as NULL.
fn convert(column: &ColumnDef, field: Option<&JsonValue>) -> Result<Value> {
    let field = match field {
        None | Some(JsonValue::Null) => return Ok(Value::Null),
        Some(v) => v,
    };

    let bad = || {
        anyhow!(
            "column {} ({:?}) cannot hold {}",
            column.name,
            column.ty,
            field
        )
    };

    if column.ty.is_numeric() {
        if let JsonValue::String(s) = field {
            if s.trim().is_empty() {
                return Ok(Value::Null);
            }
        }
    }

    match column.ty {
        ColumnType::Varchar(_) => match field {
            JsonValue::String(s) => Ok(Value::Text(s.clone())),
            JsonValue::Number(n) => Ok(Value::Text(n.to_string())),
            JsonValue::Bool(b) => Ok(Value::Text(b.to_string())),
            _ => Err(bad()),
        },
        ColumnType::Integer => {
            let n = integer(field).ok_or_else(bad)?;
            let n = i32::try_from(n).map_err(|_| bad())?;
            Ok(Value::Int(n))
        }
        ColumnType::BigInt => Ok(Value::BigInt(integer(field).ok_or_else(bad)?)),
        ColumnType::DoublePrecision => {
            let n = match field {
                JsonValue::Number(n) => n.as_f64(),
                JsonValue::String(s) => s.trim().parse().ok(),
                _ => None,
            };
            Ok(Value::Double(n.ok_or_else(bad)?))
        }
        ColumnType::Timestamp => Err(bad()),
    }
}

fn integer(field: &JsonValue) -> Option<i64> {
    match field {
        JsonValue::Number(n) => n.as_i64().or_else(|| {
            // 2^63 is exactly representable; anything at or past it would saturate.
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
