use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::pipeline::CommitPolicy;
use crate::staging::{StagingSources, DEFAULT_REGION};

pub const DEFAULT_CONFIG_PATH: &str = "dwh.cfg";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub warehouse: WarehouseConfig,
    pub staging: StagingSources,
    pub commit_policy: CommitPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WarehouseConfig {
    Redshift(ClusterConfig),
    DuckDb(DuckDbConfig),
}

/// Connection settings from `[CLUSTER]`.
#[derive(Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    pub host: String,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub db_port: u16,
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("host", &self.host)
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("db_password", &"<redacted>")
            .field("db_port", &self.db_port)
            .finish()
    }
}

/// Settings from `[DUCKDB]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuckDbConfig {
    /// Database file, or `:memory:`.
    pub path: String,
    /// Local directory standing in for the object store.
    pub data_root: PathBuf,
}

impl Config {
    /// Read and parse the configuration file at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::parse(text)?;

        let backend = ini
            .get("WAREHOUSE", "BACKEND")
            .unwrap_or("redshift")
            .to_ascii_lowercase();
        let warehouse = match backend.as_str() {
            "redshift" => WarehouseConfig::Redshift(ClusterConfig {
                host: ini.require("CLUSTER", "HOST")?.to_string(),
                db_name: ini.require("CLUSTER", "DB_NAME")?.to_string(),
                db_user: ini.require("CLUSTER", "DB_USER")?.to_string(),
                db_password: ini.require("CLUSTER", "DB_PASSWORD")?.to_string(),
                db_port: {
                    let raw = ini.require("CLUSTER", "DB_PORT")?;
                    raw.parse().map_err(|e| ConfigError::InvalidValue {
                        section: "CLUSTER".to_string(),
                        key: "DB_PORT".to_string(),
                        reason: format!("`{raw}` is not a port number: {e}"),
                    })?
                },
            }),
            "duckdb" => WarehouseConfig::DuckDb(DuckDbConfig {
                path: ini.require("DUCKDB", "PATH")?.to_string(),
                data_root: PathBuf::from(ini.get("DUCKDB", "DATA_ROOT").unwrap_or(".")),
            }),
            other => {
                return Err(ConfigError::InvalidValue {
                    section: "WAREHOUSE".to_string(),
                    key: "BACKEND".to_string(),
                    reason: format!("unknown backend `{other}`, expected redshift or duckdb"),
                })
            }
        };

        let commit_policy = match ini.get("WAREHOUSE", "COMMIT") {
            None => CommitPolicy::default(),
            Some(raw) => CommitPolicy::parse(raw).ok_or_else(|| ConfigError::InvalidValue {
                section: "WAREHOUSE".to_string(),
                key: "COMMIT".to_string(),
                reason: format!("unknown commit policy `{raw}`, expected statement or phase"),
            })?,
        };

        let staging = StagingSources {
            log_data: ini.require("S3", "LOG_DATA")?.to_string(),
            log_jsonpath: ini.require("S3", "LOG_JSONPATH")?.to_string(),
            song_data: ini.require("S3", "SONG_DATA")?.to_string(),
            iam_role: ini.require("IAM_ROLE", "ARN")?.to_string(),
            region: ini
                .get("S3", "REGION")
                .unwrap_or(DEFAULT_REGION)
                .to_string(),
        };

        Ok(Self {
            warehouse,
            staging,
            commit_policy,
        })
    }
}

/// Minimal INI reader: `[section]` headers, `key = value` or `key: value`
/// pairs, `;`/`#` comments. Section and key lookups are case-insensitive.
/// Surrounding quotes are stripped from values.
#[derive(Debug, Default)]
struct Ini {
    sections: HashMap<String, HashMap<String, String>>,
}

impl Ini {
    fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut ini = Ini::default();
        let mut current: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest.strip_suffix(']').ok_or_else(|| ConfigError::Syntax {
                    line: idx + 1,
                    content: raw.to_string(),
                })?;
                let name = name.trim().to_ascii_uppercase();
                ini.sections.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }

            let split_at = line.find(['=', ':']).ok_or_else(|| ConfigError::Syntax {
                line: idx + 1,
                content: raw.to_string(),
            })?;
            let key = line[..split_at].trim().to_ascii_uppercase();
            let value = unquote(line[split_at + 1..].trim());
            if key.is_empty() {
                return Err(ConfigError::Syntax {
                    line: idx + 1,
                    content: raw.to_string(),
                });
            }

            let Some(section) = current.as_ref() else {
                return Err(ConfigError::KeyOutsideSection { line: idx + 1, key });
            };
            ini.sections
                .entry(section.clone())
                .or_default()
                .insert(key, value.to_string());
        }

        Ok(ini)
    }

    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(&section.to_ascii_uppercase())?
            .get(&key.to_ascii_uppercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn require(&self, section: &str, key: &str) -> Result<&str, ConfigError> {
        if !self.sections.contains_key(&section.to_ascii_uppercase()) {
            return Err(ConfigError::MissingSection(section.to_string()));
        }
        self.get(section, key).ok_or_else(|| ConfigError::MissingKey {
            section: section.to_string(),
            key: key.to_string(),
        })
    }
}

/// Drop a `;` or `#` comment. Inline comments must follow whitespace so
/// values such as `s3://bucket/a#b` survive.
fn strip_comment(line: &str) -> &str {
    let trimmed = line.trim_start();
    if trimmed.starts_with(';') || trimmed.starts_with('#') {
        return "";
    }
    let bytes = line.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if (*b == b';' || *b == b'#') && i > 0 && bytes[i - 1].is_ascii_whitespace() {
            return &line[..i];
        }
    }
    line
}

fn unquote(value: &str) -> &str {
    for quote in ['\'', '"'] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
