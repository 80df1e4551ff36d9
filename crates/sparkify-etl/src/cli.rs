use sparkify_core::config::DEFAULT_CONFIG_PATH;

pub const USAGE: &str = "\
Usage: sparkify <COMMAND> [CONFIG]

Commands:
  create-tables   Drop and recreate the staging and star-schema tables
  etl             Load the staging tables and insert into the star schema
  run             create-tables followed by etl on one connection
  help            Print this message

CONFIG defaults to dwh.cfg. Log level is controlled by RUST_LOG.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    CreateTables,
    Etl,
    Run,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::CreateTables => "create-tables",
            Command::Etl => "etl",
            Command::Run => "run",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: Command,
    pub config_path: String,
}

/// Parse the arguments after the program name.
///
/// Returns `Ok(None)` when help was requested (or nothing was given) and
/// `Err` with a message for anything unrecognised.
pub fn parse_args(args: &[String]) -> Result<Option<Invocation>, String> {
    let Some(raw) = args.first() else {
        return Ok(None);
    };
    let command = match raw.as_str() {
        "help" | "-h" | "--help" => return Ok(None),
        "create-tables" | "create_tables" => Command::CreateTables,
        "etl" => Command::Etl,
        "run" => Command::Run,
        other => return Err(format!("unknown command `{other}`")),
    };
    if args.len() > 2 {
        return Err(format!("unexpected argument `{}`", args[2]));
    }
    Ok(Some(Invocation {
        command,
        config_path: args
            .get(1)
            .cloned()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string()),
    }))
}
