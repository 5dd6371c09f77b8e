//! Purpose: `pokedexer` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit JSON on stdout, pretty-printed when stdout is a terminal.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: All party mutations go through the create/edit and details view-models.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::future::Future;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use pokedexer::api::{
    Catalog, Client, Config, CreatePartyViewModel, Error, ErrorKind, MAX_PARTY_SIZE, PartiesUiState, Party,
    PartyDetailsUiState, PartyId, Pokemon, PokemonId, SaveOutcome, filter_by_name, to_exit_code,
};
use pokedexer::catalog::parse_entries;
use pokedexer::config::{DEFAULT_LOG_FILTER, LOG_ENV};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint(clap_error_hint(&err)));
            }
        },
    };

    init_tracing();
    let config = Config::resolve(cli.dir);

    command_dispatch::dispatch_command(cli.command, config).map_err(add_kind_hint)
}

#[derive(Parser)]
#[command(
    name = "pokedexer",
    version,
    about = "Build and keep Pokemon parties in a local database",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"A party is a named, ordered group of up to 6 catalog entries.
The bundled Generation I catalog is seeded on first use."#,
    after_help = r#"EXAMPLES
  $ pokedexer catalog list --search char
  $ pokedexer party create Starters 1 4 7
  $ pokedexer party show 1
  $ pokedexer party watch            # JSON line per change, Ctrl-C to stop

NOTES
  - Default data directory: ~/.pokedexer (override with --dir or POKEDEXER_DIR)
  - Set POKEDEXER_LOG=debug to trace store activity on stderr"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Data directory holding pokedexer.db (default: ~/.pokedexer)",
        value_hint = ValueHint::DirPath
    )]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(arg_required_else_help = true, about = "Browse or extend the catalog")]
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
    #[command(
        arg_required_else_help = true,
        about = "Create, edit, inspect, and delete parties",
        after_help = r#"EXAMPLES
  $ pokedexer party create Starters 1 4 7
  $ pokedexer party update 1 "Fire team" 4 5 6
  $ pokedexer party list
  $ pokedexer party delete 1"#
    )]
    Party {
        #[command(subcommand)]
        command: PartyCommand,
    },
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
    #[command(about = "Print version info")]
    Version,
}

#[derive(Subcommand)]
enum CatalogCommand {
    #[command(about = "List catalog entries, optionally filtered by name")]
    List {
        #[arg(long, help = "Case-insensitive name substring")]
        search: Option<String>,
    },
    #[command(about = "Upsert entries from a JSON array file")]
    Import {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum PartyCommand {
    #[command(about = "Create a party from catalog ids, in order")]
    Create {
        name: String,
        #[arg(required = true, value_name = "POKEMON_ID")]
        pokemon: Vec<i64>,
    },
    #[command(about = "Rename a party and replace its members")]
    Update {
        party_id: i64,
        name: String,
        #[arg(required = true, value_name = "POKEMON_ID")]
        pokemon: Vec<i64>,
    },
    #[command(about = "Delete a party and its members")]
    Delete { party_id: i64 },
    #[command(about = "List every party with its members")]
    List,
    #[command(about = "Show one party")]
    Show { party_id: i64 },
    #[command(about = "Print a JSON line on every change until interrupted")]
    Watch { party_id: Option<i64> },
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn block_on<F>(future: F) -> Result<RunOutcome, Error>
where
    F: Future<Output = Result<RunOutcome, Error>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to start runtime")
                .with_source(err)
        })?;
    runtime.block_on(future)
}

fn live_query_stopped() -> Error {
    Error::new(ErrorKind::Internal).with_message("live query stopped unexpectedly")
}

fn party_not_found(party_id: PartyId) -> Error {
    Error::new(ErrorKind::NotFound)
        .with_message("party not found")
        .with_party_id(party_id.0)
}

fn add_missing_party_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::NotFound || err.party_id().is_none() || err.hint().is_some() {
        return err;
    }
    err.with_hint("Run `pokedexer party list` to see saved parties.")
}

/// Attach a generic next step for failures that carry no hint of their own.
fn add_kind_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    let hint = match err.kind() {
        ErrorKind::Permission => "Check directory permissions or pass a writable --dir.",
        ErrorKind::Busy => "Another process is writing to the database. Retry shortly.",
        ErrorKind::Io => "Check the path, filesystem, and disk space.",
        ErrorKind::Corrupt => {
            "Database appears corrupt or was written by a newer pokedexer. Use another --dir."
        }
        ErrorKind::Internal => "Retry with POKEDEXER_LOG=debug to see store activity.",
        _ => return err,
    };
    err.with_hint(hint)
}

fn io_error_kind(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    }
}

fn read_catalog_file(path: &Path) -> Result<Vec<Pokemon>, Error> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        Error::new(io_error_kind(&err))
            .with_message("failed to read catalog file")
            .with_path(path)
            .with_source(err)
    })?;
    parse_entries(&text).map_err(|err| err.with_path(path))
}

fn pokemon_ids(raw: &[i64]) -> Vec<PokemonId> {
    raw.iter().map(|id| PokemonId(*id)).collect()
}

fn party_json(party: &Party, pokemon: &[Pokemon]) -> Value {
    json!({
        "id": party.id,
        "name": party.name,
        "pokemon": pokemon,
    })
}

fn parties_state_json(state: &PartiesUiState) -> Option<Value> {
    match state {
        PartiesUiState::Loading => None,
        PartiesUiState::Ready(parties) => {
            let parties = parties
                .iter()
                .map(|entry| party_json(&entry.party, &entry.pokemon))
                .collect::<Vec<_>>();
            Some(json!({ "parties": parties }))
        }
    }
}

fn details_state_json(party_id: PartyId, state: &PartyDetailsUiState) -> Option<Value> {
    match state {
        PartyDetailsUiState::Loading => None,
        PartyDetailsUiState::Ready { party, pokemon } => {
            Some(json!({ "party": party_json(party, pokemon) }))
        }
        PartyDetailsUiState::Error => Some(json!({ "party": null, "party_id": party_id })),
    }
}

fn emit_version_output() {
    if io::stdout().is_terminal() {
        println!("pokedexer {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(json!({
            "name": "pokedexer",
            "version": env!("CARGO_PKG_VERSION"),
        }));
    }
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

/// One compact JSON document per line, regardless of terminal.
fn emit_json_line(value: &Value) {
    let json = serde_json::to_string(value)
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
    } else {
        eprintln!("{}", error_json(err));
    }
}

fn error_message(err: &Error) -> String {
    err.message()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?} error", err.kind()).to_lowercase())
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(party_id) = err.party_id() {
        inner.insert("party_id".to_string(), json!(party_id));
    }
    if let Some(cause) = err.source() {
        inner.insert("cause".to_string(), json!(cause.to_string()));
    }
    json!({ "error": inner })
}

fn error_text(err: &Error) -> String {
    let mut text = format!("error: {}", error_message(err));
    if let Some(hint) = err.hint() {
        text.push_str(&format!("\nhint: {hint}"));
    }
    if let Some(path) = err.path() {
        text.push_str(&format!("\npath: {}", path.display()));
    }
    if let Some(cause) = err.source() {
        text.push_str(&format!("\ncaused by: {cause}"));
    }
    text
}

fn clap_error_summary(err: &clap::Error) -> String {
    err.to_string()
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.strip_prefix("error:").unwrap_or(line).trim().to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

/// Point at `--help` for the deepest subcommand named in clap's usage line.
fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let path: Vec<&str> = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: pokedexer"))
        .map(|usage| {
            usage
                .split_whitespace()
                .take_while(|token| !token.starts_with(['-', '<', '[']))
                .collect()
        })
        .unwrap_or_default();
    if path.is_empty() {
        "Try `pokedexer --help`.".to_string()
    } else {
        format!("Try `pokedexer {} --help`.", path.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Cli, add_kind_hint, add_missing_party_hint, details_state_json, error_json, error_text,
        party_not_found,
    };
    use clap::CommandFactory;
    use pokedexer::api::{Error, ErrorKind, Party, PartyDetailsUiState, PartyId};
    use serde_json::json;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn missing_party_error_carries_id_and_hint() {
        let err = add_missing_party_hint(party_not_found(PartyId(9)));
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "NotFound");
        assert_eq!(value["error"]["party_id"], 9);
        assert!(value["error"]["hint"].as_str().is_some());
        assert!(error_text(&err).starts_with("error: party not found"));
    }

    #[test]
    fn failures_without_a_hint_get_one_by_kind() {
        let err = add_kind_hint(Error::new(ErrorKind::Corrupt));
        assert!(err.hint().is_some_and(|hint| hint.contains("corrupt")));
        assert_eq!(error_json(&err)["error"]["message"], "corrupt error");
        assert!(add_kind_hint(Error::new(ErrorKind::Usage)).hint().is_none());
    }

    #[test]
    fn hints_are_not_overwritten() {
        let err = Error::new(ErrorKind::NotFound)
            .with_party_id(1)
            .with_hint("keep me");
        assert_eq!(add_missing_party_hint(err).hint(), Some("keep me"));
    }

    #[test]
    fn details_json_shapes() {
        assert_eq!(details_state_json(PartyId(1), &PartyDetailsUiState::Loading), None);
        assert_eq!(
            details_state_json(PartyId(2), &PartyDetailsUiState::Error),
            Some(json!({ "party": null, "party_id": 2 }))
        );
        let ready = PartyDetailsUiState::Ready {
            party: Party {
                id: PartyId(3),
                name: "Solo".to_string(),
            },
            pokemon: Vec::new(),
        };
        assert_eq!(
            details_state_json(PartyId(3), &ready),
            Some(json!({ "party": { "id": 3, "name": "Solo", "pokemon": [] } }))
        );
    }
}
