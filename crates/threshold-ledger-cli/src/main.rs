// crates/threshold-ledger-cli/src/main.rs
// ============================================================================
// Module: Threshold Ledger CLI Entry Point
// Description: Command dispatcher for catalog, override, and resolve tasks.
// Purpose: Provide an administrative CLI over the threshold ledger store.
// Dependencies: clap, serde_json, threshold-ledger-config, threshold-ledger-core,
//   threshold-ledger-store-sqlite
// ============================================================================

//! ## Overview
//! The threshold-ledger CLI administers the rule catalog and deal threshold
//! overrides and resolves effective thresholds. All success output is JSON on
//! stdout; errors go to stderr with a non-zero exit code. Inputs are
//! untrusted and size-capped before parsing.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use threshold_ledger_config::ThresholdLedgerConfig;
use threshold_ledger_core::AnalystId;
use threshold_ledger_core::CatalogStore;
use threshold_ledger_core::DealId;
use threshold_ledger_core::EffectiveInterval;
use threshold_ledger_core::OverrideDraft;
use threshold_ledger_core::OverrideId;
use threshold_ledger_core::OverrideStore;
use threshold_ledger_core::Resolver;
use threshold_ledger_core::TestDefinition;
use threshold_ledger_core::TestNumber;
use threshold_ledger_store_sqlite::SqliteLedgerStore;
use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a JSON input file accepted by the CLI.
const MAX_INPUT_BYTES: u64 = 1_048_576;
/// Creator identity recorded when `--created-by` is omitted.
const DEFAULT_CREATED_BY: &str = "cli";
/// ISO-8601 calendar date format accepted on the command line.
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "threshold-ledger", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Rule catalog administration.
    Catalog {
        /// Selected catalog subcommand.
        #[command(subcommand)]
        command: CatalogCommand,
    },
    /// Deal threshold override administration.
    Override {
        /// Selected override subcommand.
        #[command(subcommand)]
        command: OverrideCommand,
    },
    /// Effective threshold resolution.
    Resolve {
        /// Selected resolve subcommand.
        #[command(subcommand)]
        command: ResolveCommand,
    },
}

/// Catalog subcommands.
#[derive(Subcommand, Debug)]
enum CatalogCommand {
    /// Seed or refresh test definitions from a JSON file.
    Seed(CatalogSeedCommand),
    /// List catalog entries.
    List(CatalogListCommand),
}

/// Override subcommands.
#[derive(Subcommand, Debug)]
enum OverrideCommand {
    /// Record one threshold override.
    Set(OverrideSetCommand),
    /// Atomically replace every override for a deal from a JSON file.
    Reseed(OverrideReseedCommand),
    /// List every override for a deal.
    List(OverrideListCommand),
}

/// Resolve subcommands.
#[derive(Subcommand, Debug)]
enum ResolveCommand {
    /// Resolve the threshold in effect for one test.
    Test(ResolveTestCommand),
    /// Resolve the full threshold set applicable to a deal.
    All(ResolveAllCommand),
}

/// Configuration for `catalog seed`.
#[derive(Args, Debug)]
struct CatalogSeedCommand {
    /// Optional config file path (defaults to threshold-ledger.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// JSON file of test definitions (defaults to the configured seed file).
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,
}

/// Configuration for `catalog list`.
#[derive(Args, Debug)]
struct CatalogListCommand {
    /// Optional config file path (defaults to threshold-ledger.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Optional comma-separated test numbers restricting the listing.
    #[arg(long, value_name = "NUMBERS")]
    numbers: Option<String>,
}

/// Configuration for `override set`.
#[derive(Args, Debug)]
struct OverrideSetCommand {
    /// Optional config file path (defaults to threshold-ledger.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Deal identifier the override belongs to.
    #[arg(long, value_name = "DEAL_ID")]
    deal: String,
    /// Test number the override replaces the default for.
    #[arg(long, value_name = "NUMBER")]
    test: u32,
    /// Replacement threshold value (exact decimal).
    #[arg(long, value_name = "DECIMAL")]
    value: String,
    /// Inclusive effective date (ISO-8601).
    #[arg(long, value_name = "DATE")]
    effective: String,
    /// Optional inclusive expiry date; omitted means open-ended.
    #[arg(long, value_name = "DATE")]
    expiry: Option<String>,
    /// Optional free-text provenance note.
    #[arg(long, value_name = "TEXT")]
    note: Option<String>,
    /// Creator identity recorded on the row.
    #[arg(long, value_name = "ID")]
    created_by: Option<String>,
}

/// Configuration for `override reseed`.
#[derive(Args, Debug)]
struct OverrideReseedCommand {
    /// Optional config file path (defaults to threshold-ledger.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Deal identifier whose override set is replaced.
    #[arg(long, value_name = "DEAL_ID")]
    deal: String,
    /// JSON file of override entries.
    #[arg(long, value_name = "PATH")]
    file: PathBuf,
}

/// Configuration for `override list`.
#[derive(Args, Debug)]
struct OverrideListCommand {
    /// Optional config file path (defaults to threshold-ledger.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Deal identifier to list overrides for.
    #[arg(long, value_name = "DEAL_ID")]
    deal: String,
}

/// Configuration for `resolve test`.
#[derive(Args, Debug)]
struct ResolveTestCommand {
    /// Optional config file path (defaults to threshold-ledger.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Deal identifier to resolve for.
    #[arg(long, value_name = "DEAL_ID")]
    deal: String,
    /// Test number to resolve.
    #[arg(long, value_name = "NUMBER")]
    test: u32,
    /// As-of date (ISO-8601).
    #[arg(long, value_name = "DATE")]
    as_of: String,
}

/// Configuration for `resolve all`.
#[derive(Args, Debug)]
struct ResolveAllCommand {
    /// Optional config file path (defaults to threshold-ledger.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Deal identifier to resolve for.
    #[arg(long, value_name = "DEAL_ID")]
    deal: String,
    /// Comma-separated test numbers applicable to the deal.
    #[arg(long, value_name = "NUMBERS")]
    numbers: String,
    /// As-of date (ISO-8601).
    #[arg(long, value_name = "DATE")]
    as_of: String,
}

// ============================================================================
// SECTION: Input Records
// ============================================================================

/// One override entry in a reseed input file.
#[derive(Debug, Deserialize)]
struct OverrideSeedEntry {
    /// Test number the override replaces the default for.
    test: u32,
    /// Replacement threshold value.
    value: BigDecimal,
    /// Inclusive effective date.
    effective: Date,
    /// Optional inclusive expiry date; omitted means open-ended.
    #[serde(default)]
    expiry: Option<Date>,
    /// Optional free-text provenance note.
    #[serde(default)]
    note: Option<String>,
    /// Optional creator identity.
    #[serde(default)]
    created_by: Option<String>,
}

// ============================================================================
// SECTION: Output Records
// ============================================================================

/// Output payload for `catalog seed`.
#[derive(Debug, Serialize)]
struct SeedOutput {
    /// Number of catalog rows inserted or updated.
    written: u64,
}

/// Output payload for `override set`.
#[derive(Debug, Serialize)]
struct OverrideSetOutput {
    /// Store-assigned identity of the new override row.
    override_id: OverrideId,
}

/// Output payload for `override reseed`.
#[derive(Debug, Serialize)]
struct OverrideReseedOutput {
    /// Store-assigned identities of the replacement rows.
    override_ids: Vec<OverrideId>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing error messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&format!("threshold-ledger {version}"))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }
    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };
    match command {
        Commands::Catalog {
            command,
        } => command_catalog(command),
        Commands::Override {
            command,
        } => command_override(command),
        Commands::Resolve {
            command,
        } => command_resolve(command),
    }
}

/// Prints top-level help.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(())
}

// ============================================================================
// SECTION: Catalog Commands
// ============================================================================

/// Dispatches catalog subcommands.
fn command_catalog(command: CatalogCommand) -> CliResult<ExitCode> {
    match command {
        CatalogCommand::Seed(command) => command_catalog_seed(&command),
        CatalogCommand::List(command) => command_catalog_list(&command),
    }
}

/// Executes `catalog seed`.
fn command_catalog_seed(command: &CatalogSeedCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let seed_path = match (&command.file, &config.catalog.seed_file) {
        (Some(path), _) => path.clone(),
        (None, Some(path)) => path.clone(),
        (None, None) => {
            return Err(CliError::new(
                "no seed file: pass --file or set catalog.seed_file in config".to_string(),
            ));
        }
    };
    let definitions: Vec<TestDefinition> = read_json_file(&seed_path)?;
    let store = open_store(&config)?;
    let written = store
        .seed_catalog(&definitions)
        .map_err(|err| CliError::new(format!("catalog seed failed: {err}")))?;
    write_json(&SeedOutput {
        written,
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `catalog list`.
fn command_catalog_list(command: &CatalogListCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let store = open_store(&config)?;
    let mut definitions = match &command.numbers {
        Some(text) => {
            let numbers = parse_numbers(text)?;
            let tests = store
                .get_applicable_tests(&numbers)
                .map_err(|err| CliError::new(format!("catalog list failed: {err}")))?;
            tests.into_values().collect::<Vec<_>>()
        }
        None => store
            .list_catalog()
            .map_err(|err| CliError::new(format!("catalog list failed: {err}")))?,
    };
    definitions.sort_by_key(|definition| definition.test_number);
    write_json(&definitions)?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Override Commands
// ============================================================================

/// Dispatches override subcommands.
fn command_override(command: OverrideCommand) -> CliResult<ExitCode> {
    match command {
        OverrideCommand::Set(command) => command_override_set(&command),
        OverrideCommand::Reseed(command) => command_override_reseed(&command),
        OverrideCommand::List(command) => command_override_list(&command),
    }
}

/// Executes `override set`.
fn command_override_set(command: &OverrideSetCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let store = open_store(&config)?;
    let definition = lookup_definition(&store, command.test)?;
    let effective = parse_cli_date(&command.effective)?;
    let expiry = command.expiry.as_deref().map(parse_cli_date).transpose()?;
    let interval = EffectiveInterval::new(effective, expiry)
        .map_err(|err| CliError::new(format!("invalid interval: {err}")))?;
    let draft = OverrideDraft {
        deal_id: DealId::new(command.deal.clone()),
        test_id: definition.test_id,
        value: parse_decimal_arg(&command.value)?,
        interval,
        note: command.note.clone(),
        created_by: AnalystId::new(
            command.created_by.clone().unwrap_or_else(|| DEFAULT_CREATED_BY.to_string()),
        ),
    };
    let override_id = store
        .upsert_override(&draft)
        .map_err(|err| CliError::new(format!("override set failed: {err}")))?;
    write_json(&OverrideSetOutput {
        override_id,
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `override reseed`.
fn command_override_reseed(command: &OverrideReseedCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let store = open_store(&config)?;
    let entries: Vec<OverrideSeedEntry> = read_json_file(&command.file)?;
    let numbers: BTreeSet<TestNumber> =
        entries.iter().map(|entry| TestNumber::new(entry.test)).collect();
    let tests = store
        .get_applicable_tests(&numbers)
        .map_err(|err| CliError::new(format!("override reseed failed: {err}")))?;
    let deal_id = DealId::new(command.deal.clone());
    let mut drafts = Vec::with_capacity(entries.len());
    for entry in entries {
        let number = TestNumber::new(entry.test);
        let definition = tests
            .values()
            .find(|definition| definition.test_number == number)
            .ok_or_else(|| CliError::new(format!("no catalog entry for test {number}")))?;
        let interval = EffectiveInterval::new(entry.effective, entry.expiry)
            .map_err(|err| CliError::new(format!("invalid interval for test {number}: {err}")))?;
        drafts.push(OverrideDraft {
            deal_id: deal_id.clone(),
            test_id: definition.test_id,
            value: entry.value,
            interval,
            note: entry.note,
            created_by: AnalystId::new(
                entry.created_by.unwrap_or_else(|| DEFAULT_CREATED_BY.to_string()),
            ),
        });
    }
    let override_ids = store
        .bulk_replace_deal_overrides(&deal_id, &drafts)
        .map_err(|err| CliError::new(format!("override reseed failed: {err}")))?;
    write_json(&OverrideReseedOutput {
        override_ids,
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `override list`.
fn command_override_list(command: &OverrideListCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let store = open_store(&config)?;
    let rows = store
        .list_deal_overrides(&DealId::new(command.deal.clone()))
        .map_err(|err| CliError::new(format!("override list failed: {err}")))?;
    write_json(&rows)?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Resolve Commands
// ============================================================================

/// Dispatches resolve subcommands.
fn command_resolve(command: ResolveCommand) -> CliResult<ExitCode> {
    match command {
        ResolveCommand::Test(command) => command_resolve_test(&command),
        ResolveCommand::All(command) => command_resolve_all(&command),
    }
}

/// Executes `resolve test`.
fn command_resolve_test(command: &ResolveTestCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let store = open_store(&config)?;
    let definition = lookup_definition(&store, command.test)?;
    let as_of = parse_cli_date(&command.as_of)?;
    let resolver = Resolver::new(&store, &store);
    let resolved = resolver
        .resolve(&DealId::new(command.deal.clone()), definition.test_id, as_of)
        .map_err(|err| CliError::new(format!("resolve failed: {err}")))?;
    write_json(&resolved)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `resolve all`.
fn command_resolve_all(command: &ResolveAllCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let store = open_store(&config)?;
    let numbers = parse_numbers(&command.numbers)?;
    let as_of = parse_cli_date(&command.as_of)?;
    let resolver = Resolver::new(&store, &store);
    let resolved = resolver
        .resolve_all(&DealId::new(command.deal.clone()), &numbers, as_of)
        .map_err(|err| CliError::new(format!("resolve failed: {err}")))?;
    write_json(&resolved)?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads and validates the ledger configuration.
fn load_config(path: Option<&Path>) -> CliResult<ThresholdLedgerConfig> {
    ThresholdLedgerConfig::load(path)
        .map_err(|err| CliError::new(format!("config load failed: {err}")))
}

/// Opens the configured ledger store.
fn open_store(config: &ThresholdLedgerConfig) -> CliResult<SqliteLedgerStore> {
    SqliteLedgerStore::new(&config.store)
        .map_err(|err| CliError::new(format!("store open failed: {err}")))
}

/// Looks up the catalog entry for a test number.
fn lookup_definition(store: &SqliteLedgerStore, number: u32) -> CliResult<TestDefinition> {
    let mut numbers = BTreeSet::new();
    numbers.insert(TestNumber::new(number));
    let mut tests = store
        .get_applicable_tests(&numbers)
        .map_err(|err| CliError::new(format!("catalog lookup failed: {err}")))?;
    let Some(test_id) = tests.keys().next().copied() else {
        return Err(CliError::new(format!("no catalog entry for test {number}")));
    };
    tests
        .remove(&test_id)
        .ok_or_else(|| CliError::new(format!("no catalog entry for test {number}")))
}

/// Reads and deserializes a size-capped JSON input file.
fn read_json_file<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let metadata = std::fs::metadata(path).map_err(|err| {
        CliError::new(format!("cannot read input file '{}': {err}", path.display()))
    })?;
    if metadata.len() > MAX_INPUT_BYTES {
        return Err(CliError::new(format!(
            "input file '{}' exceeds size limit: {} bytes (max {MAX_INPUT_BYTES})",
            path.display(),
            metadata.len()
        )));
    }
    let bytes = std::fs::read(path).map_err(|err| {
        CliError::new(format!("cannot read input file '{}': {err}", path.display()))
    })?;
    serde_json::from_slice(&bytes).map_err(|err| {
        CliError::new(format!("cannot parse input file '{}': {err}", path.display()))
    })
}

/// Parses an ISO-8601 date argument.
fn parse_cli_date(text: &str) -> CliResult<Date> {
    Date::parse(text, DATE_FORMAT)
        .map_err(|_| CliError::new(format!("invalid date '{text}': expected YYYY-MM-DD")))
}

/// Parses an exact decimal argument.
fn parse_decimal_arg(text: &str) -> CliResult<BigDecimal> {
    BigDecimal::from_str(text)
        .map_err(|_| CliError::new(format!("invalid decimal value '{text}'")))
}

/// Parses a comma-separated test number list.
fn parse_numbers(text: &str) -> CliResult<BTreeSet<TestNumber>> {
    let mut numbers = BTreeSet::new();
    for part in text.split(',') {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        let number: u32 = trimmed
            .parse()
            .map_err(|_| CliError::new(format!("invalid test number '{trimmed}'")))?;
        numbers.insert(TestNumber::new(number));
    }
    if numbers.is_empty() {
        return Err(CliError::new("no test numbers provided".to_string()));
    }
    Ok(numbers)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes raw bytes to stdout without adding a newline.
fn write_stdout_bytes(bytes: &[u8]) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(bytes)
}

/// Writes a JSON value to stdout with a trailing newline.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut bytes = serde_json::to_vec(value)
        .map_err(|err| CliError::new(format!("output serialization failed: {err}")))?;
    bytes.push(b'\n');
    write_stdout_bytes(&bytes).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output stream error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Writes an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
