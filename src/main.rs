use std::path::{Path, PathBuf};
use std::process::Command as PlayerCommand;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use watchlog::config::{self, Config};
use watchlog::digest::{FingerprintError, fingerprint_file};
use watchlog::store::gripspec::{parse_fingerprint_arg, parse_grip_spec};
use watchlog::store::{EventRow, Ledger, LedgerError, WriteScope};
use watchlog::when::Stamp;

const SEPARATOR_WIDTH: usize = 72;

#[derive(Debug)]
struct CliError {
    code: &'static str,
    message: String,
}

impl CliError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn io(code: &'static str, err: std::io::Error) -> Self {
        Self::new(code, err.to_string())
    }
}

impl From<LedgerError> for CliError {
    fn from(value: LedgerError) -> Self {
        let code = match &value {
            LedgerError::Busy => "store_busy",
            LedgerError::AmbiguousGrip { .. } => "ambiguous_grip",
            LedgerError::Names(_) => "store_names_error",
            LedgerError::Sqlite(_) => "store_error",
        };
        Self::new(code, value.to_string())
    }
}

impl From<FingerprintError> for CliError {
    fn from(value: FingerprintError) -> Self {
        let code = match &value {
            FingerprintError::SizeOverflow { .. } => "size_overflow",
            FingerprintError::Io(_) => "fingerprint_io_error",
        };
        Self::new(code, value.to_string())
    }
}

impl From<config::ConfigError> for CliError {
    fn from(value: config::ConfigError) -> Self {
        Self::new("config_error", value.to_string())
    }
}

#[derive(Parser, Debug)]
#[command(name = "watchlog", version)]
#[command(about = "Tracks what media was played, of what file, and when")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pass arguments to the media player and record the play session.
    #[command(visible_alias = "w")]
    Wrapper(PlayerArgs),
    /// Register files and their locations without recording history.
    Add(FilesArgs),
    /// Remove files and filepaths unreferenced by any history event.
    Cleanup,
    /// Delete media events from history, addressed by grip-spec.
    #[command(visible_alias = "del")]
    Delete(GripSpecArgs),
    /// Search media files and their last known location.
    #[command(visible_alias = "fs")]
    Fsearch(QueryArgs),
    /// Compute the sampling fingerprint of files.
    #[command(visible_alias = "h")]
    Hash(FilesArgs),
    /// List the latest media events in history.
    #[command(visible_alias = "l")]
    Latest(LatestArgs),
    /// List all recorded fingerprints and filenames.
    #[command(visible_alias = "lh")]
    Hashes,
    /// Print the currently active media event, if any.
    #[command(visible_alias = "np")]
    Playing,
    /// Purge all history of the files matching the given fingerprints.
    Purge(FingerprintArgs),
    /// Search through the media event history.
    #[command(visible_alias = "s")]
    Search(QueryArgs),
    /// Simple stats about files, filepaths and history.
    Stats,
}

#[derive(Args, Debug)]
struct PlayerArgs {
    /// Arguments handed to the media player; the ones naming files are
    /// also recorded into history.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    player_args: Vec<String>,
}

#[derive(Args, Debug)]
struct FilesArgs {
    #[arg(required = true)]
    files: Vec<String>,
}

#[derive(Args, Debug)]
struct GripSpecArgs {
    /// Grip-specs in [YYYY[.MM[.DD]]]GRIP form.
    #[arg(required = true)]
    specs: Vec<String>,
}

#[derive(Args, Debug)]
struct FingerprintArgs {
    #[arg(required = true)]
    fingerprints: Vec<String>,
}

#[derive(Args, Debug)]
struct QueryArgs {
    terms: Vec<String>,
}

#[derive(Args, Debug)]
struct LatestArgs {
    limit: Option<u32>,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("watchlog: {} ({})", err.message, err.code);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let home = home_dir()?;
    let config = config::load_or_create(&home)?;

    match cli.command {
        Command::Wrapper(args) => cmd_wrapper(&config, &home, args),
        Command::Add(args) => cmd_add(&config, &home, args),
        Command::Cleanup => cmd_cleanup(&config),
        Command::Delete(args) => cmd_delete(&config, args),
        Command::Fsearch(args) => cmd_fsearch(&config, args),
        Command::Hash(args) => cmd_hash(&home, args),
        Command::Latest(args) => cmd_latest(&config, args),
        Command::Hashes => cmd_hashes(&config),
        Command::Playing => cmd_playing(&config),
        Command::Purge(args) => cmd_purge(&config, args),
        Command::Search(args) => cmd_search(&config, args),
        Command::Stats => cmd_stats(&config),
    }
}

fn cmd_wrapper(config: &Config, home: &Path, args: PlayerArgs) -> Result<(), CliError> {
    let before = Stamp::now();
    let mut player = PlayerCommand::new(&config.media_player)
        .args(&args.player_args)
        .spawn()
        .map_err(|err| {
            CliError::new(
                "player_spawn_error",
                format!("cannot start `{}`: {err}", config.media_player),
            )
        })?;

    let mut ledger = open_ledger(config)?;
    let files = playable_files(home, &args.player_args);

    let scope = ledger.begin_write()?;
    let mut session_ids = Vec::new();
    for filepath in &files {
        let (file_id, track_id) = observe_file(&scope, filepath, &before)?;
        session_ids.push(scope.start_session(file_id, track_id, &before)?);
    }
    scope.commit()?;

    // Playback happens outside any transaction; the ledger holds no lock
    // while the player runs.
    player
        .wait()
        .map_err(|err| CliError::io("player_wait_error", err))?;
    let after = Stamp::now();
    let played_secs = after.seconds_since(&before);

    let scope = ledger.begin_write()?;
    for session_id in session_ids {
        scope.stop_session(session_id, &after, played_secs)?;
    }
    scope.commit()?;
    Ok(())
}

fn cmd_add(config: &Config, home: &Path, args: FilesArgs) -> Result<(), CliError> {
    let mut ledger = open_ledger(config)?;
    let now = Stamp::now();
    let files = playable_files(home, &args.files);

    let scope = ledger.begin_write()?;
    for filepath in &files {
        observe_file(&scope, filepath, &now)?;
    }
    scope.commit()?;

    eprintln!("Processed {} file(s).", files.len());
    Ok(())
}

/// Resolve a file's identity and refresh its path tracking inside one
/// write scope; shared by wrapper and add.
fn observe_file(
    scope: &WriteScope<'_>,
    filepath: &Path,
    now: &Stamp,
) -> Result<(i64, i64), CliError> {
    let fingerprint = fingerprint_file(filepath)?;
    let name = base_name(filepath);
    let file_id = scope.resolve_identity(&fingerprint, &name)?;
    let absolute = std::path::absolute(filepath)
        .map_err(|err| CliError::io("path_error", err))?
        .to_string_lossy()
        .into_owned();
    let track_id = scope.touch_path(file_id, &absolute, now)?;
    Ok((file_id, track_id))
}

fn cmd_cleanup(config: &Config) -> Result<(), CliError> {
    let mut ledger = open_ledger(config)?;
    let scope = ledger.begin_write()?;
    let (paths, files) = scope.cleanup()?;
    scope.commit()?;

    eprintln!(
        "Removed {paths} filepaths and {files} files, since no history records reference them."
    );
    Ok(())
}

fn cmd_delete(config: &Config, args: GripSpecArgs) -> Result<(), CliError> {
    let mut ledger = open_ledger(config)?;
    eprintln!("Deleting media events from history:\n");

    let scope = ledger.begin_write()?;
    for raw in &args.specs {
        let Some(spec) = parse_grip_spec(raw) else {
            continue;
        };
        match scope.delete_event(&spec) {
            Ok(Some(deleted)) => {
                println!(
                    "{}\t{}\t{}",
                    deleted.grip,
                    fmt_local(config, &deleted.start),
                    escape_ws(&deleted.filepath)
                );
            }
            Ok(None) => {}
            // Nothing was deleted; report and continue with the rest.
            Err(err @ LedgerError::AmbiguousGrip { .. }) => eprintln!("{err}."),
            Err(err) => return Err(err.into()),
        }
    }
    scope.commit()?;
    Ok(())
}

fn cmd_fsearch(config: &Config, args: QueryArgs) -> Result<(), CliError> {
    let ledger = open_ledger(config)?;
    for track in ledger.file_search(&args.terms.join(" "))? {
        println!(
            "{}\nLast seen: {}\n",
            escape_ws(&track.filepath),
            fmt_local(config, &track.last_seen)
        );
    }
    eprintln!("{}", "-".repeat(SEPARATOR_WIDTH));
    Ok(())
}

fn cmd_hash(home: &Path, args: FilesArgs) -> Result<(), CliError> {
    for raw in &args.files {
        let path = config::expand_tilde(raw, home);
        if !path.is_file() {
            continue;
        }
        let fingerprint = fingerprint_file(&path)?;
        println!("{}  {}", fingerprint, escape_ws(&path.to_string_lossy()));
    }
    Ok(())
}

fn cmd_latest(config: &Config, args: LatestArgs) -> Result<(), CliError> {
    let limit = args.limit.unwrap_or(config.latest_default_limit);
    let ledger = open_ledger(config)?;
    print_events(config, &ledger.latest(limit)?, false);
    Ok(())
}

fn cmd_hashes(config: &Config) -> Result<(), CliError> {
    let ledger = open_ledger(config)?;
    for identity in ledger.list_identities()? {
        println!(
            "{}\t{}",
            identity.fingerprint,
            fmt_names(&identity.filenames)
        );
    }
    Ok(())
}

fn cmd_playing(config: &Config) -> Result<(), CliError> {
    let ledger = open_ledger(config)?;
    let Some(playing) = ledger.now_playing()? else {
        return Ok(());
    };

    let elapsed = Stamp::parse(&playing.start)
        .map(|start| fmt_play_time(Stamp::now().seconds_since(&start) as i64))
        .unwrap_or_else(|_| "?".to_string());
    let filename = base_name(Path::new(&playing.filepath));
    println!("{}: [{}]", escape_ws(&filename), elapsed);
    Ok(())
}

fn cmd_purge(config: &Config, args: FingerprintArgs) -> Result<(), CliError> {
    let fingerprints: Vec<String> = args
        .fingerprints
        .iter()
        .filter_map(|raw| parse_fingerprint_arg(raw))
        .collect();

    let mut ledger = open_ledger(config)?;
    eprintln!("Purging from all history records:\n");

    let scope = ledger.begin_write()?;
    for purged in scope.purge(&fingerprints) {
        let purged = purged?;
        println!("{}\t{}", purged.fingerprint, fmt_names(&purged.filenames));
    }
    scope.commit()?;
    Ok(())
}

fn cmd_search(config: &Config, args: QueryArgs) -> Result<(), CliError> {
    let ledger = open_ledger(config)?;
    print_events(config, &ledger.search(&args.terms.join(" "))?, true);
    Ok(())
}

fn cmd_stats(config: &Config) -> Result<(), CliError> {
    let ledger = open_ledger(config)?;
    let totals = ledger.totals()?;
    println!(
        "I have knowledge of {} files and {} filepaths.\n\
         There are {} media events recorded in history.",
        totals.files, totals.paths, totals.events
    );
    Ok(())
}

/// File arguments destined for the media player: flag-shaped arguments
/// are skipped until a `--` separator, after which everything naming an
/// existing file counts.
fn playable_files(home: &Path, args: &[String]) -> Vec<PathBuf> {
    let mut passthrough = false;
    let mut out = Vec::new();
    for arg in args {
        if !passthrough && arg == "--" {
            passthrough = true;
            continue;
        }
        if !passthrough && arg.starts_with('-') {
            continue;
        }
        let expanded = config::expand_tilde(arg, home);
        if expanded.is_file() {
            out.push(expanded);
        }
    }
    out
}

fn print_events(config: &Config, rows: &[EventRow], footer: bool) {
    for row in rows {
        print_event(config, row);
    }
    eprintln!("{}", "-".repeat(SEPARATOR_WIDTH));
    if footer {
        let plural = if rows.len() == 1 { "" } else { "s" };
        eprintln!("Found {} event{} in media history.", rows.len(), plural);
    }
}

fn print_event(config: &Config, row: &EventRow) {
    let path = Path::new(&row.filepath);
    let filename = escape_ws(&base_name(path));
    let file_loc = escape_ws(
        &path
            .parent()
            .map(|parent| parent.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    let grip_spec = fmt_grip_spec(&row.start, &row.grip, row.grip_count);
    let start = fmt_local(config, &row.start);

    match (&row.stop, row.play_secs) {
        (Some(stop), Some(secs)) => println!(
            "{}: [{}]\n@ {}\n[{}] {} ---> {}\n",
            filename,
            fmt_play_time(secs),
            file_loc,
            grip_spec,
            start,
            fmt_local(config, stop)
        ),
        _ => println!(
            "{}: [NOW PLAYING]\n@ {}\n[{}] {} ---> ?\n",
            filename, file_loc, grip_spec, start
        ),
    }
}

/// A grip alone addresses the event unless it collides; then the printed
/// grip-spec carries the UTC start date for disambiguation.
fn fmt_grip_spec(start_raw: &str, grip: &str, grip_count: i64) -> String {
    if grip_count <= 1 {
        return grip.to_string();
    }
    match Stamp::parse(start_raw) {
        Ok(start) => format!("{}.{grip}", start.format_utc("%Y.%m.%d")),
        Err(_) => grip.to_string(),
    }
}

fn fmt_local(config: &Config, raw: &str) -> String {
    Stamp::parse(raw)
        .map(|stamp| stamp.format_local(&config.datetime_display_format))
        .unwrap_or_else(|_| raw.to_string())
}

fn fmt_play_time(total_secs: i64) -> String {
    let total_secs = total_secs.max(0);
    let days = total_secs / 86_400;
    let rest = total_secs % 86_400;
    let (hours, minutes, seconds) = (rest / 3600, rest % 3600 / 60, rest % 60);
    match days {
        0 => format!("{hours}:{minutes:02}:{seconds:02}"),
        1 => format!("1 day, {hours}:{minutes:02}:{seconds:02}"),
        _ => format!("{days} days, {hours}:{minutes:02}:{seconds:02}"),
    }
}

fn fmt_names(names: &[String]) -> String {
    serde_json::to_string(names).unwrap_or_else(|_| format!("{names:?}"))
}

/// Escape whitespace control characters and backslashes so untrusted
/// filenames stay on one report line.
fn escape_ws(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Open the store, creating its parent directory on first use.
fn open_ledger(config: &Config) -> Result<Ledger, CliError> {
    if let Some(parent) = config.db_file.parent() {
        std::fs::create_dir_all(parent).map_err(|err| CliError::io("db_dir_error", err))?;
    }
    Ok(Ledger::open(&config.db_file)?)
}

fn home_dir() -> Result<PathBuf, CliError> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| CliError::new("home_error", "HOME environment variable is not set"))
}
