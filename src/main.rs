//! CLI entry point for `drsreport`.

use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use drsreport::config::Config;
use drsreport::mailbox::auth::Authenticator;
use drsreport::mailbox::gmail::GmailClient;
use drsreport::mailbox::query::DateRange;
use drsreport::retrieve::RetrieveEvent;

#[derive(Parser)]
#[command(
    name = "drsreport",
    version,
    about = "Fetch DRS load reports from Gmail and summarize their MP3 files"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to $DRSREPORT_CONFIG or the user config dir)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Download .txt report attachments received in a date range
    Fetch(FetchArgs),
    /// Summarize MP3 rows from a directory of reports into one CSV
    Aggregate(AggregateArgs),
    /// Fetch, then aggregate the downloaded reports
    Run {
        #[command(flatten)]
        fetch: FetchArgs,
        /// Summary CSV to write
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Authorize mailbox access and save the token
    Auth {
        #[command(flatten)]
        credentials: CredentialArgs,
        /// Re-run the browser authorization even if a token exists
        #[arg(long)]
        force: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[derive(Args)]
struct CredentialArgs {
    /// OAuth client secret JSON
    #[arg(long, value_name = "FILE")]
    credentials: Option<PathBuf>,
    /// Where the authorized token is stored
    #[arg(long, value_name = "FILE")]
    token: Option<PathBuf>,
}

#[derive(Args)]
struct FetchArgs {
    /// First day to search, inclusive (YYYY/MM/DD or YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    start: Option<String>,
    /// Day the search stops, exclusive
    #[arg(long, value_name = "DATE")]
    end: Option<String>,
    /// Directory receiving the reports
    #[arg(short = 'd', long, value_name = "DIR")]
    report_dir: Option<PathBuf>,
    #[command(flatten)]
    credentials: CredentialArgs,
}

#[derive(Args)]
struct AggregateArgs {
    /// Directory of reports to read
    #[arg(short, long, value_name = "DIR")]
    source: Option<PathBuf>,
    /// Summary CSV to write
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = drsreport::config::load_config(cli.config.as_deref())?;

    let log_level = match cli.verbose {
        0 => config.general.log_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    setup_logging(&log_level, &config);

    match cli.command {
        Commands::Fetch(args) => {
            apply_fetch_args(&mut config, args);
            cmd_fetch(&config)
        }
        Commands::Aggregate(args) => {
            if let Some(source) = args.source {
                config.aggregate.source_dir = Some(source);
            }
            if let Some(output) = args.output {
                config.aggregate.output_csv = output;
            }
            cmd_aggregate(&config)
        }
        Commands::Run { fetch, output } => {
            apply_fetch_args(&mut config, fetch);
            if let Some(output) = output {
                config.aggregate.output_csv = output;
            }
            // The aggregator reads what the fetch just wrote.
            config.aggregate.source_dir = Some(config.mailbox.report_dir.clone());
            cmd_fetch(&config)?;
            cmd_aggregate(&config)
        }
        Commands::Auth { credentials, force } => {
            apply_credential_args(&mut config, credentials);
            cmd_auth(&config, force)
        }
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

fn apply_fetch_args(config: &mut Config, args: FetchArgs) {
    if let Some(start) = args.start {
        config.mailbox.start_date = Some(start);
    }
    if let Some(end) = args.end {
        config.mailbox.end_date = Some(end);
    }
    if let Some(dir) = args.report_dir {
        config.mailbox.report_dir = dir;
    }
    apply_credential_args(config, args.credentials);
}

fn apply_credential_args(config: &mut Config, args: CredentialArgs) {
    if let Some(path) = args.credentials {
        config.mailbox.credentials_file = path;
    }
    if let Some(path) = args.token {
        config.mailbox.token_file = path;
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = drsreport::config::log_file_path(config);
    let log_dir = drsreport::config::cache_dir(config);
    let log_name = log_path.file_name().map(|n| n.to_os_string());

    match log_name {
        Some(name) if std::fs::create_dir_all(&log_dir).is_ok() => {
            let file_appender = tracing_appender::rolling::never(&log_dir, name);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
        }
        _ => {
            // Fall back to stderr only
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
        }
    }
}

fn progress_bar(label: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} {label} [{{bar:40.cyan/blue}}] {{pos}}/{{len}}"
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn print_consent_url(url: &str) {
    println!();
    println!("  Please visit this URL to authorize read-only mailbox access:");
    println!();
    println!("  {url}");
    println!();
}

/// The stdout line announcing a retrieval event, if it has one.
fn status_line(event: &RetrieveEvent<'_>, range: &DateRange) -> Option<String> {
    match event {
        RetrieveEvent::Found(n) => Some(format!("  Found {n} matching email(s) in {range}.")),
        RetrieveEvent::Saved(path) => Some(format!("  Downloaded: {}", path.display())),
        RetrieveEvent::Message { .. } => None,
    }
}

/// Write a status line above the progress bar.
///
/// Works when the bar is hidden (stderr not a terminal), unlike
/// `ProgressBar::println`.
fn print_status(pb: &ProgressBar, out: &mut dyn Write, line: &str) -> std::io::Result<()> {
    pb.suspend(|| writeln!(out, "{line}"))
}

/// Download report attachments for the configured date range.
fn cmd_fetch(config: &Config) -> anyhow::Result<()> {
    let range = config.date_range()?;
    let report_dir = &config.mailbox.report_dir;

    let mut auth = Authenticator::new(config.credential_paths(), config.timeout())?;
    let token = auth.access_token(&print_consent_url)?;
    let client = GmailClient::new(&config.mailbox.api_base_url, token, config.timeout())?;

    let pb = progress_bar("Fetching")?;
    let start = Instant::now();

    let stats = drsreport::retrieve::retrieve_attachments(
        &client,
        &range,
        report_dir,
        &mut |event| {
            if let Some(line) = status_line(&event, &range) {
                if let Err(e) = print_status(&pb, &mut std::io::stdout(), &line) {
                    tracing::debug!(error = %e, "Failed to print status line");
                }
            }
            match event {
                RetrieveEvent::Found(n) => pb.set_length(n as u64),
                RetrieveEvent::Message { current, .. } => pb.set_position(current as u64),
                RetrieveEvent::Saved(_) => {}
            }
        },
    )?;

    pb.finish_and_clear();

    if stats.messages_found == 0 {
        println!("  No matching emails; nothing downloaded.");
        return Ok(());
    }

    use humansize::{format_size, BINARY};
    println!();
    println!("  {:<25} {}", "Messages", stats.messages_found);
    println!("  {:<25} {}", "Reports downloaded", stats.saved.len());
    println!(
        "  {:<25} {}",
        "Bytes written",
        format_size(stats.bytes_written, BINARY)
    );
    if stats.messages_failed > 0 || stats.attachments_failed > 0 {
        println!(
            "  {:<25} {} message(s), {} attachment(s) (see log)",
            "Failed", stats.messages_failed, stats.attachments_failed
        );
    }
    println!("  {:<25} {}", "Report directory", report_dir.display());
    println!("  {:<25} {:.2?}", "Elapsed", start.elapsed());
    println!();

    Ok(())
}

/// Summarize MP3 rows from the report directory.
fn cmd_aggregate(config: &Config) -> anyhow::Result<()> {
    let source = config.source_dir();
    let output = &config.aggregate.output_csv;

    let pb = progress_bar("Scanning")?;
    let aggregation =
        drsreport::aggregate::summarize_directory(source, output, &|current, total| {
            pb.set_length(total as u64);
            pb.set_position(current as u64);
        })?;
    pb.finish_and_clear();

    for (path, reason) in &aggregation.files_skipped {
        println!("  Skipping {} due to error: {reason}", path.display());
    }

    if aggregation.rows.is_empty() {
        println!("  No MP3 rows found in any files.");
        return Ok(());
    }

    println!();
    println!("  {:<25} {}", "Reports scanned", aggregation.files_scanned);
    println!(
        "  {:<25} {}",
        "Reports with MP3s", aggregation.files_contributing
    );
    println!("  {:<25} {}", "Objects", aggregation.rows.len());
    println!();
    println!("  Done! MP3 data written to {}", output.display());

    Ok(())
}

/// Authorize and persist the token without fetching anything.
fn cmd_auth(config: &Config, force: bool) -> anyhow::Result<()> {
    let mut auth = Authenticator::new(config.credential_paths(), config.timeout())?;
    if force {
        auth.acquire(&print_consent_url)?;
    } else {
        auth.access_token(&print_consent_url)?;
    }
    println!(
        "  Token ready at {}",
        auth.paths().token.display()
    );
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "drsreport", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::stdout().write_all(&buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn week() -> DateRange {
        DateRange::parse("2025/06/30", "2025/07/06").unwrap()
    }

    #[test]
    fn test_status_lines_for_events() {
        assert_eq!(
            status_line(&RetrieveEvent::Found(3), &week()).as_deref(),
            Some("  Found 3 matching email(s) in 2025-06-30 .. 2025-07-06.")
        );
        assert_eq!(
            status_line(&RetrieveEvent::Saved(Path::new("reports/a.txt")), &week()).as_deref(),
            Some("  Downloaded: reports/a.txt")
        );
        assert!(status_line(&RetrieveEvent::Message { current: 0, total: 1 }, &week()).is_none());
    }

    #[test]
    fn test_print_status_with_hidden_bar() {
        let pb = ProgressBar::hidden();
        assert!(pb.is_hidden());

        let mut out = Vec::new();
        for event in [
            RetrieveEvent::Found(1),
            RetrieveEvent::Message { current: 0, total: 1 },
            RetrieveEvent::Saved(Path::new("reports/a.txt")),
        ] {
            if let Some(line) = status_line(&event, &week()) {
                print_status(&pb, &mut out, &line).unwrap();
            }
        }

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "  Found 1 matching email(s) in 2025-06-30 .. 2025-07-06.\n  Downloaded: reports/a.txt\n"
        );
    }
}
