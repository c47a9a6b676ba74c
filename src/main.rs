//! CLI entry point for `mailgrab`.

use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::{Datelike, Local, NaiveDate};
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailgrab::config::{self, Config};
use mailgrab::scan::trace::{LogSink, TraceEvent, TraceSink};
use mailgrab::scan::window::{Period, Relative, SearchWindow};
use mailgrab::scan::{self as scanner, ScanOutcome, ScanReport, ScanRequest};
use mailgrab::secrets::{self, PASSWORD_ENV};
use mailgrab::session::imap::ImapSession;
use mailgrab::session::{Credentials, ScopedSession};

#[derive(Parser)]
#[command(
    name = "mailgrab",
    version,
    about = "Download attachments from an IMAP mailbox",
    long_about = "Download the attachments of every message from one sender, received \
                  in a month or year, from a Gmail label (or any IMAP mailbox). Existing \
                  files are never overwritten: duplicates get a numeric suffix."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Account address (prompted for if missing)
    #[arg(long, env = "MAILGRAB_EMAIL", value_name = "ADDRESS")]
    email: Option<String>,

    /// Read the password from this file instead of $MAILGRAB_PASSWORD or a prompt
    #[arg(long, value_name = "FILE")]
    password_file: Option<PathBuf>,

    /// Label to scan [default: Bills]
    #[arg(long, conflicts_with = "all_mail")]
    label: Option<String>,

    /// Scan "[Gmail]/All Mail" instead of a label
    #[arg(long)]
    all_mail: bool,

    /// Only messages from this sender [default: do-not-reply@gett.com]
    #[arg(long = "from", value_name = "ADDRESS")]
    sender: Option<String>,

    /// Scan a whole month (the default)
    #[arg(long, conflicts_with = "by_year")]
    by_month: bool,

    /// Scan a whole year
    #[arg(long)]
    by_year: bool,

    /// Scan the previous month or year instead of the current one
    #[arg(long, conflicts_with_all = ["year", "month"])]
    previous: bool,

    /// Year to scan (default: current year)
    #[arg(long)]
    year: Option<i32>,

    /// Month to scan, 1-12 (default: current month)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12), conflicts_with = "by_year")]
    month: Option<u32>,

    /// Report what would be downloaded without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Directory to save attachments to (must exist) [default: .]
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// IMAP server [default: imap.gmail.com]
    #[arg(long)]
    host: Option<String>,

    /// IMAP port [default: 993]
    #[arg(long)]
    port: Option<u16>,

    /// Only list the available labels
    #[arg(long)]
    list_labels: bool,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file (default: $MAILGRAB_CONFIG or the platform config dir)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => return cmd_completions(shell),
        Some(Commands::Manpage) => return cmd_manpage(),
        None => {}
    }

    let config = match &cli.config {
        Some(path) => config::load_config_from(path)?,
        None => config::load_config(),
    };

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);
    tracing::debug!(log_file = %config::log_file_path(&config).display(), "Logging started");

    if cli.list_labels {
        cmd_list_labels(&cli, &config)
    } else {
        cmd_scan(&cli, &config)
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = config::log_file_path(config);
    let log_dir = log_path.parent().unwrap_or(std::path::Path::new("."));
    if let (Some(file_name), Ok(())) = (log_path.file_name(), std::fs::create_dir_all(log_dir)) {
        let file_appender = tracing_appender::rolling::never(log_dir, file_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<ExitCode> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailgrab", &mut std::io::stdout());
    Ok(ExitCode::SUCCESS)
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<ExitCode> {
    let man = clap_mangen::Man::new(Cli::command());
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(ExitCode::SUCCESS)
}

/// Log in, print every label, log out.
fn cmd_list_labels(cli: &Cli, config: &Config) -> anyhow::Result<ExitCode> {
    let credentials = credentials(cli, config)?;
    let session = connect(cli, config)?;
    let mut session = ScopedSession::login(session, &credentials)?;
    let labels = scanner::list_labels(&mut session, &mut LogSink)?;
    session.release()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&labels)?);
    } else {
        for label in &labels {
            println!("{label}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_scan(cli: &Cli, config: &Config) -> anyhow::Result<ExitCode> {
    let destination = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| config.scan.output_dir.clone());
    if !cli.dry_run && !destination.is_dir() {
        anyhow::bail!("{} doesn't exist", destination.display());
    }

    let today = Local::now().date_naive();
    let request = ScanRequest {
        label: if cli.all_mail {
            None
        } else {
            Some(cli.label.clone().unwrap_or_else(|| config.scan.label.clone()))
        },
        sender: cli
            .sender
            .clone()
            .unwrap_or_else(|| config.scan.sender.clone()),
        window: search_window(cli, today)?,
        destination,
        dry_run: cli.dry_run,
    };
    tracing::info!(window = %request.window, "Search window");

    let credentials = credentials(cli, config)?;
    let session = connect(cli, config)?;

    let mut sink = ProgressSink::new();
    let report = scanner::run(session, &credentials, &request, &mut sink)?;
    sink.finish();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    let ok = report.outcome != ScanOutcome::LabelUnavailable && report.failed.is_empty();
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Map the range flags onto a concrete window.
///
/// `--year`/`--month` pin the window; missing parts default to today.
/// Without them the current (or, with `--previous`, the previous) month
/// or year is used.
fn search_window(cli: &Cli, today: NaiveDate) -> anyhow::Result<SearchWindow> {
    let period = if cli.by_year { Period::Year } else { Period::Month };
    let window = match (period, cli.year, cli.month) {
        (Period::Year, Some(year), _) => SearchWindow::year(year)?,
        (Period::Month, Some(_), _) | (Period::Month, _, Some(_)) => SearchWindow::month(
            cli.year.unwrap_or_else(|| today.year()),
            cli.month.unwrap_or_else(|| today.month()),
        )?,
        _ => {
            let relative = if cli.previous {
                Relative::Previous
            } else {
                Relative::Current
            };
            SearchWindow::relative(period, relative, today)?
        }
    };
    Ok(window)
}

fn credentials(cli: &Cli, config: &Config) -> anyhow::Result<Credentials> {
    let address = match cli.email.clone().or_else(|| config.account.email.clone()) {
        Some(address) => address,
        None => prompt_line("Email address: ")?,
    };
    if address.is_empty() {
        anyhow::bail!("no email address given");
    }

    let password_file = cli
        .password_file
        .as_deref()
        .or(config.account.password_file.as_deref());
    let secret = secrets::resolve_password(password_file, PASSWORD_ENV, || {
        secrets::prompt_hidden(&address)
    })?;

    Ok(Credentials { address, secret })
}

fn connect(cli: &Cli, config: &Config) -> anyhow::Result<ImapSession> {
    let host = cli.host.as_deref().unwrap_or(&config.account.host);
    let port = cli.port.unwrap_or(config.account.port);
    ImapSession::connect(host, port).with_context(|| format!("Could not open a session to {host}"))
}

fn prompt_line(prompt: &str) -> anyhow::Result<String> {
    eprint!("{prompt}");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Forwards trace events to the log while ticking a progress bar over the
/// fetched messages.
struct ProgressSink {
    bar: Option<ProgressBar>,
}

impl ProgressSink {
    fn new() -> Self {
        Self { bar: None }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl TraceSink for ProgressSink {
    fn record(&mut self, event: TraceEvent) {
        match &event {
            TraceEvent::MessagesFound { count } if *count > 0 => {
                let bar = ProgressBar::new(*count as u64);
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("{spinner:.green} Scanning [{bar:40.cyan/blue}] {pos}/{len}")
                {
                    bar.set_style(style.progress_chars("#>-"));
                }
                self.bar = Some(bar);
            }
            TraceEvent::MessageStarted { .. } | TraceEvent::MessageUnparsable { .. } => {
                if let Some(bar) = &self.bar {
                    bar.inc(1);
                }
            }
            TraceEvent::Finished { .. } => self.finish(),
            _ => {}
        }

        match &self.bar {
            Some(bar) => bar.suspend(|| LogSink.record(event)),
            None => LogSink.record(event),
        }
    }
}

fn print_summary(report: &ScanReport) {
    println!();
    println!("  {:<25} {:?}", "Outcome", report.outcome);
    println!("  {:<25} {}", "Messages scanned", report.messages);
    if report.planned.is_empty() {
        println!("  {:<25} {}", "Attachments saved", report.downloaded.len());
    } else {
        println!("  {:<25} {}", "Would be saved", report.planned.len());
    }
    if report.without_attachments > 0 {
        println!(
            "  {:<25} {}",
            "Without attachments", report.without_attachments
        );
    }
    if report.empty > 0 {
        println!("  {:<25} {}", "Empty attachments", report.empty);
    }
    for path in &report.failed {
        println!("  {:<25} {}", "Failed", path.display());
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("mailgrab").chain(args.iter().copied())).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_window_is_current_month() {
        let w = search_window(&parse(&[]), day(2024, 4, 17)).unwrap();
        assert_eq!(w, SearchWindow::month(2024, 4).unwrap());
    }

    #[test]
    fn test_previous_month_window() {
        let w = search_window(&parse(&["--previous"]), day(2024, 4, 17)).unwrap();
        assert_eq!(w.since(), day(2024, 3, 1));
        assert_eq!(w.before(), day(2024, 4, 1));
    }

    #[test]
    fn test_previous_year_window() {
        let w = search_window(&parse(&["--by-year", "--previous"]), day(2024, 4, 17)).unwrap();
        assert_eq!(w, SearchWindow::year(2023).unwrap());
    }

    #[test]
    fn test_month_defaults_year_to_today() {
        let w = search_window(&parse(&["--month", "2"]), day(2024, 4, 17)).unwrap();
        assert_eq!(w, SearchWindow::month(2024, 2).unwrap());
    }

    #[test]
    fn test_explicit_year() {
        let w = search_window(&parse(&["--by-year", "--year", "2021"]), day(2024, 4, 17)).unwrap();
        assert_eq!(w, SearchWindow::year(2021).unwrap());
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        let args = ["mailgrab", "--by-month", "--by-year"];
        assert!(Cli::try_parse_from(args).is_err());
        let args = ["mailgrab", "--label", "Bills", "--all-mail"];
        assert!(Cli::try_parse_from(args).is_err());
        let args = ["mailgrab", "--month", "13"];
        assert!(Cli::try_parse_from(args).is_err());
    }
}
