#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use cmd::Locations;
use output::{CliError, OutputMode};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Exit status for failures worth retrying (`EX_TEMPFAIL`).
const EXIT_RETRYABLE: u8 = 75;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "bsift: duplicate, recurring and low-quality triage for defect reports",
    long_about = None
)]
struct Cli {
    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format; overrides `--json` and `BUGSIFT_FORMAT`.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Principal recorded on manual overrides.
    #[arg(long, global = true)]
    actor: Option<String>,

    /// Database path (default: `.bugsift/bugsift.sqlite3`).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config path (default: `BUGSIFT_CONFIG` or `.bugsift/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn locations(&self) -> Locations {
        Locations {
            db: self.db.clone(),
            config: self.config.clone(),
        }
    }

    /// Output mode usable before the config has been read.
    fn early_output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json, None)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Intake",
        about = "Classify an incoming report",
        long_about = "Run a report through the quality gate and duplicate detection.",
        after_help = "EXAMPLES:\n    # Submit from a JSON file\n    bsift submit --file report.json\n\n    # Submit from flags\n    bsift submit --title \"Checkout crashes on pay\" --description \"...\" --device \"Pixel 8\"\n\n    # Read JSON from stdin\n    cat report.json | bsift submit --file -"
    )]
    Submit(cmd::submit::SubmitArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show one report",
        after_help = "EXAMPLES:\n    bsift show bug-3f9a2c1d7e\n    bsift show bug-3f9a2c1d7e --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Read",
        about = "List duplicates below a report",
        after_help = "EXAMPLES:\n    bsift dups bug-3f9a2c1d7e"
    )]
    Dups(cmd::dups::DupsArgs),

    #[command(next_help_heading = "Read", about = "Show aggregate statistics")]
    Stats,

    #[command(next_help_heading = "Read", about = "Show the audit log")]
    Audit(cmd::audit::AuditArgs),

    #[command(next_help_heading = "Read", about = "Show the duplicate decision history")]
    History(cmd::audit::HistoryArgs),

    #[command(next_help_heading = "Review", about = "Work the low-quality queue")]
    Review {
        #[command(subcommand)]
        command: cmd::review::ReviewCommand,
    },

    #[command(
        next_help_heading = "Review",
        about = "Turn a duplicate or recurring report back into a new one",
        after_help = "EXAMPLES:\n    bsift promote bug-3f9a2c1d7e --actor alice --note \"different root cause\""
    )]
    Promote(cmd::overrides::PromoteArgs),

    #[command(
        next_help_heading = "Review",
        about = "Set a report's classification by hand",
        after_help = "EXAMPLES:\n    bsift reclassify bug-b --tag duplicate --parent bug-a --actor alice\n    bsift reclassify bug-b --tag new --actor alice"
    )]
    Reclassify(cmd::overrides::ReclassifyArgs),

    #[command(
        next_help_heading = "Review",
        about = "Mark a report resolved; only recurring reports keep matching",
        after_help = "EXAMPLES:\n    bsift resolve bug-3f9a2c1d7e --actor alice --note \"fixed in 2.15\""
    )]
    Resolve(cmd::overrides::ResolveArgs),

    #[command(next_help_heading = "Review", about = "Reopen a resolved report")]
    Reopen(cmd::overrides::ResolveArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Rebuild the similarity index from the database"
    )]
    RebuildIndex,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("BUGSIFT_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "bugsift=debug,info"
        } else {
            "bugsift=info,warn"
        })
    });

    let format = env::var("BUGSIFT_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let project_root = env::current_dir()?;
    let session = cmd::open_session(
        &cli.locations(),
        &project_root,
        cli.actor.as_deref(),
        cli.format,
        cli.json,
    )?;
    debug!(command = ?cli.command, "dispatching");

    match &cli.command {
        Commands::Submit(args) => cmd::submit::run_submit(args, &session),
        Commands::Show(args) => cmd::show::run_show(args, &session),
        Commands::Dups(args) => cmd::dups::run_dups(args, &session),
        Commands::Stats => cmd::stats::run_stats(&session),
        Commands::Audit(args) => cmd::audit::run_audit(args, &session),
        Commands::History(args) => cmd::audit::run_history(args, &session),
        Commands::Review { command } => cmd::review::run_review(command, &session),
        Commands::Promote(args) => cmd::overrides::run_promote(args, &session),
        Commands::Reclassify(args) => cmd::overrides::run_reclassify(args, &session),
        Commands::Resolve(args) => cmd::overrides::run_resolve(args, &session),
        Commands::Reopen(args) => cmd::overrides::run_reopen(args, &session),
        Commands::RebuildIndex => cmd::rebuild::run_rebuild(&session),
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error = CliError::from(&err);
            let code = if error.retryable {
                EXIT_RETRYABLE
            } else {
                1
            };
            if output::render_error(cli.early_output_mode(), &error).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::from(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_parses_after_subcommand() {
        let cli = Cli::parse_from(["bsift", "stats", "--json"]);
        assert!(cli.json);
        assert!(cli.early_output_mode().is_json());
    }

    #[test]
    fn format_flag_wins_over_json() {
        let cli = Cli::parse_from(["bsift", "--json", "--format", "text", "stats"]);
        assert_eq!(cli.early_output_mode(), OutputMode::Text);
    }

    #[test]
    fn submit_needs_a_title_or_file() {
        assert!(Cli::try_parse_from(["bsift", "submit"]).is_err());
        assert!(Cli::try_parse_from(["bsift", "submit", "--file", "r.json"]).is_ok());
        assert!(Cli::try_parse_from(["bsift", "submit", "--title", "Checkout crash"]).is_ok());
        assert!(
            Cli::try_parse_from(["bsift", "submit", "--file", "r.json", "--title", "x"]).is_err()
        );
    }

    #[test]
    fn reclassify_parses_tag_names() {
        let cli = Cli::parse_from([
            "bsift",
            "reclassify",
            "bug-b",
            "--tag",
            "duplicate",
            "--parent",
            "bug-a",
        ]);
        let Commands::Reclassify(args) = cli.command else {
            panic!("expected reclassify");
        };
        assert_eq!(args.tag, bugsift_core::model::ClassificationTag::Duplicate);
        assert_eq!(args.parent.as_deref(), Some("bug-a"));

        assert!(Cli::try_parse_from(["bsift", "reclassify", "bug-b", "--tag", "bogus"]).is_err());
    }

    #[test]
    fn review_subcommands_parse() {
        for args in [
            vec!["bsift", "review", "list"],
            vec!["bsift", "review", "list", "--all"],
            vec!["bsift", "review", "list", "--status", "rejected"],
            vec!["bsift", "review", "approve", "3", "--note", "fine"],
            vec!["bsift", "review", "reject", "3"],
            vec!["bsift", "resolve", "bug-a", "--note", "fixed"],
            vec!["bsift", "reopen", "bug-a"],
        ] {
            let result = Cli::try_parse_from(args.iter());
            assert!(result.is_ok(), "failed to parse {args:?}: {:?}", result.err());
        }
    }

    #[test]
    fn global_locations_are_collected() {
        let cli = Cli::parse_from([
            "bsift",
            "--db",
            "/tmp/t.sqlite3",
            "--actor",
            "alice",
            "rebuild-index",
        ]);
        assert_eq!(cli.locations().db, Some(PathBuf::from("/tmp/t.sqlite3")));
        assert_eq!(cli.actor.as_deref(), Some("alice"));
        assert!(matches!(cli.command, Commands::RebuildIndex));
    }

    #[test]
    fn audit_event_filter_parses() {
        let cli = Cli::parse_from(["bsift", "audit", "--event", "duplicate-blocked"]);
        let Commands::Audit(args) = cli.command else {
            panic!("expected audit");
        };
        assert_eq!(
            args.event,
            Some(bugsift_core::model::AuditEvent::DuplicateBlocked)
        );
    }
}
