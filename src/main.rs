//! Command-line entry point.
//!
//! Two subcommands: `report` aggregates JUnit artifacts into a flake
//! report, `comment` runs the ledger-driven bot that posts reports to
//! open pull requests.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ci_flake_reporter::config::{
    CommenterConfig, ReportConfig, TrackedRepo, DEFAULT_LEDGER_ARTIFACT, DEFAULT_PROGRESS_FILE,
    DEFAULT_SHARD_COUNT,
};
use ci_flake_reporter::error::AppResult;
use ci_flake_reporter::github::RepositoryClient;
use ci_flake_reporter::services::{commenter, report};

#[derive(Debug, Parser)]
#[command(
    name = "flake-reporter",
    version,
    about = "Aggregates JUnit artifacts from GitHub Actions into flake reports \
             and comments them on the pull requests that produced the failures."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Aggregate test artifacts into a flake report
    Report(ReportArgs),
    /// Comment flake reports on open pull requests, tracked by a ledger
    Comment(CommentArgs),
}

#[derive(Debug, Args)]
struct ReportArgs {
    /// Owner of the repository to analyze
    #[arg(short = 'n', long)]
    owner: Option<String>,
    /// Name of the repository to analyze
    #[arg(short, long)]
    repo: Option<String>,
    /// Personal access token for the repository's artifacts
    #[arg(short, long, env = "GITHUB_TOKEN", default_value = "", hide_env_values = true)]
    token: String,
    /// Include artifacts created at most this many days ago
    #[arg(long, default_value_t = 90)]
    from_days_ago: u32,
    /// Exclude artifacts created within this many days (0 keeps them all)
    #[arg(long, default_value_t = 0)]
    to_days_ago: u32,
    /// Test suite term artifact names must match
    #[arg(short = 'f', long, default_value = "")]
    test_suite_filter: String,
    /// Commit SHAs to include, joined with `|`
    #[arg(short, long, default_value = "")]
    commits: String,
    /// Restrict the pass to the commits of one pull request
    #[arg(short, long)]
    pull_request: Option<u64>,
    /// Also post the report as a comment on the pull request
    #[arg(long, requires = "pull_request")]
    post_comment: bool,
    /// Write the YAML report to this path instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Render the short report, without commit lists or captured output
    #[arg(long)]
    short: bool,
    /// Directory temporary downloads are placed under
    #[arg(short, long, default_value = "./")]
    download_dir: PathBuf,
    /// Aggregate zipped artifacts from this directory instead of GitHub
    #[arg(long)]
    import_dir: Option<PathBuf>,
    /// Sleep through API quota exhaustion instead of failing
    #[arg(long)]
    wait_for_quota: bool,
    /// Number of parallel download shards
    #[arg(long, default_value_t = DEFAULT_SHARD_COUNT)]
    shards: usize,
}

#[derive(Debug, Args)]
struct CommentArgs {
    /// Owner of the repository to analyze
    #[arg(short = 'n', long)]
    owner: String,
    /// Name of the repository to analyze
    #[arg(short, long)]
    repo: String,
    /// Personal access token for the repository to analyze
    #[arg(short, long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: String,
    /// Owner of the repository storing the progress ledger
    #[arg(short = 'm', long)]
    ledger_owner: String,
    /// Name of the repository storing the progress ledger
    #[arg(short = 'l', long)]
    ledger_repo: String,
    /// Token for the ledger repository (defaults to --token)
    #[arg(short = 'a', long)]
    ledger_token: Option<String>,
    /// Test suite term artifact names must match
    #[arg(short = 'f', long, default_value = "")]
    test_suite_filter: String,
    /// Name of the ledger artifact in the ledger repository
    #[arg(short = 'i', long, default_value = DEFAULT_LEDGER_ARTIFACT)]
    artifact_name: String,
    /// Path the updated ledger is written to
    #[arg(short = 'p', long, default_value = DEFAULT_PROGRESS_FILE)]
    progress_file: PathBuf,
    /// Directory temporary downloads are placed under
    #[arg(short, long, default_value = "./")]
    download_dir: PathBuf,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("failed to set tracing subscriber");
}

async fn run_report(args: ReportArgs) -> AppResult<()> {
    let now = Utc::now();
    let config = ReportConfig {
        owner: args.owner.unwrap_or_default(),
        repo: args.repo.unwrap_or_default(),
        token: args.token,
        from: Some(now - Duration::days(args.from_days_ago.into())),
        to: if args.to_days_ago == 0 {
            None
        } else {
            Some(now - Duration::days(args.to_days_ago.into()))
        },
        test_suite_filter: args.test_suite_filter,
        commit_filter: args.commits,
        pull_request: args.pull_request,
        report_file: args.output,
        download_dir: args.download_dir,
        import_dir: args.import_dir,
        wait_for_quota_reset: args.wait_for_quota,
        shards: args.shards,
    };

    let mut flake_report = report::load_report(&config).await?;
    report::generate(&mut flake_report)?;

    let yaml = if args.short {
        report::render_short(&flake_report)?
    } else {
        report::render_yaml(&flake_report)?
    };
    report::write_report(&yaml, config.report_file.as_deref())?;

    if args.post_comment {
        if let Some(number) = config.pull_request {
            let body = report::render_comment(&flake_report)?;
            let client =
                RepositoryClient::new(&config.token, &config.owner, &config.repo, false)?;
            client.create_comment(number, &body).await?;
        }
    }
    Ok(())
}

async fn run_comment(args: CommentArgs) -> AppResult<()> {
    let ledger_token = args.ledger_token.unwrap_or_else(|| args.token.clone());
    let config = CommenterConfig {
        ledger_owner: args.ledger_owner,
        ledger_repo: args.ledger_repo,
        ledger_token,
        artifact_name: args.artifact_name,
        progress_file: args.progress_file,
        download_dir: args.download_dir,
        repos: vec![TrackedRepo {
            owner: args.owner,
            repo: args.repo,
            token: args.token,
            test_name_matcher: args.test_suite_filter,
        }],
    };
    commenter::run_commenter(&config).await
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Report(args) => run_report(args).await,
        Command::Comment(args) => run_comment(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
