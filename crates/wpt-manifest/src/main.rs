use clap::Parser;
use log::LevelFilter;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;
use wpt_manifest_lib::commands;
use wpt_manifest_lib::commands::app::AppError;
use wpt_manifest_lib::config::Config;
use wpt_manifest_lib::infrastructure::RepoError;

/// Top-level error type for the wpt-manifest CLI binary
#[derive(Debug, Error)]
enum CliError {
    /// Updating the manifest failed.
    #[error(transparent)]
    App(#[from] AppError),

    /// No tests root was given and none could be found.
    #[error(transparent)]
    Repo(#[from] RepoError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Parser)]
#[command(name = "wpt-manifest")]
#[command(
    about = "Build or update the manifest of tests in a web-platform-tests tree",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Manifest file to update [default: <TESTS_ROOT>/MANIFEST.json]
    #[arg(short, long, value_name = "FILE")]
    path: Option<PathBuf>,

    /// Root of the test tree [default: work tree of the enclosing git repository]
    #[arg(long, value_name = "DIR")]
    tests_root: Option<PathBuf>,

    /// Discard the existing manifest and index every file
    #[arg(short, long)]
    rebuild: bool,

    /// Leave uncommitted changes out of the manifest
    #[arg(long)]
    ignore_local: bool,

    /// Prefix the tests are served under
    #[arg(long, value_name = "PREFIX", default_value = "/")]
    url_base: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    init_logging(&cli);

    let cwd = std::env::current_dir()?;
    let config = Config::resolve(&cwd, cli.tests_root.as_deref(), cli.path.as_deref())?
        .with_url_base(&cli.url_base)
        .with_rebuild(cli.rebuild)
        .with_ignore_local(cli.ignore_local);

    commands::app::update(&config)?;
    Ok(())
}

/// Initialize logging based on the verbosity level specified in the CLI
fn init_logging(cli: &Cli) {
    let mut builder = env_logger::builder();
    builder
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .format(|buf, record| {
            let level = record.level();
            let style = &buf.default_level_style(level);
            writeln!(buf, "[{style}{level}{style:#}] {}", record.args())
        });

    if !cli.verbose {
        builder.format_timestamp(None);
    }

    builder.init();
}
