//! selmap command-line entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use selmap::{read_report, ChromiumRenderer, RenderConfig};
use selmap_cli::app::{run, RunArgs, RunOutcome};
use selmap_cli::config::{
    resolve_nav_timeout, resolve_output_path, resolve_report_path, resolve_template_path,
};

#[derive(Parser)]
#[command(
    name = "selmap",
    about = "Learn CSS selectors for labeled numbers from a reference report, then apply them",
    version
)]
struct Cli {
    /// Page to learn from and apply to (single-page mode).
    #[arg(long)]
    url: Option<String>,

    /// Reference report with `Label: value unit` lines.
    #[arg(long)]
    important: Option<String>,

    /// Selector template JSON.
    #[arg(long)]
    template: Option<String>,

    /// Output JSON.
    #[arg(long)]
    out: Option<String>,

    /// Re-learn selectors even if a template exists.
    #[arg(long)]
    learn: bool,

    /// Re-apply selectors even if the output exists.
    #[arg(long)]
    apply: bool,

    /// File listing target URLs, one per line. Enables batch mode.
    #[arg(long)]
    records: Option<String>,

    /// Navigation timeout in milliseconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Chromium binary to launch.
    #[arg(long)]
    chromium: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   selmap completions bash > ~/.local/share/bash-completion/completions/selmap
    ///   selmap completions zsh > ~/.zfunc/_selmap
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "selmap", &mut std::io::stdout());
        return Ok(());
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let report_path = resolve_report_path(cli.important.as_deref());
    let labels = read_report(&report_path)
        .with_context(|| format!("failed to read report {}", report_path.display()))?;
    tracing::info!("{} labels in {}", labels.len(), report_path.display());

    let args = RunArgs {
        url: cli.url,
        records: cli.records.map(PathBuf::from),
        template: resolve_template_path(cli.template.as_deref()),
        out: resolve_output_path(cli.out.as_deref()),
        learn: cli.learn,
        apply: cli.apply,
        nav_timeout_ms: resolve_nav_timeout(cli.timeout),
    };
    let render_config = RenderConfig {
        chromium_path: cli.chromium.map(PathBuf::from),
        ..RenderConfig::default()
    };

    let outcome = run(&args, &labels, || ChromiumRenderer::with_config(render_config)).await?;
    match outcome {
        RunOutcome::NothingToDo => {}
        RunOutcome::NoUrls(records) => println!("No URLs found in {}", records.display()),
        RunOutcome::Single { learned, applied } => {
            if learned {
                println!("Saved selectors template -> {}", args.template.display());
            }
            if applied {
                println!("Saved mapped labels -> {}", args.out.display());
            }
        }
        RunOutcome::Batch { learned } => {
            if learned {
                println!("Saved selectors template -> {}", args.template.display());
            }
            println!("Saved records mapping -> {}", args.out.display());
        }
    }
    Ok(())
}
