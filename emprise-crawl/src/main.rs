//! Point d'entrée CLI pour emprise-crawl

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

mod cli;
mod output;
mod report;
mod sources;

use cli::{Commands, CrawlArgs};

/// Balayer une emprise de bâtiment sur des parcelles cadastrales
#[derive(Parser)]
#[command(name = "emprise-crawl")]
#[command(author, version)]
#[command(about = "Rechercher des placements d'emprise par expansion autour d'une parcelle (défaut) ou évaluer une seule parcelle")]
#[command(long_about = "Balaye une emprise de bâtiment (rotations × offsets) sur des parcelles cadastrales locales et s'étend de proche en proche autour de la parcelle de départ.\n\nPar défaut, lance un crawl complet. Utilisez 'evaluate' pour noter une seule parcelle.")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Sous-commande (défaut: crawl complet)
    #[command(subcommand)]
    command: Option<Commands>,

    /// Arguments du crawl (commande par défaut)
    #[command(flatten)]
    crawl: Option<CrawlArgs>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Some(Commands::Evaluate(args)) => {
            info!(parcels = %args.parcels.display(), "Évaluation d'une parcelle unique");
            cli::cmd_evaluate(&args)?;
        }
        None => {
            let args = cli
                .crawl
                .expect("Arguments de crawl requis (--parcels, --footprint, --seed-x, --seed-y)");
            info!(
                parcels = %args.parcels.display(),
                output = %args.output.display(),
                "Lancement du crawl"
            );
            cli::cmd_crawl(&args)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
