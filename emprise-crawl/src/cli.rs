//! Commandes du CLI : crawl complet et évaluation d'une parcelle

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use geo::{Coord, LineString};
use tracing::{info, warn};

use emprise::{
    ArtifactSink, Bounds, CrawlConfig, ParcelCrawler, ParcelSource, PropertyInfoSource, RoadCache,
    RotationLibrary,
};

use crate::output::{DirectoryArtifactSink, EventLog};
use crate::report::CrawlRunReport;
use crate::sources::{self, LocalParcelSource, LocalRoadSource};

#[derive(Subcommand)]
pub enum Commands {
    /// Évaluer une seule parcelle sans expansion
    Evaluate(EvaluateArgs),
}

/// Arguments du crawl complet (commande par défaut)
#[derive(Args)]
pub struct CrawlArgs {
    /// Fichier GeoJSON des parcelles (FeatureCollection de polygones)
    #[arg(long)]
    pub parcels: PathBuf,

    /// Fichier GeoJSON de voirie (FeatureCollection de lignes)
    #[arg(long)]
    pub roads: Option<PathBuf>,

    /// Fichier JSON décrivant l'emprise du bâtiment
    #[arg(long)]
    pub footprint: PathBuf,

    /// Abscisse du point graine (unités de la projection des parcelles)
    #[arg(long)]
    pub seed_x: f64,

    /// Ordonnée du point graine
    #[arg(long)]
    pub seed_y: f64,

    /// Fichier de configuration JSON (partiel accepté)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Répertoire de sortie
    #[arg(long, default_value = "output")]
    pub output: PathBuf,

    /// Nombre de cycles d'expansion (prioritaire sur la configuration)
    #[arg(long)]
    pub cycles: Option<usize>,

    /// Désactiver la notation liée à la voirie
    #[arg(long)]
    pub skip_roads: bool,

    /// Pas angulaire du balayage en degrés
    #[arg(long)]
    pub rotation_step: Option<f64>,

    /// Retrait réglementaire en mètres
    #[arg(long)]
    pub setback: Option<f64>,

    /// Threads de notation des poses
    #[arg(long)]
    pub score_workers: Option<usize>,

    /// Score composite minimal pour retenir une pose
    #[arg(long)]
    pub min_composite: Option<f64>,
}

/// Arguments de l'évaluation d'une parcelle unique
#[derive(Args)]
pub struct EvaluateArgs {
    /// Fichier GeoJSON des parcelles
    #[arg(long)]
    pub parcels: PathBuf,

    /// Fichier GeoJSON de voirie
    #[arg(long)]
    pub roads: Option<PathBuf>,

    /// Fichier JSON décrivant l'emprise du bâtiment
    #[arg(long)]
    pub footprint: PathBuf,

    /// Abscisse du point visé
    #[arg(long)]
    pub seed_x: f64,

    /// Ordonnée du point visé
    #[arg(long)]
    pub seed_y: f64,

    /// Fichier de configuration JSON (partiel accepté)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Répertoire de sortie
    #[arg(long, default_value = "output")]
    pub output: PathBuf,

    /// Désactiver la notation liée à la voirie
    #[arg(long)]
    pub skip_roads: bool,

    /// Pas angulaire du balayage en degrés
    #[arg(long)]
    pub rotation_step: Option<f64>,

    /// Retrait réglementaire en mètres
    #[arg(long)]
    pub setback: Option<f64>,

    /// Threads de notation des poses
    #[arg(long)]
    pub score_workers: Option<usize>,

    /// Score composite minimal pour retenir une pose
    #[arg(long)]
    pub min_composite: Option<f64>,
}

/// Charge la configuration : fichier JSON si fourni, valeurs par défaut sinon
fn load_config(path: Option<&Path>) -> Result<CrawlConfig> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .context(format!("Failed to read config file: {}", path.display()))?;
            let config: CrawlConfig = serde_json::from_str(&content)
                .context(format!("Failed to parse config: {}", path.display()))?;
            Ok(config)
        }
        None => Ok(CrawlConfig::default()),
    }
}

impl CrawlArgs {
    fn apply_to(&self, config: &mut CrawlConfig) {
        if let Some(cycles) = self.cycles {
            config.cycles = cycles;
        }
        if let Some(step) = self.rotation_step {
            config.rotation_step_deg = step;
        }
        if let Some(setback) = self.setback {
            config.setback_m = setback;
        }
        if let Some(workers) = self.score_workers {
            config.score_workers = workers;
        }
        if let Some(min) = self.min_composite {
            config.min_composite = min;
        }
        if self.skip_roads {
            config.skip_roads = true;
        }
    }
}

impl EvaluateArgs {
    fn apply_to(&self, config: &mut CrawlConfig) {
        if let Some(step) = self.rotation_step {
            config.rotation_step_deg = step;
        }
        if let Some(setback) = self.setback {
            config.setback_m = setback;
        }
        if let Some(workers) = self.score_workers {
            config.score_workers = workers;
        }
        if let Some(min) = self.min_composite {
            config.min_composite = min;
        }
        if self.skip_roads {
            config.skip_roads = true;
        }
    }
}

/// Construit le cache de voirie depuis un fichier local. Les fichiers locaux
/// ne sont pas soumis au lissage de débit.
fn build_road_cache(path: Option<&Path>, skip_roads: bool) -> Result<Option<RoadCache>> {
    if skip_roads {
        return Ok(None);
    }
    match path {
        Some(path) => {
            let source = LocalRoadSource::load(path)?;
            Ok(Some(
                RoadCache::new(vec![Arc::new(source)]).with_min_interval(Duration::ZERO),
            ))
        }
        None => {
            warn!("Aucun fichier de voirie fourni, les scores d'accès seront neutres");
            Ok(None)
        }
    }
}

pub fn cmd_crawl(args: &CrawlArgs) -> Result<()> {
    let start = Instant::now();

    let mut config = load_config(args.config.as_deref())?;
    args.apply_to(&mut config);

    let profile = sources::load_footprint(&args.footprint)?;
    info!(
        area_sqm = format!("{:.1}", profile.area),
        span_m = format!("{:.1}", profile.span),
        "Emprise chargée"
    );

    let parcels = Arc::new(LocalParcelSource::load(&args.parcels)?);

    let road_cache = build_road_cache(args.roads.as_deref(), config.skip_roads)?;
    if road_cache.is_none() {
        config.skip_roads = true;
    }

    let sink = DirectoryArtifactSink::new(&args.output)?;
    let (sender, receiver) = mpsc::channel();
    let event_log = EventLog::spawn(&args.output.join("events.ndjson"), receiver)?;

    let mut crawler = ParcelCrawler::new(config, parcels.clone())
        .with_info_source(parcels)
        .with_events(sender);
    if let Some(cache) = road_cache {
        crawler = crawler.with_road_cache(cache);
    }

    let crawl_report = crawler.run(
        Coord {
            x: args.seed_x,
            y: args.seed_y,
        },
        &profile,
        Some(&sink),
    )?;

    // Ferme le canal d'événements avant d'attendre le thread d'écriture
    drop(crawler);
    event_log.finish()?;

    let report = CrawlRunReport::from_crawl(&crawl_report, start.elapsed());
    report.print_summary();
    report.write_json(&args.output.join("run_report.json"))?;

    info!(output = %args.output.display(), "Crawl terminé");
    Ok(())
}

pub fn cmd_evaluate(args: &EvaluateArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    args.apply_to(&mut config);

    let profile = sources::load_footprint(&args.footprint)?;
    let source = LocalParcelSource::load(&args.parcels)?;

    let target = source
        .fetch_target(Coord {
            x: args.seed_x,
            y: args.seed_y,
        })?
        .ok_or_else(|| {
            anyhow!(
                "No parcel contains the point ({}, {})",
                args.seed_x,
                args.seed_y
            )
        })?;
    info!(parcel_id = %target.parcel_id(), "Parcelle cible résolue");

    let info = PropertyInfoSource::fetch(&source, &target)?;
    let rotations = RotationLibrary::build(&profile, config.rotation_step_deg, config.full_rotation)?;
    let front_vector = config.resolve_front_vector(&profile);
    let options = config.search_options();

    let mut road_cache = build_road_cache(args.roads.as_deref(), config.skip_roads)?;
    let mut fetcher = road_cache
        .as_mut()
        .map(|cache| move |bounds: Bounds| cache.fetch(bounds));
    let road_fetcher: Option<&mut dyn FnMut(Bounds) -> Vec<LineString<f64>>> = fetcher
        .as_mut()
        .map(|f| f as &mut dyn FnMut(Bounds) -> Vec<LineString<f64>>);

    let sink = DirectoryArtifactSink::new(&args.output)?;
    let result = emprise::search::evaluate_parcel(
        &target,
        &info,
        &profile,
        &rotations,
        front_vector,
        &options,
        road_fetcher,
        None,
        Some(&sink),
    );
    sink.parcel_final(&result.to_artifact())
        .context("Failed to write parcel artifact")?;

    info!(
        parcel_id = %result.summary.parcel_id,
        placements = result.summary.viable_count,
        top_composite = format!("{:.1}", result.summary.top_composite),
        disqualified = result.disqualified,
        "Évaluation terminée"
    );
    Ok(())
}
