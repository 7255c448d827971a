//! # emprise
//!
//! Moteur de recherche de placement : balaye une emprise de bâtiment sur des
//! parcelles cadastrales et s'étend de proche en proche autour de la parcelle
//! de départ.
//!
//! ## Features
//!
//! - Normalisation de l'emprise (shrink-wrap, réparation des géométries)
//! - Balayage rotations × offsets avec rejet rapide par boîtes englobantes
//! - Notation multi-critères (enveloppe, aire, accès, alignements, zonage)
//! - Expansion par cycles, deux voisins retenus par graine
//! - Cache de voirie avec rotation des sources et backoff
//! - Flux d'événements et artefacts JSON en continu
//!
//! ## Usage
//!
//! ```rust,ignore
//! use emprise::{CrawlConfig, FootprintProfile, ParcelCrawler};
//! use geo::Coord;
//! use std::sync::Arc;
//!
//! let profile = FootprintProfile::from_points(&[(0.0, 0.0), (12.0, 0.0), (12.0, 9.0), (0.0, 9.0)])?;
//! let mut crawler = ParcelCrawler::new(CrawlConfig::default(), Arc::new(source));
//! let report = crawler.run(Coord { x: 0.0, y: 0.0 }, &profile, None)?;
//! println!("{} parcelles évaluées", report.results.len());
//! ```

pub mod config;
pub mod crawl;
pub mod error;
pub mod events;
pub mod footprint;
pub mod geom;
pub mod roads;
pub mod rotation;
pub mod score;
pub mod search;
pub mod sources;
pub mod types;

pub use config::CrawlConfig;
pub use crawl::{CancelToken, CrawlReport, ParcelCrawler, ParcelOutcome, Termination};
pub use error::{EmpriseError, FetchError};
pub use events::{ArtifactSink, CrawlEvent, CycleArtifact, ParcelArtifact, RankingEntry};
pub use footprint::FootprintProfile;
pub use roads::{RoadCache, RoadSource};
pub use rotation::RotationLibrary;
pub use score::ScoreBreakdown;
pub use search::{ParcelEvaluationResult, ParcelSummary, Placement, SearchOptions};
pub use sources::{ParcelSource, PropertyInfoSource};
pub use types::{Bounds, ParcelFeature, PropertyInfo};
