//! Cache de voirie : fusion des lignes, rotation des sources, backoff

use std::sync::Arc;
use std::time::{Duration, Instant};

use geo::LineString;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::types::Bounds;

/// Marge ajoutée autour des bornes demandées avant requête (m)
pub const FETCH_PAD_M: f64 = 120.0;
/// Envergure maximale du cache fusionné ; au-delà, on repart d'une zone propre
pub const MAX_MERGED_SPAN_M: f64 = 6000.0;
/// Nombre d'échecs consécutifs avant mise en backoff
pub const FAILURE_LIMIT: u32 = 3;
const BACKOFF_BASE_SECS: f64 = 5.0;
const BACKOFF_MAX_SECS: f64 = 60.0;
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(1);
const MAX_THROTTLE_SLEEP: Duration = Duration::from_millis(1500);

/// Source de lignes de voirie pour une zone donnée
pub trait RoadSource: Send + Sync {
    fn fetch(&self, bounds: Bounds) -> Result<Vec<LineString<f64>>, FetchError>;
}

/// Cache de voirie à l'échelle d'un run.
///
/// Les lignes récupérées sont fusionnées dans une nappe maîtresse qui ne
/// rétrécit jamais ; une requête couverte par la nappe est servie sans appel
/// réseau. Les sources sont essayées en rotation, et les échecs répétés
/// déclenchent un backoff pendant lequel toute requête retourne vide.
pub struct RoadCache {
    sources: Vec<Arc<dyn RoadSource>>,
    master_lines: Vec<LineString<f64>>,
    master_bounds: Option<Bounds>,
    failure_count: u32,
    backoff_until: Option<Instant>,
    last_fetch: Option<Instant>,
    endpoint_index: usize,
    min_interval: Duration,
    backoff_base: Duration,
}

impl RoadCache {
    pub fn new(sources: Vec<Arc<dyn RoadSource>>) -> Self {
        Self {
            sources,
            master_lines: Vec::new(),
            master_bounds: None,
            failure_count: 0,
            backoff_until: None,
            last_fetch: None,
            endpoint_index: 0,
            min_interval: DEFAULT_MIN_INTERVAL,
            backoff_base: Duration::from_secs_f64(BACKOFF_BASE_SECS),
        }
    }

    /// Raccourcit l'espacement minimal entre requêtes (tests)
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Raccourcit la fenêtre de backoff (tests)
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Repart d'un cache vierge : nappe maîtresse, compteur d'échecs et
    /// fenêtre de backoff. À appeler au début de chaque run.
    pub fn reset(&mut self) {
        self.master_lines.clear();
        self.master_bounds = None;
        self.failure_count = 0;
        self.backoff_until = None;
        self.last_fetch = None;
    }

    /// Lignes de voirie couvrant `bounds`, depuis le cache ou les sources.
    /// Ne retourne jamais d'erreur : un échec total donne une liste vide.
    pub fn fetch(&mut self, bounds: Bounds) -> Vec<LineString<f64>> {
        if self.sources.is_empty() {
            return Vec::new();
        }

        if let Some(until) = self.backoff_until {
            if Instant::now() < until {
                debug!("Road sources in backoff; returning no roads");
                return Vec::new();
            }
            self.backoff_until = None;
        }

        if let Some(master) = self.master_bounds {
            if master.contains(&bounds) {
                return self.subset(bounds);
            }
        }

        let fetch_bounds = bounds.expand(FETCH_PAD_M);
        // Fusionner avec la zone déjà couverte tant que la nappe reste bornée
        let fetch_bounds = match self.master_bounds {
            Some(master) => {
                let merged = master.merge(fetch_bounds);
                if merged.max_span() <= MAX_MERGED_SPAN_M {
                    merged
                } else {
                    fetch_bounds
                }
            }
            None => fetch_bounds,
        };

        self.throttle();

        let source_count = self.sources.len();
        for attempt in 0..source_count {
            let idx = (self.endpoint_index + attempt) % source_count;
            match self.sources[idx].fetch(fetch_bounds) {
                Ok(lines) => {
                    self.endpoint_index = idx;
                    self.last_fetch = Some(Instant::now());
                    self.failure_count = 0;
                    self.backoff_until = None;
                    self.merge(lines, fetch_bounds);
                    return self.subset(bounds);
                }
                Err(err) => {
                    self.failure_count += 1;
                    warn!(source = idx, error = %err, "Road source failed");
                }
            }
        }

        if self.failure_count >= FAILURE_LIMIT {
            let over = self.failure_count.saturating_sub(FAILURE_LIMIT) + 1;
            let delay = (self.backoff_base.as_secs_f64() * f64::from(over)).min(BACKOFF_MAX_SECS);
            self.backoff_until = Some(Instant::now() + Duration::from_secs_f64(delay));
            warn!(
                failures = self.failure_count,
                backoff_secs = delay,
                "All road sources failing; backing off"
            );
        }
        Vec::new()
    }

    /// Espacement minimal entre deux requêtes réseau
    fn throttle(&self) {
        if let Some(last) = self.last_fetch {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = (self.min_interval - elapsed).min(MAX_THROTTLE_SLEEP);
                std::thread::sleep(wait);
            }
        }
    }

    /// Intègre de nouvelles lignes dans la nappe maîtresse (jamais de retrait)
    fn merge(&mut self, lines: Vec<LineString<f64>>, covered: Bounds) {
        for line in lines {
            if !self.master_lines.contains(&line) {
                self.master_lines.push(line);
            }
        }
        self.master_bounds = Some(match self.master_bounds {
            Some(master) => master.merge(covered),
            None => covered,
        });
    }

    /// Lignes de la nappe dont la boîte englobante chevauche `bounds`
    fn subset(&self, bounds: Bounds) -> Vec<LineString<f64>> {
        self.master_lines
            .iter()
            .filter(|line| {
                Bounds::of(*line)
                    .map(|b| b.overlaps(&bounds, 0.0))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}
