//! Tests d'intégration du crawl sur une grille de parcelles synthétique

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use geo::{polygon, Contains, Coord, LineString, Point, Polygon};
use serde_json::Value;

use emprise::events::{CycleArtifact, ParcelArtifact, RankingEntry};
use emprise::{
    ArtifactSink, CancelToken, CrawlConfig, CrawlEvent, FetchError, FootprintProfile,
    ParcelCrawler, ParcelFeature, ParcelSource, RoadCache, RoadSource, Termination,
};

/// Grille de parcelles carrées de `cell` mètres de côté
struct GridSource {
    cells: Vec<ParcelFeature>,
}

impl GridSource {
    fn new(rows: i64, cols: i64, cell: f64) -> Self {
        let mut cells = Vec::new();
        for row in 0..rows {
            for col in 0..cols {
                let x = col as f64 * cell;
                let y = row as f64 * cell;
                let geometry: Polygon<f64> = polygon![
                    (x: x, y: y),
                    (x: x + cell, y: y),
                    (x: x + cell, y: y + cell),
                    (x: x, y: y + cell),
                ];
                let mut attributes = HashMap::new();
                attributes.insert(
                    "PARCELID".to_string(),
                    Value::from(format!("P-{row:02}-{col:02}")),
                );
                attributes.insert(
                    "SITEADDRESS".to_string(),
                    Value::from(format!("{} Grid Ave", row * cols + col + 1)),
                );
                cells.push(ParcelFeature {
                    object_id: row * cols + col + 1,
                    attributes,
                    geometry,
                });
            }
        }
        Self { cells }
    }
}

impl ParcelSource for GridSource {
    fn fetch_target(&self, point: Coord<f64>) -> Result<Option<ParcelFeature>, FetchError> {
        Ok(self
            .cells
            .iter()
            .find(|cell| cell.geometry.contains(&Point::new(point.x, point.y)))
            .cloned())
    }

    fn fetch_neighbors(
        &self,
        target: &ParcelFeature,
        buffer_m: f64,
        max_count: usize,
        include_target: bool,
    ) -> Result<Vec<ParcelFeature>, FetchError> {
        let center = target.centroid();
        let mut found: Vec<ParcelFeature> = self
            .cells
            .iter()
            .filter(|cell| {
                let c = cell.centroid();
                (c.x - center.x).hypot(c.y - center.y) <= buffer_m
            })
            .filter(|cell| include_target || cell.object_id != target.object_id)
            .cloned()
            .collect();
        found.truncate(max_count);
        Ok(found)
    }
}

/// Réceptacle d'artefacts en mémoire
#[derive(Default)]
struct MemorySink {
    snapshots: AtomicUsize,
    finals: AtomicUsize,
    cycles: Mutex<Vec<CycleArtifact>>,
    rankings: Mutex<Vec<Vec<RankingEntry>>>,
}

impl ArtifactSink for MemorySink {
    fn parcel_snapshot(&self, _artifact: &ParcelArtifact) -> std::io::Result<()> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn parcel_final(&self, _artifact: &ParcelArtifact) -> std::io::Result<()> {
        self.finals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn cycle(&self, artifact: &CycleArtifact) -> std::io::Result<()> {
        self.cycles.lock().unwrap().push(artifact.clone());
        Ok(())
    }

    fn ranking(&self, entries: &[RankingEntry]) -> std::io::Result<()> {
        self.rankings.lock().unwrap().push(entries.to_vec());
        Ok(())
    }
}

fn profile() -> FootprintProfile {
    FootprintProfile::from_points(&[(0.0, 0.0), (12.0, 0.0), (12.0, 9.0), (0.0, 9.0)]).unwrap()
}

fn config(cycles: usize) -> CrawlConfig {
    CrawlConfig {
        cycles,
        buffer_meters: 40.0,
        rotation_step_deg: 90.0,
        setback_m: 0.0,
        skip_roads: true,
        workers: 2,
        ..Default::default()
    }
}

#[test]
fn test_crawl_emits_events_in_order() {
    let source = Arc::new(GridSource::new(4, 4, 30.0));
    let (sender, receiver) = std::sync::mpsc::channel();
    let mut crawler = ParcelCrawler::new(config(2), source).with_events(sender);
    let report = crawler
        .run(Coord { x: 45.0, y: 45.0 }, &profile(), None)
        .unwrap();
    drop(crawler);

    let events: Vec<CrawlEvent> = receiver.try_iter().collect();
    assert!(!events.is_empty());

    // Le premier événement concerne la parcelle graine
    match &events[0] {
        CrawlEvent::ParcelStarted { parcel_id, parcel } => {
            assert_eq!(parcel_id, "P-01-01");
            assert!(parcel["_area_sq_m"].is_number());
        }
        other => panic!("unexpected first event: {other:?}"),
    }

    // Chaque parcelle démarrée se termine (complétée ou en échec)
    let started = events
        .iter()
        .filter(|e| matches!(e, CrawlEvent::ParcelStarted { .. }))
        .count();
    let finished = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                CrawlEvent::ParcelCompleted { .. } | CrawlEvent::ParcelFailed { .. }
            )
        })
        .count();
    assert_eq!(started, finished);
    assert_eq!(started, report.visited_order.len());

    // best_updated implique placement_scored marqué is_best
    let best_updates = events
        .iter()
        .filter(|e| matches!(e, CrawlEvent::BestUpdated { .. }))
        .count();
    let best_scored = events
        .iter()
        .filter(|e| matches!(e, CrawlEvent::PlacementScored { is_best: true, .. }))
        .count();
    assert_eq!(best_updates, best_scored);
}

#[test]
fn test_cancellation_preserves_completed_cycles() {
    let source = Arc::new(GridSource::new(8, 8, 30.0));
    let token = CancelToken::new();
    let (sender, receiver) = std::sync::mpsc::channel();

    // Annule dès que le cycle 3 démarre
    let cancel_trigger = token.clone();
    let watcher = std::thread::spawn(move || {
        while let Ok(event) = receiver.recv() {
            if let CrawlEvent::CycleProgress { cycle, .. } = event {
                if cycle >= 3 {
                    cancel_trigger.cancel();
                }
            }
        }
    });

    let mut crawler = ParcelCrawler::new(config(6), source)
        .with_cancel_token(token)
        .with_events(sender);
    let report = crawler
        .run(Coord { x: 105.0, y: 105.0 }, &profile(), None)
        .unwrap();
    drop(crawler);
    watcher.join().unwrap();

    assert_eq!(report.termination, Termination::Cancelled);
    // Les deux premiers cycles sont acquis, le troisième est interrompu
    assert!(report.completed_cycles >= 2);
    assert!(report.completed_cycles < 6);
    assert!(!report.results.is_empty());
}

#[test]
fn test_sink_receives_cycles_and_rankings() {
    let source = Arc::new(GridSource::new(5, 5, 30.0));
    let sink = MemorySink::default();
    let mut crawler = ParcelCrawler::new(config(3), source);
    let report = crawler
        .run(Coord { x: 75.0, y: 75.0 }, &profile(), Some(&sink))
        .unwrap();

    assert!(sink.snapshots.load(Ordering::SeqCst) > 0);

    let cycles = sink.cycles.lock().unwrap();
    assert_eq!(cycles.len(), report.completed_cycles);
    // L'artefact de cycle liste toutes les parcelles visitées à ce stade
    for artifact in cycles.iter() {
        assert!(artifact.parcels.len() <= report.visited_order.len());
        for parcel in &artifact.parcels {
            assert!(report.visited_order.contains(&parcel.parcel_id));
        }
    }

    let rankings = sink.rankings.lock().unwrap();
    assert!(!rankings.is_empty());
    let last = rankings.last().unwrap();
    assert_eq!(last.len(), report.results.len());
    for pair in last.windows(2) {
        assert!(pair[0].average_composite >= pair[1].average_composite);
    }
}

#[test]
fn test_road_cache_feeds_access_scores() {
    struct StreetGrid;
    impl RoadSource for StreetGrid {
        fn fetch(
            &self,
            _bounds: emprise::Bounds,
        ) -> Result<Vec<LineString<f64>>, FetchError> {
            // Une rue est-ouest longeant le bas de la grille
            Ok(vec![LineString::from(vec![(-50.0, -2.0), (200.0, -2.0)])])
        }
    }

    let source = Arc::new(GridSource::new(2, 2, 30.0));
    let cache = RoadCache::new(vec![Arc::new(StreetGrid)]).with_min_interval(Duration::ZERO);
    let mut crawler = ParcelCrawler::new(
        CrawlConfig {
            skip_roads: false,
            ..config(1)
        },
        source,
    )
    .with_road_cache(cache);
    let report = crawler
        .run(Coord { x: 15.0, y: 15.0 }, &profile(), None)
        .unwrap();

    let seed = report.results.get("P-00-00").unwrap();
    assert!(!seed.roads.is_empty());
    let best = seed.best_placement().unwrap();
    assert!(best.scores.access_distance_m.is_some());
    assert_eq!(best.scores.road_segments_considered, 1);
}

#[test]
fn test_full_run_summary_consistency() {
    let source = Arc::new(GridSource::new(6, 6, 30.0));
    let mut crawler = ParcelCrawler::new(config(4), source);
    let report = crawler
        .run(Coord { x: 75.0, y: 75.0 }, &profile(), None)
        .unwrap();

    for result in report.results.values() {
        assert_eq!(result.summary.placements_evaluated, result.placements.len());
        assert_eq!(result.disqualified, result.placements.is_empty());
        for placement in &result.placements {
            let composite = placement.scores.composite_score;
            assert!((0.0..=100.0).contains(&composite));
            assert!(placement.scores.disqualified.is_none());
        }
        if let Some(best) = result.best_placement() {
            let max = result
                .placements
                .iter()
                .map(|p| p.scores.composite_score)
                .fold(f64::NEG_INFINITY, f64::max);
            assert_eq!(best.scores.composite_score, max);
        }
    }
}
