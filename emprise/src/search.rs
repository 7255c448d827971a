//! Balayage des poses : grille d'offsets, évaluation, synthèse par parcelle

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::Sender;

use geo::{Area, Intersects, LineString, MinimumRotatedRect, MultiPolygon, Polygon, Translate};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::events::{ArtifactSink, CrawlEvent, ParcelArtifact};
use crate::footprint::FootprintProfile;
use crate::geom;
use crate::rotation::{RotatedFootprint, RotationLibrary};
use crate::score::{self, ScoreBreakdown, ScoreContext};
use crate::types::{Bounds, ParcelFeature, PropertyInfo};

/// Marge ajoutée autour de la parcelle pour la requête voirie (m)
const ROAD_PAD_EXTRA_M: f64 = 40.0;

/// Paramètres du balayage d'une parcelle
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub setback_m: f64,
    pub offset_step_scale: f64,
    pub auto_offset_scale: f64,
    pub offset_step_m: Option<f64>,
    pub offset_range_m: Option<f64>,
    pub auto_offset: bool,
    pub min_composite: f64,
    pub score_workers: usize,
    pub skip_roads: bool,
}

/// Grille d'offsets symétrique autour du centroïde de la parcelle
#[derive(Debug, Clone)]
pub struct OffsetGrid {
    /// Valeurs triées, dédupliquées, contenant toujours 0.0
    pub offsets: Vec<f64>,
    pub step: f64,
    pub range: f64,
    /// Marge du rejet rapide par boîtes englobantes
    pub bounds_margin: f64,
}

/// Calcule la grille d'offsets depuis l'envergure de l'emprise et l'étendue
/// de la zone constructible
pub fn compute_offset_grid(
    profile: &FootprintProfile,
    buildable: &MultiPolygon<f64>,
    options: &SearchOptions,
) -> OffsetGrid {
    let span = profile.span.max(1.0);
    let raw_step = match options.offset_step_m {
        Some(value) if value > 0.0 => value,
        _ => span * options.offset_step_scale,
    };
    let step = raw_step.max(0.5);

    let bounds = Bounds::of(buildable);
    let width = bounds.map(|b| b.width()).unwrap_or(0.0).max(0.1);
    let height = bounds.map(|b| b.height()).unwrap_or(0.0).max(0.1);
    let max_extent = width.max(height);

    let range = if options.auto_offset {
        (max_extent / 2.0 + step).min(span * options.auto_offset_scale)
    } else {
        match options.offset_range_m {
            Some(value) if value > 0.0 => value,
            _ => span.max(step * 4.0),
        }
    };
    let range = range.max(step);

    let mut offsets: Vec<f64> = Vec::new();
    let mut i = 0usize;
    loop {
        let value = -range + step * i as f64;
        if value >= range + step {
            break;
        }
        offsets.push(geom::round_to(value, 3));
        i += 1;
    }
    offsets.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    offsets.dedup();
    if !offsets.contains(&0.0) {
        offsets.push(0.0);
        offsets.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    }

    let bounds_margin = (step * 2.0).max(range * 0.3).max(3.0);
    OffsetGrid {
        offsets,
        step,
        range,
        bounds_margin,
    }
}

/// Zone constructible : parcelle érodée du retrait, repli sur la parcelle
/// brute si l'érosion la vide
pub fn buildable_envelope(parcel: &Polygon<f64>, setback_m: f64) -> MultiPolygon<f64> {
    if setback_m > 0.0 {
        if let Some(eroded) = geom::offset_polygon(parcel, -setback_m) {
            return eroded;
        }
    }
    MultiPolygon::new(vec![parcel.clone()])
}

/// Une pose retenue : transformation, aire, détail des scores, géométrie
#[derive(Debug, Clone)]
pub struct Placement {
    pub rotation_deg: f64,
    pub offset_x_m: f64,
    pub offset_y_m: f64,
    pub footprint_area_sqm: f64,
    pub scores: ScoreBreakdown,
    pub geometry: Polygon<f64>,
}

impl Placement {
    /// Représentation JSON de la pose, géométrie comprise
    pub fn to_json(&self) -> Value {
        json!({
            "rotation_deg": self.rotation_deg,
            "offset_x_m": self.offset_x_m,
            "offset_y_m": self.offset_y_m,
            "footprint_area_sqm": self.footprint_area_sqm,
            "scores": self.scores,
            "footprint_geojson": geom::to_geojson(&self.geometry),
        })
    }
}

/// Synthèse d'une parcelle évaluée
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelSummary {
    pub parcel_id: String,
    pub address: String,
    pub placements_evaluated: usize,
    pub offset_step_m: f64,
    pub offset_range_m: f64,
    pub viable_count: usize,
    pub average_composite: f64,
    pub max_composite: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_rotation_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_offset_x_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_offset_y_m: Option<f64>,
    pub top_composite: f64,
}

/// Résultat complet de l'évaluation d'une parcelle
#[derive(Debug, Clone)]
pub struct ParcelEvaluationResult {
    pub parcel: ParcelFeature,
    pub info: PropertyInfo,
    pub placements: Vec<Placement>,
    pub summary: ParcelSummary,
    pub best_index: Option<usize>,
    pub buildable: MultiPolygon<f64>,
    pub roads: Vec<LineString<f64>>,
    /// Aucune pose retenue
    pub disqualified: bool,
}

impl ParcelEvaluationResult {
    pub fn best_placement(&self) -> Option<&Placement> {
        self.best_index.and_then(|i| self.placements.get(i))
    }

    /// Artefact persistable de ce résultat
    pub fn to_artifact(&self) -> ParcelArtifact {
        ParcelArtifact {
            parcel: self.parcel.detail_record(&self.info),
            summary: self.summary.clone(),
            placements: self.placements.iter().map(Placement::to_json).collect(),
            best_footprint_geojson: self
                .best_placement()
                .map(|p| serde_json::to_value(geom::to_geojson(&p.geometry)).unwrap_or(Value::Null)),
        }
    }
}

fn summarize(
    parcel: &ParcelFeature,
    placements: &[Placement],
    step: f64,
    range: f64,
    best: Option<&Placement>,
) -> ParcelSummary {
    let composites: Vec<f64> = placements
        .iter()
        .map(|p| p.scores.composite_score)
        .collect();
    let (average, max) = if composites.is_empty() {
        (0.0, 0.0)
    } else {
        let sum: f64 = composites.iter().sum();
        let max = composites.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        (
            geom::round_to(sum / composites.len() as f64, 1),
            geom::round_to(max, 1),
        )
    };
    ParcelSummary {
        parcel_id: parcel.parcel_id(),
        address: parcel.address(),
        placements_evaluated: placements.len(),
        offset_step_m: geom::round_to(step, 3),
        offset_range_m: geom::round_to(range, 3),
        viable_count: placements.len(),
        average_composite: average,
        max_composite: max,
        top_rotation_deg: best.map(|p| p.rotation_deg),
        top_offset_x_m: best.map(|p| p.offset_x_m),
        top_offset_y_m: best.map(|p| p.offset_y_m),
        top_composite: best.map(|p| p.scores.composite_score).unwrap_or(0.0),
    }
}

/// Contexte immuable partagé entre toutes les poses d'une parcelle
struct PoseContext<'a> {
    score: ScoreContext<'a>,
    parcel_centroid: geo::Coord<f64>,
    parcel_bounds: Bounds,
    bounds_margin: f64,
    front_vector_base: (f64, f64),
    min_composite: f64,
}

/// Évalue une pose. `None` : hors zone, géométrie vide, disqualifiée ou sous
/// le seuil composite.
fn evaluate_pose(
    ctx: &PoseContext<'_>,
    rotation: &RotatedFootprint,
    dx: f64,
    dy: f64,
) -> Option<Placement> {
    let offset_x = ctx.parcel_centroid.x + dx - rotation.centroid.x;
    let offset_y = ctx.parcel_centroid.y + dy - rotation.centroid.y;

    // Rejet rapide avant toute opération géométrique coûteuse
    let translated_bounds = rotation.bounds.translate(offset_x, offset_y);
    if !ctx
        .parcel_bounds
        .overlaps(&translated_bounds, ctx.bounds_margin)
    {
        return None;
    }

    let translated = rotation.geometry.translate(offset_x, offset_y);
    let candidate = geom::repair_polygon(&translated)?;
    if !ctx.score.parcel.intersects(&candidate) {
        return None;
    }

    let rotated_front = geom::rotate_vector(ctx.front_vector_base, rotation.angle);
    let scores = score::compute_scores(&ctx.score, &candidate, rotated_front);
    if scores.disqualified.is_some() {
        return None;
    }
    if scores.composite_score < ctx.min_composite {
        return None;
    }

    Some(Placement {
        rotation_deg: geom::round_to(rotation.angle, 3),
        offset_x_m: geom::round_to(dx, 3),
        offset_y_m: geom::round_to(dy, 3),
        footprint_area_sqm: geom::round_to(candidate.unsigned_area(), 2),
        scores,
        geometry: candidate,
    })
}

/// Balaye toutes les poses (rotations × offsets²) d'une parcelle.
///
/// Les tâches sont évaluées en ordre fixe, en parallèle si `score_workers`
/// le demande ; l'enregistrement reste séquentiel, le départage des égalités
/// (première pose rencontrée) est donc déterministe.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_parcel(
    parcel: &ParcelFeature,
    info: &PropertyInfo,
    profile: &FootprintProfile,
    rotations: &RotationLibrary,
    front_vector: (f64, f64),
    options: &SearchOptions,
    mut road_fetcher: Option<&mut dyn FnMut(Bounds) -> Vec<LineString<f64>>>,
    events: Option<&Sender<CrawlEvent>>,
    sink: Option<&dyn ArtifactSink>,
) -> ParcelEvaluationResult {
    let parcel_id = parcel.parcel_id();
    let parcel_geom = &parcel.geometry;
    let parcel_area = {
        let a = parcel_geom.unsigned_area();
        if a > 0.0 {
            a
        } else {
            1.0
        }
    };
    let parcel_centroid = parcel.centroid();
    let parcel_bounds = Bounds::of(parcel_geom).unwrap_or(Bounds::new(0.0, 0.0, 0.0, 0.0));

    let buildable = buildable_envelope(parcel_geom, options.setback_m);
    let parcel_major_angle = parcel_geom
        .minimum_rotated_rect()
        .map(|rect| geom::major_axis_angle(&rect))
        .unwrap_or(0.0);

    let grid = compute_offset_grid(profile, &buildable, options);

    let mut roads: Vec<LineString<f64>> = Vec::new();
    if !options.skip_roads {
        if let Some(fetcher) = road_fetcher.as_mut() {
            let road_pad = grid.range + grid.step + ROAD_PAD_EXTRA_M;
            roads = fetcher(parcel_bounds.expand(road_pad));
        }
    }
    let scoring_roads = score::filter_roads(parcel_geom, &roads);

    let zoning = info
        .get("official_zoning")
        .and_then(Value::as_str)
        .map(str::to_owned);

    let ctx = PoseContext {
        score: ScoreContext {
            parcel: parcel_geom,
            buildable: &buildable,
            parcel_area,
            roads: &scoring_roads,
            parcel_major_angle,
            zoning: zoning.as_deref(),
        },
        parcel_centroid,
        parcel_bounds,
        bounds_margin: grid.bounds_margin,
        front_vector_base: geom::normalize_vector(front_vector),
        min_composite: options.min_composite,
    };

    if let Some(sender) = events {
        let _ = sender.send(CrawlEvent::ParcelStarted {
            parcel_id: parcel_id.clone(),
            parcel: parcel.detail_record(info),
        });
    }
    if let Some(sink) = sink {
        // Instantané initial : la parcelle apparaît dès le début du balayage
        let stub = ParcelArtifact {
            parcel: parcel.detail_record(info),
            summary: summarize(parcel, &[], grid.step, grid.range, None),
            placements: Vec::new(),
            best_footprint_geojson: None,
        };
        if let Err(err) = sink.parcel_snapshot(&stub) {
            debug!(parcel_id = %parcel_id, error = %err, "Initial snapshot failed");
        }
    }

    // Produit cartésien des offsets, puis énumération angle-majeure
    let mut offset_pairs: Vec<(f64, f64)> =
        Vec::with_capacity(grid.offsets.len() * grid.offsets.len());
    for &dx in &grid.offsets {
        for &dy in &grid.offsets {
            offset_pairs.push((dx, dy));
        }
    }
    let tasks: Vec<(usize, f64, f64)> = (0..rotations.len())
        .flat_map(|idx| offset_pairs.iter().map(move |&(dx, dy)| (idx, dx, dy)))
        .collect();

    let run_task = |&(idx, dx, dy): &(usize, f64, f64)| -> Option<Placement> {
        let rotation = &rotations.entries()[idx];
        match catch_unwind(AssertUnwindSafe(|| evaluate_pose(&ctx, rotation, dx, dy))) {
            Ok(placement) => placement,
            Err(_) => {
                error!(
                    parcel_id = %parcel_id,
                    angle = rotation.angle,
                    dx,
                    dy,
                    "Pose evaluation panicked; skipping pose"
                );
                None
            }
        }
    };

    let evaluated: Vec<Placement> = if options.score_workers > 1 && !tasks.is_empty() {
        info!(
            parcel_id = %parcel_id,
            poses = tasks.len(),
            workers = options.score_workers,
            "Evaluating candidate poses"
        );
        match ThreadPoolBuilder::new()
            .num_threads(options.score_workers)
            .build()
        {
            Ok(pool) => pool.install(|| tasks.par_iter().filter_map(run_task).collect()),
            Err(err) => {
                warn!(error = %err, "Scoring pool unavailable; falling back to serial");
                tasks.iter().filter_map(run_task).collect()
            }
        }
    } else {
        tasks.iter().filter_map(run_task).collect()
    };

    // Enregistrement séquentiel : suivi du meilleur et émission des événements
    let mut placements: Vec<Placement> = Vec::with_capacity(evaluated.len());
    let mut best_index: Option<usize> = None;
    let mut best_composite = f64::NEG_INFINITY;
    for placement in evaluated {
        placements.push(placement);
        let index = placements.len();
        let recorded = &placements[index - 1];
        let composite = recorded.scores.composite_score;
        let is_best = composite > best_composite;
        if is_best {
            best_composite = composite;
            best_index = Some(index - 1);
        }
        if let Some(sender) = events {
            let footprint_geojson = serde_json::to_value(geom::to_geojson(&recorded.geometry))
                .unwrap_or(Value::Null);
            let _ = sender.send(CrawlEvent::PlacementScored {
                parcel_id: parcel_id.clone(),
                index,
                rotation_deg: recorded.rotation_deg,
                offset_x_m: recorded.offset_x_m,
                offset_y_m: recorded.offset_y_m,
                composite_score: composite,
                is_best,
                footprint_geojson: footprint_geojson.clone(),
            });
            if is_best {
                let _ = sender.send(CrawlEvent::BestUpdated {
                    parcel_id: parcel_id.clone(),
                    index,
                    composite_score: composite,
                    footprint_geojson,
                });
            }
            let _ = sender.send(CrawlEvent::ParcelProgress {
                parcel_id: parcel_id.clone(),
                placements: index,
                best_composite,
            });
        }
        if let Some(sink) = sink {
            let best = best_index.and_then(|i| placements.get(i));
            let snapshot = ParcelArtifact {
                parcel: parcel.detail_record(info),
                summary: summarize(parcel, &placements, grid.step, grid.range, best),
                placements: placements.iter().map(Placement::to_json).collect(),
                best_footprint_geojson: best.map(|p| {
                    serde_json::to_value(geom::to_geojson(&p.geometry)).unwrap_or(Value::Null)
                }),
            };
            if let Err(err) = sink.parcel_snapshot(&snapshot) {
                debug!(parcel_id = %parcel_id, error = %err, "Snapshot write failed");
            }
        }
    }

    let best = best_index.and_then(|i| placements.get(i));
    let summary = summarize(parcel, &placements, grid.step, grid.range, best);

    if let Some(sender) = events {
        let _ = sender.send(CrawlEvent::ParcelCompleted {
            parcel_id: parcel_id.clone(),
            placements: placements.len(),
            top_composite: summary.top_composite,
        });
    }

    let disqualified = placements.is_empty();
    ParcelEvaluationResult {
        parcel: parcel.clone(),
        info: info.clone(),
        placements,
        summary,
        best_index,
        buildable,
        roads,
        disqualified,
    }
}
