//! Notation d'une pose candidate : enveloppe, aire, accès, alignements

use geo::{
    Area, BooleanOps, EuclideanDistance, EuclideanLength, LineInterpolatePoint, LineLocatePoint,
    LineString, MinimumRotatedRect, MultiPolygon, Point, Polygon, Relate,
};
use serde::{Deserialize, Serialize};

use crate::geom;

/// Pondérations du score composite
pub const WEIGHT_AREA: f64 = 0.25;
pub const WEIGHT_ACCESS: f64 = 0.20;
pub const WEIGHT_FRONT_ROAD: f64 = 0.20;
pub const WEIGHT_VISIBILITY: f64 = 0.20;
pub const WEIGHT_SHAPE: f64 = 0.15;

/// Décroissance du score d'accès, en points par mètre de distance à la voirie
pub const ACCESS_DECAY_PER_M: f64 = 5.0;

/// Dépassement d'enveloppe toléré avant disqualification (m²)
pub const ENVELOPE_TOLERANCE_SQM: f64 = 0.05;

/// Détail des sous-scores d'une pose. Les champs optionnels reflètent les
/// données réellement disponibles : pas de voirie, pas de distance d'accès.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Absent quand l'enveloppe est violée (la pose est disqualifiée)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope_fit: Option<f64>,
    pub envelope_outside_area_sqm: f64,
    pub area_efficiency: f64,
    pub area_ratio: f64,
    pub access_alignment: f64,
    pub access_distance_m: Option<f64>,
    pub road_segments_considered: usize,
    pub orientation_alignment: f64,
    pub orientation_delta_deg: f64,
    pub front_parcel_alignment: f64,
    pub front_parcel_delta_deg: f64,
    pub front_road_alignment: f64,
    pub front_visibility: f64,
    pub front_parallel_vector: [f64; 2],
    pub front_outward_vector: [f64; 2],
    pub front_reference_point: [f64; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front_road_segment: Option<[[f64; 2]; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front_road_direction: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front_visibility_vector: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front_road_normal: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoning_compatibility: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoning_code: Option<String>,
    pub composite_score: f64,
    pub disqualified: Option<String>,
}

/// Contexte de notation partagé entre toutes les poses d'une même parcelle
#[derive(Debug)]
pub struct ScoreContext<'a> {
    pub parcel: &'a Polygon<f64>,
    pub buildable: &'a MultiPolygon<f64>,
    pub parcel_area: f64,
    /// Voirie déjà filtrée (voir [`filter_roads`])
    pub roads: &'a [LineString<f64>],
    pub parcel_major_angle: f64,
    pub zoning: Option<&'a str>,
}

/// Ne garde que la voirie qui borde la parcelle sans la traverser.
/// Une ligne dont l'intérieur pénètre la parcelle (elle la croise ou y est
/// incluse) fausserait la distance d'accès.
pub fn filter_roads(parcel: &Polygon<f64>, roads: &[LineString<f64>]) -> Vec<LineString<f64>> {
    roads
        .iter()
        .filter(|road| !road.0.is_empty())
        .filter(|road| {
            let im = road.relate(parcel);
            !(im.is_intersects() && !im.is_touches())
        })
        .cloned()
        .collect()
}

/// Écart de score par degré d'écart angulaire (100 points sur 90°)
fn alignment_score(diff_deg: f64) -> f64 {
    (100.0 - diff_deg * (100.0 / 90.0)).max(0.0)
}

/// Aire du candidat débordant de l'enveloppe constructible
fn outside_area(candidate: &Polygon<f64>, buildable: &MultiPolygon<f64>) -> f64 {
    let single = MultiPolygon::new(vec![candidate.clone()]);
    let diff = std::panic::catch_unwind(|| single.difference(buildable).unsigned_area()).ok();
    match diff {
        Some(area) => area,
        // Les opérations booléennes peuvent échouer sur des entrées limites ;
        // on retombe sur aire totale moins aire couverte
        None => {
            let covered = std::panic::catch_unwind(|| {
                buildable.intersection(&single).unsigned_area()
            })
            .unwrap_or(0.0);
            (candidate.unsigned_area() - covered).max(0.0)
        }
    }
}

/// Note une pose candidate. `front_vector` est la normale sortante de la
/// façade avant, dans le repère de la pose (déjà tournée).
pub fn compute_scores(
    ctx: &ScoreContext<'_>,
    candidate: &Polygon<f64>,
    front_vector: (f64, f64),
) -> ScoreBreakdown {
    let footprint_area = {
        let a = candidate.unsigned_area();
        if a > 0.0 {
            a
        } else {
            1.0
        }
    };

    let outside = outside_area(candidate, ctx.buildable);
    let envelope_ok = outside <= ENVELOPE_TOLERANCE_SQM;

    let parcel_area = if ctx.parcel_area > 0.0 {
        ctx.parcel_area
    } else {
        1.0
    };
    let area_ratio = footprint_area / parcel_area;
    let area_score = if (0.35..=0.65).contains(&area_ratio) {
        100.0
    } else {
        (100.0 - (area_ratio - 0.5).abs() * 200.0).max(0.0)
    };

    let boundary = candidate.exterior();
    let (access_score, access_distance_m, road_segments_considered) = if !ctx.roads.is_empty() {
        let distance = ctx
            .roads
            .iter()
            .map(|road| boundary.euclidean_distance(road))
            .fold(f64::INFINITY, f64::min);
        let score = (100.0 - distance * ACCESS_DECAY_PER_M).max(0.0);
        (
            geom::round_to(score, 1),
            Some(geom::round_to(distance, 2)),
            ctx.roads.len(),
        )
    } else {
        (50.0, None, 0)
    };

    let footprint_major_angle = candidate
        .minimum_rotated_rect()
        .map(|rect| geom::major_axis_angle(&rect))
        .unwrap_or(0.0);

    let front_normal = geom::normalize_vector(front_vector);
    let front_tangent = geom::normalize_vector(geom::perpendicular(front_normal));
    let front_tangent_angle = geom::vector_angle_deg(front_tangent);
    let front_normal_angle = geom::vector_angle_deg(front_normal);

    let orientation_diff = geom::symmetric_angle_diff(footprint_major_angle, ctx.parcel_major_angle);
    let orientation_score = alignment_score(orientation_diff);

    let shape_diff = geom::symmetric_angle_diff(front_tangent_angle, ctx.parcel_major_angle);
    let shape_score = alignment_score(shape_diff);

    let centroid = geom::polygon_centroid(candidate);

    let nearest_road = ctx.roads.iter().min_by(|a, b| {
        candidate
            .euclidean_distance(*a)
            .partial_cmp(&candidate.euclidean_distance(*b))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut front_road_score = 50.0;
    let mut front_visibility_score = 50.0;
    let mut front_road_segment = None;
    let mut front_road_direction = None;
    let mut front_road_normal = None;
    let mut front_visibility_vector = None;

    if let Some(road) = nearest_road {
        if road.euclidean_length() > 0.0 {
            // Segment de voirie le plus proche du candidat
            let best_segment = road.lines().min_by(|a, b| {
                candidate
                    .euclidean_distance(a)
                    .partial_cmp(&candidate.euclidean_distance(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            if let Some(segment) = best_segment {
                let road_vec = geom::normalize_vector((
                    segment.end.x - segment.start.x,
                    segment.end.y - segment.start.y,
                ));
                let road_angle = geom::vector_angle_deg(road_vec);
                let road_diff = geom::symmetric_angle_diff(front_tangent_angle, road_angle);
                front_road_score = alignment_score(road_diff);
                front_road_segment = Some([
                    [segment.start.x, segment.start.y],
                    [segment.end.x, segment.end.y],
                ]);
                front_road_direction =
                    Some([geom::round_to(road_vec.0, 4), geom::round_to(road_vec.1, 4)]);
                let normal = geom::normalize_vector(geom::perpendicular(road_vec));
                front_road_normal =
                    Some([geom::round_to(normal.0, 4), geom::round_to(normal.1, 4)]);
            }

            // Visibilité : vecteur centroïde -> point de voirie le plus proche
            let centroid_point = Point::new(centroid.x, centroid.y);
            if let Some(fraction) = road.line_locate_point(&centroid_point) {
                if let Some(on_road) = road.line_interpolate_point(fraction) {
                    let to_road = geom::normalize_vector((
                        on_road.x() - centroid.x,
                        on_road.y() - centroid.y,
                    ));
                    front_visibility_vector =
                        Some([geom::round_to(to_road.0, 4), geom::round_to(to_road.1, 4)]);
                    let facing_diff = geom::symmetric_angle_diff(
                        front_normal_angle,
                        geom::vector_angle_deg(to_road),
                    );
                    front_visibility_score = alignment_score(facing_diff);
                }
            }
        }
    }

    let zoning = ctx
        .zoning
        .map(|z| z.trim().to_uppercase())
        .filter(|z| !z.is_empty());
    let (zoning_compatibility, zoning_code) = match zoning {
        Some(code) => {
            let score = if code.starts_with('C') {
                100.0
            } else if code.starts_with('R') {
                90.0
            } else {
                75.0
            };
            (Some(score), Some(code))
        }
        None => (None, None),
    };

    let mut composite = area_score * WEIGHT_AREA
        + access_score * WEIGHT_ACCESS
        + front_road_score * WEIGHT_FRONT_ROAD
        + front_visibility_score * WEIGHT_VISIBILITY
        + shape_score * WEIGHT_SHAPE;

    let (envelope_fit, disqualified) = if envelope_ok {
        (Some(100.0), None)
    } else {
        composite = 0.0;
        (None, Some("envelope_violation".to_string()))
    };

    ScoreBreakdown {
        envelope_fit,
        envelope_outside_area_sqm: geom::round_to(outside, 2),
        area_efficiency: geom::round_to(area_score, 1),
        area_ratio: geom::round_to(area_ratio, 3),
        access_alignment: access_score,
        access_distance_m,
        road_segments_considered,
        orientation_alignment: geom::round_to(orientation_score, 1),
        orientation_delta_deg: geom::round_to(orientation_diff, 1),
        front_parcel_alignment: geom::round_to(shape_score, 1),
        front_parcel_delta_deg: geom::round_to(shape_diff, 1),
        front_road_alignment: geom::round_to(front_road_score, 1),
        front_visibility: geom::round_to(front_visibility_score, 1),
        front_parallel_vector: [
            geom::round_to(front_tangent.0, 4),
            geom::round_to(front_tangent.1, 4),
        ],
        front_outward_vector: [
            geom::round_to(front_normal.0, 4),
            geom::round_to(front_normal.1, 4),
        ],
        front_reference_point: [geom::round_to(centroid.x, 3), geom::round_to(centroid.y, 3)],
        front_road_segment,
        front_road_direction,
        front_visibility_vector,
        front_road_normal,
        zoning_compatibility,
        zoning_code,
        composite_score: geom::round_to(composite, 1),
        disqualified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn parcel() -> Polygon<f64> {
        polygon![
            (x: 0.0, y: 0.0),
            (x: 40.0, y: 0.0),
            (x: 40.0, y: 25.0),
            (x: 0.0, y: 25.0),
        ]
    }

    fn context<'a>(
        parcel: &'a Polygon<f64>,
        buildable: &'a MultiPolygon<f64>,
        roads: &'a [LineString<f64>],
    ) -> ScoreContext<'a> {
        ScoreContext {
            parcel,
            buildable,
            parcel_area: parcel.unsigned_area(),
            roads,
            parcel_major_angle: 0.0,
            zoning: None,
        }
    }

    #[test]
    fn test_area_plateau_scores_full() {
        let parcel = parcel();
        let buildable = MultiPolygon::new(vec![parcel.clone()]);
        // 400 m² sur une parcelle de 1000 m² : ratio 0.4, dans le plateau
        let candidate = polygon![
            (x: 5.0, y: 2.0),
            (x: 25.0, y: 2.0),
            (x: 25.0, y: 22.0),
            (x: 5.0, y: 22.0),
        ];
        let scores = compute_scores(&context(&parcel, &buildable, &[]), &candidate, (0.0, -1.0));
        assert_eq!(scores.area_efficiency, 100.0);
        assert_eq!(scores.area_ratio, 0.4);
        assert!(scores.disqualified.is_none());
    }

    #[test]
    fn test_no_roads_defaults() {
        let parcel = parcel();
        let buildable = MultiPolygon::new(vec![parcel.clone()]);
        let candidate = polygon![
            (x: 5.0, y: 5.0),
            (x: 15.0, y: 5.0),
            (x: 15.0, y: 15.0),
            (x: 5.0, y: 15.0),
        ];
        let scores = compute_scores(&context(&parcel, &buildable, &[]), &candidate, (0.0, -1.0));
        assert_eq!(scores.access_alignment, 50.0);
        assert_eq!(scores.access_distance_m, None);
        assert_eq!(scores.road_segments_considered, 0);
        assert_eq!(scores.front_road_alignment, 50.0);
        assert_eq!(scores.front_visibility, 50.0);
    }

    #[test]
    fn test_adjacent_road_scores_access() {
        let parcel = parcel();
        let buildable = MultiPolygon::new(vec![parcel.clone()]);
        let candidate = polygon![
            (x: 0.0, y: 0.0),
            (x: 20.0, y: 0.0),
            (x: 20.0, y: 20.0),
            (x: 0.0, y: 20.0),
        ];
        // Voirie collée au bord sud du candidat
        let roads = vec![LineString::from(vec![(-10.0, 0.0), (50.0, 0.0)])];
        let scores = compute_scores(&context(&parcel, &buildable, &roads), &candidate, (0.0, -1.0));
        assert_eq!(scores.access_distance_m, Some(0.0));
        assert_eq!(scores.access_alignment, 100.0);
        // Façade avant orientée sud, voirie est-ouest : alignement parfait
        assert_eq!(scores.front_road_alignment, 100.0);
        assert_eq!(scores.front_visibility, 100.0);
    }

    #[test]
    fn test_envelope_violation_disqualifies() {
        let parcel = parcel();
        // Enveloppe réduite au quart sud-ouest
        let buildable = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 20.0, y: 0.0),
            (x: 20.0, y: 12.5),
            (x: 0.0, y: 12.5),
        ]]);
        let candidate = polygon![
            (x: 10.0, y: 5.0),
            (x: 35.0, y: 5.0),
            (x: 35.0, y: 20.0),
            (x: 10.0, y: 20.0),
        ];
        let scores = compute_scores(&context(&parcel, &buildable, &[]), &candidate, (0.0, -1.0));
        assert_eq!(scores.composite_score, 0.0);
        assert_eq!(scores.disqualified.as_deref(), Some("envelope_violation"));
        assert!(scores.envelope_fit.is_none());
        assert!(scores.envelope_outside_area_sqm > 0.0);
    }

    #[test]
    fn test_composite_in_range() {
        let parcel = parcel();
        let buildable = MultiPolygon::new(vec![parcel.clone()]);
        let candidate = polygon![
            (x: 2.0, y: 2.0),
            (x: 22.0, y: 2.0),
            (x: 22.0, y: 22.0),
            (x: 2.0, y: 22.0),
        ];
        let roads = vec![LineString::from(vec![(0.0, -5.0), (40.0, -5.0)])];
        let scores = compute_scores(&context(&parcel, &buildable, &roads), &candidate, (0.0, -1.0));
        assert!((0.0..=100.0).contains(&scores.composite_score));
    }

    #[test]
    fn test_filter_roads_drops_crossing_lines() {
        let parcel = parcel();
        let crossing = LineString::from(vec![(-5.0, 12.0), (45.0, 12.0)]);
        let touching = LineString::from(vec![(0.0, -1.0), (40.0, -1.0)]);
        let kept = filter_roads(&parcel, &[crossing, touching.clone()]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0], touching);
    }

    #[test]
    fn test_zoning_prefix_scores() {
        let parcel = parcel();
        let buildable = MultiPolygon::new(vec![parcel.clone()]);
        let candidate = polygon![
            (x: 5.0, y: 5.0),
            (x: 15.0, y: 5.0),
            (x: 15.0, y: 15.0),
            (x: 5.0, y: 15.0),
        ];
        for (code, expected) in [("C-2", 100.0), ("r1", 90.0), ("AG", 75.0)] {
            let mut ctx = context(&parcel, &buildable, &[]);
            ctx.zoning = Some(code);
            let scores = compute_scores(&ctx, &candidate, (0.0, -1.0));
            assert_eq!(scores.zoning_compatibility, Some(expected));
            assert_eq!(scores.zoning_code.as_deref(), Some(code.to_uppercase().as_str()));
        }
    }
}
