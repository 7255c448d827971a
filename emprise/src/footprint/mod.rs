//! Normalisation de l'emprise : sélection, mise à l'échelle, shrink-wrap

pub mod ring;
pub mod topology;

use geo::{Area, BooleanOps, Coord, LineString, MapCoords, MultiPolygon, Polygon};
use tracing::{debug, info};

use crate::error::EmpriseError;
use crate::geom;
use crate::types::Bounds;

/// Emprise canonique : polygone en mètres avec centroïde, aire et envergure
/// pré-calculés. Immuable, construite une fois par run.
#[derive(Debug, Clone)]
pub struct FootprintProfile {
    pub geometry: Polygon<f64>,
    pub centroid: Coord<f64>,
    pub area: f64,
    /// Dimension maximale de la boîte englobante (m)
    pub span: f64,
}

impl FootprintProfile {
    /// Construit le profil à partir d'un polygone déjà en mètres.
    /// La géométrie invalide est réparée, jamais rejetée d'office.
    pub fn from_polygon(polygon: Polygon<f64>) -> Result<Self, EmpriseError> {
        let repaired = geom::repair_polygon(&polygon)
            .ok_or_else(|| EmpriseError::empty_footprint("polygon has no usable area"))?;
        let area = repaired.unsigned_area();
        if area <= 0.0 {
            return Err(EmpriseError::empty_footprint("polygon area is zero"));
        }
        let centroid = geom::polygon_centroid(&repaired);
        let span = Bounds::of(&repaired)
            .map(|b| b.max_span())
            .unwrap_or_default();
        if span <= 0.0 {
            return Err(EmpriseError::empty_footprint("polygon span is zero"));
        }
        Ok(Self {
            geometry: repaired,
            centroid,
            area,
            span,
        })
    }

    /// Construit le profil depuis une liste de points (mètres).
    /// Les entrées dégénérées (< 3 points) échouent immédiatement.
    pub fn from_points(points: &[(f64, f64)]) -> Result<Self, EmpriseError> {
        if points.len() < 3 {
            return Err(EmpriseError::empty_footprint(
                "footprint needs at least three points",
            ));
        }
        let ring: Vec<Coord<f64>> = points.iter().map(|&(x, y)| Coord { x, y }).collect();
        Self::from_polygon(Polygon::new(LineString::new(ring), vec![]))
    }

    /// Construit le profil depuis le contenu d'un dessin : polygones fermés
    /// candidats plus une soupe de segments optionnelle pour resserrer le
    /// contour (shrink-wrap). `scale_m_per_unit` convertit les unités du
    /// dessin en mètres.
    pub fn from_drawing(
        polygons: Vec<Polygon<f64>>,
        lines: Vec<LineString<f64>>,
        scale_m_per_unit: f64,
    ) -> Result<Self, EmpriseError> {
        if scale_m_per_unit <= 0.0 {
            return Err(EmpriseError::invalid_parameter(
                "scale_m_per_unit",
                "must be > 0",
            ));
        }

        let scaled_polygons: Vec<Polygon<f64>> = polygons
            .into_iter()
            .map(|p| {
                p.map_coords(|c| Coord {
                    x: c.x * scale_m_per_unit,
                    y: c.y * scale_m_per_unit,
                })
            })
            .collect();
        let scaled_lines: Vec<LineString<f64>> = lines
            .into_iter()
            .map(|l| {
                l.map_coords(|c| Coord {
                    x: c.x * scale_m_per_unit,
                    y: c.y * scale_m_per_unit,
                })
            })
            .collect();

        let base = scaled_polygons
            .iter()
            .filter_map(geom::repair_polygon)
            .filter(|p| p.unsigned_area() > 0.0)
            .max_by(|a, b| {
                a.unsigned_area()
                    .partial_cmp(&b.unsigned_area())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or_else(|| {
                EmpriseError::empty_footprint("drawing contains no closed polygon with area")
            })?;

        let wrapped = shrinkwrap(&base, &scaled_lines);
        let profile = Self::from_polygon(wrapped)?;
        info!(
            area_sqm = geom::round_to(profile.area, 2),
            span_m = geom::round_to(profile.span, 2),
            "Using largest closed drawing footprint"
        );
        Ok(profile)
    }
}

/// Resserre `base` contre la soupe de segments : intersection avec l'union
/// des boucles refermées, repli sur un tampon des segments bruts quand les
/// boucles ne se referment pas, repli final sur `base`.
fn shrinkwrap(base: &Polygon<f64>, lines: &[LineString<f64>]) -> Polygon<f64> {
    if lines.is_empty() {
        return base.clone();
    }

    let span = Bounds::of(base).map(|b| b.max_span()).unwrap_or(1.0);
    let eps = (span * 0.02).max(0.05);

    let arcs: Vec<Vec<Coord<f64>>> = lines.iter().map(|l| l.0.clone()).collect();
    let rings = ring::assemble_rings(&arcs);
    let loops = topology::assign_holes(rings);

    let candidate = if loops.is_empty() {
        debug!("No closed loops in line soup; buffering raw segments");
        geom::buffer_lines(lines, eps)
    } else {
        let mut union = MultiPolygon::<f64>::new(Vec::new());
        for poly in loops {
            let single = MultiPolygon::new(vec![poly]);
            union = if union.0.is_empty() {
                single
            } else {
                union.union(&single)
            };
        }
        union
    };
    if candidate.unsigned_area() <= 0.0 {
        return base.clone();
    }

    // Petite dilatation pour absorber les jeux numériques du dessin
    let candidate = geom::offset_multi_polygon(&candidate, eps).unwrap_or(candidate);

    let base_multi = MultiPolygon::new(vec![base.clone()]);
    let clipped = base_multi.intersection(&candidate);
    match geom::largest_polygon(&clipped) {
        Some(poly) => poly,
        None => base.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(size: f64) -> Polygon<f64> {
        polygon![
            (x: 0.0, y: 0.0),
            (x: size, y: 0.0),
            (x: size, y: size),
            (x: 0.0, y: size),
        ]
    }

    #[test]
    fn test_from_points_rejects_degenerate() {
        let err = FootprintProfile::from_points(&[(0.0, 0.0), (1.0, 1.0)]).unwrap_err();
        assert!(matches!(err, EmpriseError::EmptyFootprint { .. }));
    }

    #[test]
    fn test_from_points_profile_fields() {
        let profile =
            FootprintProfile::from_points(&[(0.0, 0.0), (20.0, 0.0), (20.0, 10.0), (0.0, 10.0)])
                .unwrap();
        assert!((profile.area - 200.0).abs() < 1e-9);
        assert!((profile.span - 20.0).abs() < 1e-9);
        assert!((profile.centroid.x - 10.0).abs() < 1e-9);
        assert!((profile.centroid.y - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_drawing_scales_units() {
        // Carré de 10 unités à 0.3048 m/unité (pieds)
        let profile = FootprintProfile::from_drawing(vec![square(10.0)], vec![], 0.3048).unwrap();
        assert!((profile.span - 3.048).abs() < 1e-9);
    }

    #[test]
    fn test_from_drawing_picks_largest_polygon() {
        let profile =
            FootprintProfile::from_drawing(vec![square(2.0), square(8.0)], vec![], 1.0).unwrap();
        assert!((profile.area - 64.0).abs() < 1e-9);
    }

    #[test]
    fn test_shrinkwrap_clips_to_closed_loop() {
        // La boucle couvre la moitié gauche du carré de base
        let lines = vec![
            LineString::from(vec![(0.0, 0.0), (5.0, 0.0)]),
            LineString::from(vec![(5.0, 0.0), (5.0, 10.0)]),
            LineString::from(vec![(5.0, 10.0), (0.0, 10.0)]),
            LineString::from(vec![(0.0, 10.0), (0.0, 0.0)]),
        ];
        let profile = FootprintProfile::from_drawing(vec![square(10.0)], lines, 1.0).unwrap();
        // L'emprise resserrée doit être nettement plus petite que le carré complet
        assert!(profile.area < 70.0);
        assert!(profile.area > 40.0);
    }

    #[test]
    fn test_from_drawing_empty_fails() {
        let err = FootprintProfile::from_drawing(vec![], vec![], 1.0).unwrap_err();
        assert!(matches!(err, EmpriseError::EmptyFootprint { .. }));
    }
}
