//! Helpers géométriques : vecteurs, angles, réparation de polygones

use geo::{
    Area, BooleanOps, BoundingRect, Centroid, Coord, ConvexHull, Line, LineString, MultiPoint,
    MultiPolygon, Polygon,
};
use tracing::debug;

/// Arrondit `value` à `decimals` décimales
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Normalise un vecteur ; un vecteur quasi nul devient l'axe +X
pub fn normalize_vector(vec: (f64, f64)) -> (f64, f64) {
    let length = vec.0.hypot(vec.1);
    if length <= 1e-9 {
        return (1.0, 0.0);
    }
    (vec.0 / length, vec.1 / length)
}

/// Vecteur unitaire depuis un cap en degrés (0° = axe +X)
pub fn vector_from_angle(angle_deg: f64) -> (f64, f64) {
    let rad = angle_deg.to_radians();
    (rad.cos(), rad.sin())
}

/// Perpendiculaire directe (rotation de +90°)
pub fn perpendicular(vec: (f64, f64)) -> (f64, f64) {
    (-vec.1, vec.0)
}

/// Fait tourner un vecteur de `angle_deg` degrés
pub fn rotate_vector(vec: (f64, f64), angle_deg: f64) -> (f64, f64) {
    let rad = angle_deg.to_radians();
    let (sin_a, cos_a) = rad.sin_cos();
    (
        vec.0 * cos_a - vec.1 * sin_a,
        vec.0 * sin_a + vec.1 * cos_a,
    )
}

/// Cap d'un vecteur en degrés
pub fn vector_angle_deg(vec: (f64, f64)) -> f64 {
    vec.1.atan2(vec.0).to_degrees()
}

/// Ramène un angle dans [0, 360), arrondi au micro-degré
///
/// Idempotent : `normalize_angle(normalize_angle(a)) == normalize_angle(a)`.
pub fn normalize_angle(angle: f64) -> f64 {
    let mut value = angle % 360.0;
    if value < 0.0 {
        value += 360.0;
    }
    let rounded = round_to(value, 6);
    if rounded >= 360.0 {
        0.0
    } else {
        rounded
    }
}

/// Écart angulaire absolu dans [0, 180]
pub fn angle_diff_deg(a: f64, b: f64) -> f64 {
    let mut diff = (a - b).abs() % 360.0;
    if diff > 180.0 {
        diff = 360.0 - diff;
    }
    diff
}

/// Écart angulaire modulo 180° (directions non orientées), dans [0, 90]
pub fn symmetric_angle_diff(a: f64, b: f64) -> f64 {
    let mut diff = angle_diff_deg(a, b);
    if diff > 90.0 {
        diff = 180.0 - diff;
    }
    diff
}

/// Angle du grand axe d'un rectangle (typiquement un rectangle englobant
/// orienté) : l'arête la plus longue parmi les deux premières
pub fn major_axis_angle(rect: &Polygon<f64>) -> f64 {
    let coords = &rect.exterior().0;
    if coords.len() < 4 {
        return 0.0;
    }
    let edge1 = (coords[1].x - coords[0].x, coords[1].y - coords[0].y);
    let edge2 = (coords[2].x - coords[1].x, coords[2].y - coords[1].y);
    let major = if edge1.0.hypot(edge1.1) >= edge2.0.hypot(edge2.1) {
        edge1
    } else {
        edge2
    };
    vector_angle_deg(major)
}

/// Centroïde d'un polygone, avec repli sur le centre de la boîte englobante
pub fn polygon_centroid(polygon: &Polygon<f64>) -> Coord<f64> {
    if let Some(point) = polygon.centroid() {
        return Coord {
            x: point.x(),
            y: point.y(),
        };
    }
    match polygon.bounding_rect() {
        Some(rect) => rect.center(),
        None => Coord { x: 0.0, y: 0.0 },
    }
}

/// Plus grand polygone d'un multi-polygone (par aire)
pub fn largest_polygon(multi: &MultiPolygon<f64>) -> Option<Polygon<f64>> {
    multi
        .iter()
        .filter(|p| p.unsigned_area() > 0.0)
        .max_by(|a, b| {
            a.unsigned_area()
                .partial_cmp(&b.unsigned_area())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .cloned()
}

/// Détecte une auto-intersection du ring extérieur (segments non adjacents
/// qui se croisent)
fn ring_self_intersects(ring: &LineString<f64>) -> bool {
    use geo::algorithm::line_intersection::{line_intersection, LineIntersection};

    let lines: Vec<Line<f64>> = ring.lines().collect();
    let n = lines.len();
    for i in 0..n {
        for j in (i + 1)..n {
            // Segments adjacents (et premier/dernier d'un ring fermé) partagent
            // un sommet par construction
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            match line_intersection(lines[i], lines[j]) {
                Some(LineIntersection::SinglePoint { .. })
                | Some(LineIntersection::Collinear { .. }) => return true,
                None => {}
            }
        }
    }
    false
}

/// Répare un polygone invalide, équivalent du `buffer(0)` de Shapely :
/// reconstruction par offset nul, puis repli sur l'enveloppe convexe.
/// Retourne `None` si le résultat reste vide ou dégénéré.
pub fn repair_polygon(polygon: &Polygon<f64>) -> Option<Polygon<f64>> {
    if polygon.exterior().0.len() < 4 {
        return None;
    }

    if !ring_self_intersects(polygon.exterior()) {
        if polygon.unsigned_area() > 0.0 {
            return Some(polygon.clone());
        }
        return None;
    }

    debug!("Repairing self-intersecting polygon via zero-width offset");
    let rebuilt = std::panic::catch_unwind(|| geo_buffer::buffer_polygon(polygon, 0.0)).ok();
    if let Some(multi) = rebuilt {
        if let Some(best) = largest_polygon(&multi) {
            return Some(best);
        }
    }

    // Repli : enveloppe convexe des sommets du ring extérieur
    let points = MultiPoint::from(
        polygon
            .exterior()
            .0
            .iter()
            .map(|c| geo::Point::new(c.x, c.y))
            .collect::<Vec<_>>(),
    );
    let hull = points.convex_hull();
    if hull.unsigned_area() > 0.0 {
        Some(hull)
    } else {
        None
    }
}

/// Tampon grossier autour d'un ensemble de segments : un quadrilatère étendu
/// par segment, unionné. Suffisant comme repli de shrink-wrap quand les
/// boucles ne se referment pas.
pub fn buffer_lines(lines: &[LineString<f64>], eps: f64) -> MultiPolygon<f64> {
    let mut result = MultiPolygon::<f64>::new(Vec::new());
    for line in lines {
        for segment in line.lines() {
            let dir = normalize_vector((
                segment.end.x - segment.start.x,
                segment.end.y - segment.start.y,
            ));
            let normal = perpendicular(dir);
            let (sx, sy) = (
                segment.start.x - dir.0 * eps,
                segment.start.y - dir.1 * eps,
            );
            let (ex, ey) = (segment.end.x + dir.0 * eps, segment.end.y + dir.1 * eps);
            let quad = Polygon::new(
                LineString::from(vec![
                    (sx + normal.0 * eps, sy + normal.1 * eps),
                    (ex + normal.0 * eps, ey + normal.1 * eps),
                    (ex - normal.0 * eps, ey - normal.1 * eps),
                    (sx - normal.0 * eps, sy - normal.1 * eps),
                ]),
                vec![],
            );
            if quad.unsigned_area() <= 0.0 {
                continue;
            }
            let quad = MultiPolygon::new(vec![quad]);
            result = if result.0.is_empty() {
                quad
            } else {
                result.union(&quad)
            };
        }
    }
    result
}

/// Offset (positif: dilatation, négatif: érosion) d'un polygone par squelette
/// droit. `None` si le calcul échoue ou produit une géométrie vide ; le
/// squelette peut paniquer sur des entrées dégénérées, d'où le `catch_unwind`.
pub fn offset_polygon(polygon: &Polygon<f64>, distance: f64) -> Option<MultiPolygon<f64>> {
    let result = std::panic::catch_unwind(|| geo_buffer::buffer_polygon(polygon, distance)).ok()?;
    if result.unsigned_area() > 0.0 {
        Some(result)
    } else {
        None
    }
}

/// Variante multi-polygone de [`offset_polygon`]
pub fn offset_multi_polygon(
    multi: &MultiPolygon<f64>,
    distance: f64,
) -> Option<MultiPolygon<f64>> {
    let result =
        std::panic::catch_unwind(|| geo_buffer::buffer_multi_polygon(multi, distance)).ok()?;
    if result.unsigned_area() > 0.0 {
        Some(result)
    } else {
        None
    }
}

/// Convertit un polygone en géométrie GeoJSON
pub fn to_geojson(polygon: &Polygon<f64>) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::from(polygon))
}
