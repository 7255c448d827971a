//! Affectation des rings en polygones avec trous

use std::cmp::Ordering;

use geo::{Area, Contains, LineString, Point, Polygon};

/// Organise des rings fermés en polygones. La profondeur d'imbrication d'un
/// ring (nombre de rings qui l'entourent) décide de son rôle : profondeur
/// paire, enveloppe ; impaire, trou de la plus petite enveloppe qui
/// l'entoure. Un ring posé dans un trou redevient ainsi une enveloppe à part
/// entière.
pub fn assign_holes(rings: Vec<LineString<f64>>) -> Vec<Polygon<f64>> {
    let shells: Vec<Polygon<f64>> = rings
        .iter()
        .map(|ring| Polygon::new(ring.clone(), vec![]))
        .collect();

    // Rings entourant chaque ring, testés sur son premier sommet
    let enclosing: Vec<Vec<usize>> = rings
        .iter()
        .enumerate()
        .map(|(i, ring)| {
            let Some(first) = ring.0.first() else {
                return Vec::new();
            };
            let probe = Point::new(first.x, first.y);
            (0..rings.len())
                .filter(|&j| j != i && shells[j].contains(&probe))
                .collect()
        })
        .collect();

    let is_shell: Vec<bool> = enclosing
        .iter()
        .map(|around| around.len() % 2 == 0)
        .collect();

    let mut holes: Vec<Vec<usize>> = vec![Vec::new(); rings.len()];
    for (i, around) in enclosing.iter().enumerate() {
        if is_shell[i] {
            continue;
        }
        let parent = around
            .iter()
            .copied()
            .filter(|&j| is_shell[j])
            .min_by(|&a, &b| {
                shells[a]
                    .unsigned_area()
                    .partial_cmp(&shells[b].unsigned_area())
                    .unwrap_or(Ordering::Equal)
            });
        if let Some(parent) = parent {
            holes[parent].push(i);
        }
    }

    rings
        .iter()
        .enumerate()
        .filter(|&(i, _)| is_shell[i])
        .map(|(i, ring)| {
            let interiors = holes[i].iter().map(|&h| rings[h].clone()).collect();
            Polygon::new(ring.clone(), interiors)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;

    fn ring(pts: &[(f64, f64)]) -> LineString<f64> {
        LineString::new(pts.iter().map(|&(x, y)| Coord { x, y }).collect())
    }

    fn square(min: f64, max: f64) -> LineString<f64> {
        ring(&[(min, min), (max, min), (max, max), (min, max), (min, min)])
    }

    #[test]
    fn test_single_ring() {
        let rings = vec![ring(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)])];
        let polygons = assign_holes(rings);
        assert_eq!(polygons.len(), 1);
        assert!(polygons[0].interiors().is_empty());
    }

    #[test]
    fn test_inner_ring_becomes_hole() {
        let polygons = assign_holes(vec![square(0.0, 10.0), square(4.0, 6.0)]);
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].interiors().len(), 1);
    }

    #[test]
    fn test_disjoint_rings_stay_separate() {
        let a = ring(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]);
        let b = ring(&[(5.0, 5.0), (6.0, 5.0), (6.0, 6.0), (5.0, 5.0)]);
        let polygons = assign_holes(vec![a, b]);
        assert_eq!(polygons.len(), 2);
    }

    #[test]
    fn test_ring_inside_a_hole_is_its_own_shell() {
        // Île dans un lac : profondeur 2, donc enveloppe à part entière
        let polygons = assign_holes(vec![
            square(0.0, 20.0),
            square(5.0, 15.0),
            square(8.0, 12.0),
        ]);
        assert_eq!(polygons.len(), 2);
        let with_hole: Vec<_> = polygons
            .iter()
            .filter(|p| !p.interiors().is_empty())
            .collect();
        assert_eq!(with_hole.len(), 1);
        assert_eq!(with_hole[0].interiors().len(), 1);
    }
}
