//! Bibliothèque de rotations pré-calculées de l'emprise

use std::collections::HashMap;

use geo::{Coord, Point, Polygon, Rotate};

use crate::error::EmpriseError;
use crate::footprint::FootprintProfile;
use crate::geom;
use crate::types::Bounds;

/// Une copie de l'emprise tournée d'un angle donné, avec centroïde et boîte
/// englobante mis en cache pour le rejet rapide par boîtes.
#[derive(Debug, Clone)]
pub struct RotatedFootprint {
    /// Angle normalisé dans [0, 360)
    pub angle: f64,
    pub geometry: Polygon<f64>,
    pub centroid: Coord<f64>,
    pub bounds: Bounds,
}

/// Rotations de l'emprise à pas fixe, indexées par angle normalisé.
///
/// La rotation se fait toujours autour du centroïde de l'emprise et préserve
/// l'aire. Pure fonction des entrées : reconstruire la bibliothèque avec les
/// mêmes paramètres redonne exactement les mêmes entrées.
#[derive(Debug)]
pub struct RotationLibrary {
    entries: Vec<RotatedFootprint>,
    index: HashMap<i64, usize>,
    step: f64,
    full_rotation: bool,
}

/// Clé d'index au micro-degré près, sur l'angle normalisé
fn angle_key(angle: f64) -> i64 {
    (geom::normalize_angle(angle) * 1e6).round() as i64
}

impl RotationLibrary {
    /// Pré-calcule les rotations `0, step, 2·step, …` jusqu'à 180° (ou 360°
    /// avec `full_rotation`, exclusif). Une emprise symétrique n'a besoin que
    /// d'un demi-tour.
    pub fn build(
        profile: &FootprintProfile,
        step_deg: f64,
        full_rotation: bool,
    ) -> Result<Self, EmpriseError> {
        if step_deg <= 0.0 {
            return Err(EmpriseError::invalid_parameter(
                "rotation_step_deg",
                "must be > 0",
            ));
        }
        let limit = if full_rotation { 360.0 } else { 180.0 };
        let origin = Point::new(profile.centroid.x, profile.centroid.y);

        let mut entries = Vec::new();
        let mut index = HashMap::new();
        let mut angle = 0.0;
        while angle < limit {
            let normalized = geom::normalize_angle(angle);
            let geometry = profile.geometry.rotate_around_point(normalized, origin);
            let centroid = geom::polygon_centroid(&geometry);
            let bounds = Bounds::of(&geometry).ok_or_else(|| {
                EmpriseError::empty_footprint("rotated footprint has empty bounds")
            })?;
            index.insert(angle_key(normalized), entries.len());
            entries.push(RotatedFootprint {
                angle: normalized,
                geometry,
                centroid,
                bounds,
            });
            angle += step_deg;
        }

        Ok(Self {
            entries,
            index,
            step: step_deg,
            full_rotation,
        })
    }

    /// Entrées ordonnées par angle croissant
    pub fn entries(&self) -> &[RotatedFootprint] {
        &self.entries
    }

    /// Recherche par angle (normalisé en interne)
    pub fn by_angle(&self, angle: f64) -> Option<&RotatedFootprint> {
        self.index.get(&angle_key(angle)).map(|&i| &self.entries[i])
    }

    pub fn step_deg(&self) -> f64 {
        self.step
    }

    pub fn is_full_rotation(&self) -> bool {
        self.full_rotation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
