//! Types de données pour le crate emprise

use std::collections::HashMap;

use geo::{BoundingRect, Coord, Polygon, Rect};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Boîte englobante axis-aligned en coordonnées projetées (mètres)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Boîte englobante d'une géométrie, `None` si elle est vide
    pub fn of<G>(geometry: &G) -> Option<Self>
    where
        G: BoundingRect<f64, Output = Option<Rect<f64>>>,
    {
        geometry.bounding_rect().map(Self::from)
    }

    /// Boîte englobante commune à plusieurs boîtes
    pub fn union_all(bounds: impl IntoIterator<Item = Bounds>) -> Option<Self> {
        bounds.into_iter().reduce(|acc, b| acc.merge(b))
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Dimension maximale (largeur ou hauteur)
    pub fn max_span(&self) -> f64 {
        self.width().max(self.height())
    }

    /// Vrai si `inner` est entièrement contenue dans `self`
    pub fn contains(&self, inner: &Bounds) -> bool {
        inner.min_x >= self.min_x
            && inner.min_y >= self.min_y
            && inner.max_x <= self.max_x
            && inner.max_y <= self.max_y
    }

    /// Vrai si les deux boîtes se chevauchent, à `margin` près
    pub fn overlaps(&self, other: &Bounds, margin: f64) -> bool {
        !(other.max_x < self.min_x - margin
            || other.min_x > self.max_x + margin
            || other.max_y < self.min_y - margin
            || other.min_y > self.max_y + margin)
    }

    /// Boîte élargie de `pad` dans les quatre directions
    pub fn expand(&self, pad: f64) -> Self {
        Self {
            min_x: self.min_x - pad,
            min_y: self.min_y - pad,
            max_x: self.max_x + pad,
            max_y: self.max_y + pad,
        }
    }

    /// Plus petite boîte couvrant `self` et `other`
    pub fn merge(&self, other: Bounds) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Translate la boîte de (dx, dy)
    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self {
            min_x: self.min_x + dx,
            min_y: self.min_y + dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }
}

impl From<Rect<f64>> for Bounds {
    fn from(rect: Rect<f64>) -> Self {
        Self {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        }
    }
}

/// Métadonnées d'une parcelle fournies par un `PropertyInfoSource`
///
/// La clé `official_zoning` alimente le sous-score de compatibilité de zonage.
pub type PropertyInfo = HashMap<String, Value>;

/// Une parcelle cadastrale avec sa géométrie et ses attributs
///
/// Consommée en lecture seule : produite par un `ParcelSource` externe,
/// jamais modifiée par le moteur.
#[derive(Debug, Clone)]
pub struct ParcelFeature {
    /// Identifiant numérique interne de la source
    pub object_id: i64,

    /// Attributs bruts de la feature (clé -> valeur JSON)
    pub attributes: HashMap<String, Value>,

    /// Géométrie en coordonnées projetées (mètres)
    pub geometry: Polygon<f64>,
}

impl ParcelFeature {
    /// Adresse du site, première clé renseignée parmi les variantes connues
    pub fn address(&self) -> String {
        for key in ["SITEADDRESS", "SITE_ADDR", "ADDRESS"] {
            if let Some(Value::String(value)) = self.attributes.get(key) {
                if !value.trim().is_empty() {
                    return value.clone();
                }
            }
        }
        String::new()
    }

    /// Identifiant cadastral, avec repli sur l'object_id interne
    pub fn parcel_id(&self) -> String {
        for key in ["LOWPARCELID", "PARCELID"] {
            if let Some(Value::String(value)) = self.attributes.get(key) {
                if !value.trim().is_empty() {
                    return value.clone();
                }
            }
        }
        self.object_id.to_string()
    }

    /// Centroïde de la parcelle (repli sur le centre de la boîte englobante
    /// pour une géométrie dégénérée)
    pub fn centroid(&self) -> Coord<f64> {
        crate::geom::polygon_centroid(&self.geometry)
    }

    /// Fiche détaillée pour les artefacts JSON : attributs bruts enrichis de
    /// l'aire, du périmètre, de la boîte englobante et de la géométrie GeoJSON
    pub fn detail_record(&self, extra: &PropertyInfo) -> Value {
        use geo::{Area, EuclideanLength};

        let mut detail = serde_json::Map::new();
        for (key, value) in &self.attributes {
            detail.insert(key.clone(), value.clone());
        }
        detail
            .entry("OBJECTID".to_string())
            .or_insert_with(|| Value::from(self.object_id));
        detail.insert(
            "_area_sq_m".to_string(),
            Value::from(crate::geom::round_to(self.geometry.unsigned_area(), 2)),
        );
        detail.insert(
            "_perimeter_m".to_string(),
            Value::from(crate::geom::round_to(
                self.geometry.exterior().euclidean_length(),
                2,
            )),
        );
        if let Some(bounds) = Bounds::of(&self.geometry) {
            detail.insert(
                "_bounds".to_string(),
                serde_json::json!({
                    "xmin": bounds.min_x,
                    "ymin": bounds.min_y,
                    "xmax": bounds.max_x,
                    "ymax": bounds.max_y,
                }),
            );
        }
        detail.insert(
            "geometry".to_string(),
            serde_json::to_value(crate::geom::to_geojson(&self.geometry)).unwrap_or(Value::Null),
        );
        for (key, value) in extra {
            detail.insert(key.clone(), value.clone());
        }
        Value::Object(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square() -> Polygon<f64> {
        polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
        ]
    }

    #[test]
    fn test_bounds_contains_and_overlap() {
        let outer = Bounds::new(0.0, 0.0, 10.0, 10.0);
        let inner = Bounds::new(2.0, 2.0, 8.0, 8.0);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));

        let outside = Bounds::new(12.0, 0.0, 14.0, 4.0);
        assert!(!outer.overlaps(&outside, 0.0));
        assert!(outer.overlaps(&outside, 3.0));
    }

    #[test]
    fn test_bounds_merge_expand() {
        let a = Bounds::new(0.0, 0.0, 5.0, 5.0);
        let b = Bounds::new(3.0, -2.0, 9.0, 4.0);
        let merged = a.merge(b);
        assert_eq!(merged, Bounds::new(0.0, -2.0, 9.0, 5.0));
        assert_eq!(a.expand(1.0), Bounds::new(-1.0, -1.0, 6.0, 6.0));
    }

    #[test]
    fn test_parcel_id_fallback() {
        let mut attributes = HashMap::new();
        attributes.insert("SITEADDRESS".to_string(), Value::from("12 Main St"));
        let parcel = ParcelFeature {
            object_id: 42,
            attributes,
            geometry: square(),
        };
        assert_eq!(parcel.parcel_id(), "42");
        assert_eq!(parcel.address(), "12 Main St");
    }

    #[test]
    fn test_detail_record_has_derived_fields() {
        let parcel = ParcelFeature {
            object_id: 1,
            attributes: HashMap::new(),
            geometry: square(),
        };
        let detail = parcel.detail_record(&HashMap::new());
        assert_eq!(detail["_area_sq_m"], Value::from(100.0));
        assert_eq!(detail["_perimeter_m"], Value::from(40.0));
        assert_eq!(detail["_bounds"]["xmax"], Value::from(10.0));
    }
}
