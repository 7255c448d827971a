//! Chargement des données locales (GeoJSON) et index spatiaux

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use geo::{Contains, Coord, LineString, Point, Polygon};
use geojson::GeoJson;
use rstar::{RTree, RTreeObject, AABB};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use emprise::{
    Bounds, FetchError, FootprintProfile, ParcelFeature, ParcelSource, PropertyInfo,
    PropertyInfoSource, RoadSource,
};

/// Clés d'attributs reconnues comme code de zonage
const ZONING_KEYS: [&str; 3] = ["official_zoning", "ZONING", "ZONING_CODE"];

/// Entrée d'index spatial : position dans le Vec source + boîte englobante
struct IndexedItem {
    position: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedItem {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn envelope_of(bounds: Bounds) -> AABB<[f64; 2]> {
    AABB::from_corners([bounds.min_x, bounds.min_y], [bounds.max_x, bounds.max_y])
}

fn read_geojson(path: &Path) -> Result<geojson::FeatureCollection> {
    let content = std::fs::read_to_string(path)
        .context(format!("Failed to read GeoJSON file: {}", path.display()))?;
    let geojson: GeoJson = content
        .parse()
        .context(format!("Failed to parse GeoJSON: {}", path.display()))?;
    match geojson {
        GeoJson::FeatureCollection(collection) => Ok(collection),
        _ => bail!(
            "Expected a FeatureCollection in {}",
            path.display()
        ),
    }
}

/// Source de parcelles chargée depuis un fichier GeoJSON, indexée par R-tree
pub struct LocalParcelSource {
    parcels: Vec<ParcelFeature>,
    index: RTree<IndexedItem>,
}

impl LocalParcelSource {
    pub fn load(path: &Path) -> Result<Self> {
        let collection = read_geojson(path)?;
        let mut parcels: Vec<ParcelFeature> = Vec::new();

        for (position, feature) in collection.features.into_iter().enumerate() {
            let Some(geometry) = feature.geometry else {
                warn!(position, "Feature without geometry skipped");
                continue;
            };
            let geometry = match geo::Geometry::<f64>::try_from(&geometry.value) {
                Ok(geo::Geometry::Polygon(polygon)) => polygon,
                Ok(geo::Geometry::MultiPolygon(multi)) => {
                    match emprise::geom::largest_polygon(&multi) {
                        Some(polygon) => polygon,
                        None => {
                            warn!(position, "Empty multi-polygon skipped");
                            continue;
                        }
                    }
                }
                Ok(_) => {
                    warn!(position, "Non-polygon feature skipped");
                    continue;
                }
                Err(err) => {
                    warn!(position, error = %err, "Unreadable geometry skipped");
                    continue;
                }
            };

            let attributes: HashMap<String, Value> = feature
                .properties
                .map(|props| props.into_iter().collect())
                .unwrap_or_default();
            let object_id = attributes
                .get("OBJECTID")
                .and_then(Value::as_i64)
                .unwrap_or(position as i64 + 1);

            parcels.push(ParcelFeature {
                object_id,
                attributes,
                geometry,
            });
        }

        if parcels.is_empty() {
            bail!("No usable parcel in {}", path.display());
        }

        let items: Vec<IndexedItem> = parcels
            .iter()
            .enumerate()
            .filter_map(|(position, parcel)| {
                Bounds::of(&parcel.geometry).map(|bounds| IndexedItem {
                    position,
                    envelope: envelope_of(bounds),
                })
            })
            .collect();
        let index = RTree::bulk_load(items);

        info!(count = parcels.len(), file = %path.display(), "Parcels indexed");
        Ok(Self { parcels, index })
    }

    pub fn len(&self) -> usize {
        self.parcels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parcels.is_empty()
    }
}

impl ParcelSource for LocalParcelSource {
    fn fetch_target(&self, point: Coord<f64>) -> Result<Option<ParcelFeature>, FetchError> {
        let probe = Point::new(point.x, point.y);
        let hit = self
            .index
            .locate_in_envelope_intersecting(&AABB::from_point([point.x, point.y]))
            .map(|item| &self.parcels[item.position])
            .find(|parcel| parcel.geometry.contains(&probe));
        Ok(hit.cloned())
    }

    fn fetch_neighbors(
        &self,
        target: &ParcelFeature,
        buffer_m: f64,
        max_count: usize,
        include_target: bool,
    ) -> Result<Vec<ParcelFeature>, FetchError> {
        let center = target.centroid();
        let search = AABB::from_corners(
            [center.x - buffer_m, center.y - buffer_m],
            [center.x + buffer_m, center.y + buffer_m],
        );
        let mut found: Vec<ParcelFeature> = self
            .index
            .locate_in_envelope_intersecting(&search)
            .map(|item| &self.parcels[item.position])
            .filter(|parcel| {
                let c = parcel.centroid();
                (c.x - center.x).hypot(c.y - center.y) <= buffer_m
            })
            .filter(|parcel| include_target || parcel.object_id != target.object_id)
            .cloned()
            .collect();
        found.truncate(max_count);
        Ok(found)
    }
}

impl PropertyInfoSource for LocalParcelSource {
    /// Les informations foncières locales proviennent des attributs du
    /// GeoJSON : seul le code de zonage est normalisé sous `official_zoning`
    fn fetch(&self, parcel: &ParcelFeature) -> Result<PropertyInfo, FetchError> {
        let mut info = PropertyInfo::new();
        for key in ZONING_KEYS {
            if let Some(Value::String(code)) = parcel.attributes.get(key) {
                if !code.trim().is_empty() {
                    info.insert("official_zoning".to_string(), Value::from(code.clone()));
                    break;
                }
            }
        }
        Ok(info)
    }
}

/// Source de voirie chargée depuis un fichier GeoJSON de lignes
pub struct LocalRoadSource {
    lines: Vec<LineString<f64>>,
    index: RTree<IndexedItem>,
}

impl LocalRoadSource {
    pub fn load(path: &Path) -> Result<Self> {
        let collection = read_geojson(path)?;
        let mut lines: Vec<LineString<f64>> = Vec::new();

        for (position, feature) in collection.features.into_iter().enumerate() {
            let Some(geometry) = feature.geometry else {
                continue;
            };
            match geo::Geometry::<f64>::try_from(&geometry.value) {
                Ok(geo::Geometry::LineString(line)) => lines.push(line),
                Ok(geo::Geometry::MultiLineString(multi)) => lines.extend(multi.0),
                Ok(_) => warn!(position, "Non-line road feature skipped"),
                Err(err) => warn!(position, error = %err, "Unreadable road geometry skipped"),
            }
        }

        let items: Vec<IndexedItem> = lines
            .iter()
            .enumerate()
            .filter_map(|(position, line)| {
                Bounds::of(line).map(|bounds| IndexedItem {
                    position,
                    envelope: envelope_of(bounds),
                })
            })
            .collect();
        let index = RTree::bulk_load(items);

        info!(count = lines.len(), file = %path.display(), "Road lines indexed");
        Ok(Self { lines, index })
    }
}

impl RoadSource for LocalRoadSource {
    fn fetch(&self, bounds: Bounds) -> Result<Vec<LineString<f64>>, FetchError> {
        Ok(self
            .index
            .locate_in_envelope_intersecting(&envelope_of(bounds))
            .map(|item| self.lines[item.position].clone())
            .collect())
    }
}

/// Description JSON d'une emprise : contour simple ou dessin complet
#[derive(Debug, Deserialize)]
struct FootprintSpec {
    /// Contour fermé en mètres
    #[serde(default)]
    points: Vec<[f64; 2]>,
    /// Polygones candidats d'un dessin (unités du dessin)
    #[serde(default)]
    polygons: Vec<Vec<[f64; 2]>>,
    /// Soupe de segments pour le shrink-wrap
    #[serde(default)]
    lines: Vec<Vec<[f64; 2]>>,
    /// Mètres par unité du dessin
    #[serde(default = "default_scale")]
    scale_m_per_unit: f64,
}

fn default_scale() -> f64 {
    1.0
}

/// Charge le profil d'emprise depuis un fichier JSON
pub fn load_footprint(path: &Path) -> Result<FootprintProfile> {
    let content = std::fs::read_to_string(path)
        .context(format!("Failed to read footprint file: {}", path.display()))?;
    let spec: FootprintSpec = serde_json::from_str(&content)
        .context(format!("Failed to parse footprint JSON: {}", path.display()))?;

    let profile = if !spec.points.is_empty() {
        let points: Vec<(f64, f64)> = spec.points.iter().map(|&[x, y]| (x, y)).collect();
        FootprintProfile::from_points(&points)?
    } else {
        let polygons: Vec<Polygon<f64>> = spec
            .polygons
            .iter()
            .map(|ring| {
                Polygon::new(
                    LineString::from(
                        ring.iter().map(|&[x, y]| (x, y)).collect::<Vec<(f64, f64)>>(),
                    ),
                    vec![],
                )
            })
            .collect();
        let lines: Vec<LineString<f64>> = spec
            .lines
            .iter()
            .map(|line| {
                LineString::from(line.iter().map(|&[x, y]| (x, y)).collect::<Vec<(f64, f64)>>())
            })
            .collect();
        FootprintProfile::from_drawing(polygons, lines, spec.scale_m_per_unit)?
    };
    Ok(profile)
}
