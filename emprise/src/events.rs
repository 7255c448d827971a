//! Flux d'événements de progression et artefacts persistables

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::search::ParcelSummary;

/// Événement émis pendant un run. Sérialisé en JSON avec un discriminant
/// `type`, prêt pour un flux NDJSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrawlEvent {
    /// Une parcelle entre en évaluation
    ParcelStarted {
        parcel_id: String,
        parcel: Value,
    },
    /// Avancement intermédiaire sur une parcelle
    ParcelProgress {
        parcel_id: String,
        placements: usize,
        best_composite: f64,
    },
    /// Une pose vient d'être retenue
    PlacementScored {
        parcel_id: String,
        index: usize,
        rotation_deg: f64,
        offset_x_m: f64,
        offset_y_m: f64,
        composite_score: f64,
        is_best: bool,
        footprint_geojson: Value,
    },
    /// Une pose devient la meilleure connue pour la parcelle
    BestUpdated {
        parcel_id: String,
        index: usize,
        composite_score: f64,
        footprint_geojson: Value,
    },
    /// Fin d'évaluation d'une parcelle
    ParcelCompleted {
        parcel_id: String,
        placements: usize,
        top_composite: f64,
    },
    /// L'évaluation d'une parcelle a échoué ; le run continue
    ParcelFailed {
        parcel_id: String,
        error: String,
    },
    /// Avancement au sein d'un cycle d'expansion
    CycleProgress {
        cycle: usize,
        processed: usize,
        total: usize,
    },
    /// Avancement global (parcelles traitées / visitées)
    OverallProgress {
        current: usize,
        total: usize,
    },
}

/// Artefact complet d'une parcelle : fiche, synthèse, poses, meilleure emprise
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelArtifact {
    pub parcel: Value,
    pub summary: ParcelSummary,
    pub placements: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_footprint_geojson: Option<Value>,
}

/// Parcelle listée dans un artefact de cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleParcel {
    pub parcel_id: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ParcelSummary>,
}

/// État du crawl à la fin d'un cycle : toutes les parcelles visitées
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleArtifact {
    pub cycle: usize,
    pub parcels: Vec<CycleParcel>,
}

/// Ligne du classement des parcelles, triée par composite moyen décroissant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingEntry {
    pub parcel_id: String,
    pub address: String,
    pub average_composite: f64,
    pub max_composite: f64,
    pub viable_count: usize,
    pub top_rotation_deg: Option<f64>,
    pub top_offset_x_m: Option<f64>,
    pub top_offset_y_m: Option<f64>,
}

/// Réceptacle d'artefacts. Les implémentations écrivent typiquement sur
/// disque ; un échec d'écriture est journalisé par l'appelant, jamais fatal.
pub trait ArtifactSink: Send + Sync {
    /// Instantané d'une parcelle en cours d'évaluation (mis à jour en continu)
    fn parcel_snapshot(&self, artifact: &ParcelArtifact) -> io::Result<()>;
    /// Artefact final d'une parcelle évaluée
    fn parcel_final(&self, artifact: &ParcelArtifact) -> io::Result<()>;
    /// Artefact de fin de cycle
    fn cycle(&self, artifact: &CycleArtifact) -> io::Result<()>;
    /// Classement courant des parcelles
    fn ranking(&self, entries: &[RankingEntry]) -> io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = CrawlEvent::CycleProgress {
            cycle: 2,
            processed: 3,
            total: 8,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "cycle_progress");
        assert_eq!(value["cycle"], 2);
        assert_eq!(value["total"], 8);
    }

    #[test]
    fn test_placement_scored_round_trip() {
        let event = CrawlEvent::PlacementScored {
            parcel_id: "123".into(),
            index: 0,
            rotation_deg: 15.0,
            offset_x_m: -2.5,
            offset_y_m: 0.0,
            composite_score: 81.4,
            is_best: true,
            footprint_geojson: json!({"type": "Polygon", "coordinates": []}),
        };
        let text = serde_json::to_string(&event).unwrap();
        let back: CrawlEvent = serde_json::from_str(&text).unwrap();
        match back {
            CrawlEvent::PlacementScored { parcel_id, is_best, .. } => {
                assert_eq!(parcel_id, "123");
                assert!(is_best);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
