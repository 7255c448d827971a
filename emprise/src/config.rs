//! Configuration du crawl et de la recherche de poses

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::footprint::FootprintProfile;
use crate::geom;
use crate::search::SearchOptions;

/// Plafond dur sur le nombre de cycles d'expansion
pub const MAX_CYCLES: usize = 100;

/// Paramètres d'un run de crawl. Tous les champs ont une valeur par défaut,
/// un fichier de configuration partiel est donc accepté.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Nombre de cycles d'expansion autour de la parcelle graine
    pub cycles: usize,
    /// Rayon initial de recherche de voisins (m)
    pub buffer_meters: f64,
    /// Nombre maximal de voisins ramenés par requête
    pub max_neighbors: usize,
    /// Threads de découverte de voisins
    pub workers: usize,
    /// Threads de notation des poses (1 = séquentiel)
    pub score_workers: usize,
    /// Pas angulaire du balayage (degrés)
    pub rotation_step_deg: f64,
    /// Balayer 360° au lieu de 180°
    pub full_rotation: bool,
    /// Pas de la grille d'offsets, en fraction de l'envergure de l'emprise
    pub offset_step_scale: f64,
    /// Portée automatique de la grille, en multiples de l'envergure
    pub auto_offset_scale: f64,
    /// Pas de grille explicite (m), prioritaire sur `offset_step_scale`
    pub offset_step_m: Option<f64>,
    /// Portée de grille explicite (m)
    pub offset_range_m: Option<f64>,
    /// Déduire la portée de la taille de la parcelle
    pub auto_offset: bool,
    /// Retrait réglementaire appliqué au bord de parcelle (m)
    pub setback_m: f64,
    /// Score composite minimal pour retenir une pose
    pub min_composite: f64,
    /// Désactiver toute récupération de voirie
    pub skip_roads: bool,
    /// Cap de la façade avant en degrés (0° = axe +X)
    pub front_angle_deg: Option<f64>,
    /// Vecteur de façade avant explicite, prioritaire sur l'angle
    pub front_vector: Option<(f64, f64)>,
    /// Interpréter le vecteur de façade comme perpendiculaire à la façade
    pub frontage_perpendicular: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            cycles: 6,
            buffer_meters: 80.0,
            max_neighbors: 50,
            workers: 6,
            score_workers: 1,
            rotation_step_deg: 15.0,
            full_rotation: false,
            offset_step_scale: 0.2,
            auto_offset_scale: 2.0,
            offset_step_m: None,
            offset_range_m: None,
            auto_offset: true,
            setback_m: 3.0,
            min_composite: 0.0,
            skip_roads: false,
            front_angle_deg: None,
            front_vector: None,
            frontage_perpendicular: false,
        }
    }
}

impl CrawlConfig {
    /// Applique les bornes dures : le nombre de cycles est plafonné
    pub fn normalized(mut self) -> Self {
        if self.cycles > MAX_CYCLES {
            warn!(
                requested = self.cycles,
                cap = MAX_CYCLES,
                "Cycle count capped"
            );
            self.cycles = MAX_CYCLES;
        }
        self
    }

    /// Options de la recherche de poses dérivées de la configuration
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            setback_m: self.setback_m,
            offset_step_scale: self.offset_step_scale,
            auto_offset_scale: self.auto_offset_scale,
            offset_step_m: self.offset_step_m,
            offset_range_m: self.offset_range_m,
            auto_offset: self.auto_offset,
            min_composite: self.min_composite,
            score_workers: self.score_workers,
            skip_roads: self.skip_roads,
        }
    }

    /// Vecteur de façade avant : override explicite, puis cap en degrés, puis
    /// déduction automatique depuis le grand axe de l'emprise
    pub fn resolve_front_vector(&self, profile: &FootprintProfile) -> (f64, f64) {
        let base = if let Some(vector) = self.front_vector {
            geom::normalize_vector(vector)
        } else if let Some(angle) = self.front_angle_deg {
            geom::vector_from_angle(angle)
        } else {
            geom::vector_from_angle(geom::major_axis_angle(&profile.geometry))
        };
        if self.frontage_perpendicular {
            geom::perpendicular(base)
        } else {
            base
        }
    }
}
