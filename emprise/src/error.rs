//! Types d'erreurs pour le crate emprise

use thiserror::Error;

/// Erreurs fatales pouvant interrompre une recherche de placement
#[derive(Debug, Error)]
pub enum EmpriseError {
    /// La normalisation de l'emprise produit une géométrie d'aire nulle
    #[error("empty footprint: {reason}")]
    EmptyFootprint { reason: String },

    /// Impossible de résoudre la parcelle de départ
    #[error("seed resolution failed: {reason}")]
    SeedResolution { reason: String },

    /// Paramètre de configuration invalide
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Échec d'un appel réseau vers un collaborateur externe
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl EmpriseError {
    /// Crée une erreur d'emprise vide avec contexte
    pub fn empty_footprint(reason: impl Into<String>) -> Self {
        Self::EmptyFootprint {
            reason: reason.into(),
        }
    }

    /// Crée une erreur de résolution de la parcelle de départ
    pub fn seed_resolution(reason: impl Into<String>) -> Self {
        Self::SeedResolution {
            reason: reason.into(),
        }
    }

    /// Crée une erreur de paramètre invalide
    pub fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Échec transitoire d'une source externe (parcelles, routes, métadonnées)
///
/// Les échecs transitoires sont récupérables : le crawl dégrade (skip,
/// résultat vide, backoff) sans s'interrompre.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Échec réseau ou source momentanément indisponible
    #[error("transient fetch failure: {0}")]
    Transient(String),
}

impl FetchError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient(reason.into())
    }
}
