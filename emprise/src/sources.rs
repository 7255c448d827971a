//! Traits d'accès aux données cadastrales

use geo::Coord;

use crate::error::FetchError;
use crate::types::{ParcelFeature, PropertyInfo};

/// Source de parcelles cadastrales.
///
/// Les implémentations sont partagées entre threads de découverte ; toute
/// mutation interne (cache, connexion) doit être synchronisée.
pub trait ParcelSource: Send + Sync {
    /// Parcelle contenant le point donné, si elle existe
    fn fetch_target(&self, point: Coord<f64>) -> Result<Option<ParcelFeature>, FetchError>;

    /// Parcelles dans un rayon `buffer_m` autour de `target`, au plus
    /// `max_count`, `target` incluse ou non selon `include_target`
    fn fetch_neighbors(
        &self,
        target: &ParcelFeature,
        buffer_m: f64,
        max_count: usize,
        include_target: bool,
    ) -> Result<Vec<ParcelFeature>, FetchError>;
}

/// Source d'informations foncières complémentaires (zonage, propriétaire…)
pub trait PropertyInfoSource: Send + Sync {
    fn fetch(&self, parcel: &ParcelFeature) -> Result<PropertyInfo, FetchError>;
}
