//! Curated snapshot of places, loaded once at start-up.

use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use crate::{
    selection::{geo::haversine_km, PlaceCandidate, PlaceQuery, PlaceSource, SelectionError},
    types::RestaurantId,
};

/// Serves candidates from a JSON array of [`PlaceCandidate`]s and keeps a
/// per-place exposure counter that feeds discovery scoring.
pub struct CuratedPlaceSource {
    places: Vec<PlaceCandidate>,
    times_shown: RwLock<HashMap<RestaurantId, u32>>,
}

impl CuratedPlaceSource {
    pub fn new(places: Vec<PlaceCandidate>) -> Self {
        let times_shown = places
            .iter()
            .map(|p| (p.id.clone(), p.times_shown))
            .collect();
        Self {
            places,
            times_shown: RwLock::new(times_shown),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read place snapshot {}", path.display()))?;
        let places: Vec<PlaceCandidate> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid place snapshot {}", path.display()))?;
        tracing::info!(path = %path.display(), places = places.len(), "Loaded place snapshot");
        Ok(Self::new(places))
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    pub fn times_shown(&self, id: &RestaurantId) -> u32 {
        self.times_shown
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl PlaceSource for CuratedPlaceSource {
    fn name(&self) -> &'static str {
        "curated"
    }

    async fn nearby(&self, query: &PlaceQuery) -> Result<Vec<PlaceCandidate>, SelectionError> {
        let radius_km = f64::from(query.radius_meters) / 1000.0;
        let shown = self.times_shown.read().unwrap_or_else(|e| e.into_inner());
        Ok(self
            .places
            .iter()
            .filter(|p| haversine_km(query.lat, query.lng, p.lat, p.lng) <= radius_km)
            .map(|p| {
                let mut candidate = p.clone();
                candidate.times_shown = shown.get(&p.id).copied().unwrap_or(p.times_shown);
                candidate
            })
            .collect())
    }

    fn mark_shown(&self, ids: &[RestaurantId]) {
        let mut shown = self.times_shown.write().unwrap_or_else(|e| e.into_inner());
        for id in ids {
            *shown.entry(id.clone()).or_insert(0) += 1;
        }
    }
}
