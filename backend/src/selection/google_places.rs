//! Live fallback backed by the Google Places Nearby Search API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::Instrument;

use crate::{
    selection::{PlaceCandidate, PlaceQuery, PlaceSource, SelectionError},
    types::RestaurantId,
};

const SOURCE_NAME: &str = "google_places";
pub const DEFAULT_ENDPOINT: &str =
    "https://maps.googleapis.com/maps/api/place/nearbysearch/json";
/// Place types that say nothing about the cuisine.
const GENERIC_TYPES: &[&str] = &["restaurant", "food", "point_of_interest", "establishment"];

pub struct GooglePlacesSource {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl GooglePlacesSource {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Self::with_endpoint(api_key, timeout, DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(
        api_key: impl Into<String>,
        timeout: Duration,
        endpoint: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent("groupnom-backend/1.0")
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to initialize HTTP client: {}", e))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        })
    }

    fn unavailable(reason: impl Into<String>) -> SelectionError {
        SelectionError::UpstreamUnavailable {
            provider: SOURCE_NAME,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NearbyResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<GooglePlace>,
}

#[derive(Debug, Deserialize)]
struct GooglePlace {
    place_id: Option<String>,
    name: Option<String>,
    vicinity: Option<String>,
    geometry: Option<Geometry>,
    rating: Option<f64>,
    user_ratings_total: Option<u32>,
    price_level: Option<u8>,
    opening_hours: Option<OpeningHours>,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct OpeningHours {
    open_now: Option<bool>,
}

impl GooglePlace {
    /// Places without an id or coordinates are unusable and dropped.
    fn into_candidate(self) -> Option<PlaceCandidate> {
        let id = self.place_id?;
        let location = self.geometry?.location;
        let categories = self
            .types
            .into_iter()
            .filter(|t| !GENERIC_TYPES.contains(&t.as_str()))
            .collect();
        Some(PlaceCandidate {
            id: RestaurantId::new(id),
            name: self.name.unwrap_or_else(|| "Unknown Restaurant".to_string()),
            address: self
                .vicinity
                .unwrap_or_else(|| "Address not available".to_string()),
            city: None,
            lat: location.lat,
            lng: location.lng,
            categories,
            rating: self.rating,
            review_count: self.user_ratings_total,
            // Google uses 0 for free; our scale starts at 1.
            price_level: self.price_level.map(|p| p.clamp(1, 4)),
            open_now: self.opening_hours.and_then(|h| h.open_now),
            times_shown: 0,
            pick_rate: None,
            image_url: None,
        })
    }
}

/// Converts a parsed Nearby Search body into candidates.
fn candidates_from_response(body: NearbyResponse) -> Result<Vec<PlaceCandidate>, SelectionError> {
    match body.status.as_str() {
        "OK" | "ZERO_RESULTS" => Ok(body
            .results
            .into_iter()
            .filter_map(GooglePlace::into_candidate)
            .collect()),
        status => Err(GooglePlacesSource::unavailable(format!(
            "status {}: {}",
            status,
            body.error_message.unwrap_or_default()
        ))),
    }
}

#[async_trait]
impl PlaceSource for GooglePlacesSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn nearby(&self, query: &PlaceQuery) -> Result<Vec<PlaceCandidate>, SelectionError> {
        let location = format!("{},{}", query.lat, query.lng);
        let radius = query.radius_meters.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("location", location.as_str()),
            ("radius", radius.as_str()),
            ("type", "restaurant"),
            ("key", self.api_key.as_str()),
        ];
        if query.filters.open_now {
            params.push(("opennow", "true"));
        }

        let request = async {
            let response = self
                .client
                .get(&self.endpoint)
                .query(&params)
                .send()
                .await
                .map_err(|e| Self::unavailable(format!("request failed: {}", e.without_url())))?;
            if !response.status().is_success() {
                return Err(Self::unavailable(format!("HTTP {}", response.status())));
            }
            let body: NearbyResponse = response
                .json()
                .await
                .map_err(|e| Self::unavailable(format!("invalid body: {}", e.without_url())))?;
            candidates_from_response(body)
        };
        request
            .instrument(tracing::debug_span!(
                "google_places_nearby",
                radius = query.radius_meters
            ))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Vec<PlaceCandidate>, SelectionError> {
        candidates_from_response(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn maps_places_to_candidates() {
        let candidates = parse(
            r#"{
                "status": "OK",
                "results": [
                    {
                        "place_id": "abc",
                        "name": "Pok Pok",
                        "vicinity": "3226 SE Division St",
                        "geometry": {"location": {"lat": 45.5, "lng": -122.6}},
                        "rating": 4.4,
                        "user_ratings_total": 1200,
                        "price_level": 2,
                        "opening_hours": {"open_now": true},
                        "types": ["thai_restaurant", "restaurant", "food"]
                    },
                    {"name": "No id", "geometry": {"location": {"lat": 1.0, "lng": 1.0}}}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.id.as_str(), "abc");
        assert_eq!(c.categories, vec!["thai_restaurant".to_string()]);
        assert_eq!(c.review_count, Some(1200));
        assert_eq!(c.open_now, Some(true));
    }

    #[test]
    fn zero_results_is_empty_not_error() {
        assert!(parse(r#"{"status":"ZERO_RESULTS","results":[]}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn error_status_is_upstream_unavailable() {
        let err = parse(r#"{"status":"REQUEST_DENIED","error_message":"bad key"}"#).unwrap_err();
        match err {
            SelectionError::UpstreamUnavailable { provider, reason } => {
                assert_eq!(provider, "google_places");
                assert!(reason.contains("REQUEST_DENIED"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn free_price_level_maps_to_cheapest() {
        let candidates = parse(
            r#"{"status":"OK","results":[{"place_id":"x","geometry":{"location":{"lat":0.0,"lng":0.0}},"price_level":0}]}"#,
        )
        .unwrap();
        assert_eq!(candidates[0].price_level, Some(1));
    }
}
