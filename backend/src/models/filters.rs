use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::validation::rules::{validate_cuisines, validate_price_levels};

/// Radius used when a client sends `distance: 0`.
pub const DEFAULT_DISTANCE_KM: f64 = 5.0;

/// Search criteria a session's candidate list was produced from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    /// Minimum rating on a 0-5 scale. 0 disables the check.
    #[serde(default)]
    #[validate(range(min = 0.0, max = 5.0))]
    pub min_rating: f64,
    #[serde(default)]
    pub open_now: bool,
    /// Upper bound on review count. 0 disables the bound; any positive
    /// value also switches ranking to favour lesser-known places.
    #[serde(default)]
    pub max_reviews: u32,
    /// Search radius in kilometres.
    #[serde(rename = "distance", default = "default_distance_km")]
    #[validate(range(min = 0.0, max = 50.0))]
    pub distance_km: f64,
    /// Accepted price levels, 1 (`$`) to 4 (`$$$$`). Empty accepts all.
    #[serde(default)]
    #[validate(custom(function = "validate_price_levels"))]
    pub price_level: Vec<u8>,
    #[serde(default)]
    #[validate(custom(function = "validate_cuisines"))]
    pub cuisines: Vec<String>,
}

fn default_distance_km() -> f64 {
    DEFAULT_DISTANCE_KM
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            min_rating: 0.0,
            open_now: false,
            max_reviews: 0,
            distance_km: DEFAULT_DISTANCE_KM,
            price_level: Vec::new(),
            cuisines: Vec::new(),
        }
    }
}

impl Filters {
    pub fn effective_radius_km(&self) -> f64 {
        if self.distance_km > 0.0 {
            self.distance_km
        } else {
            DEFAULT_DISTANCE_KM
        }
    }

    /// Whether the caller asked for lesser-reviewed places.
    pub fn wants_hidden_gems(&self) -> bool {
        self.max_reviews > 0
    }

    /// Cuisine tags in the slug form place sources use (`"Thai Food"` -> `"thai_food"`).
    pub fn cuisine_slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self
            .cuisines
            .iter()
            .map(|c| category_slug(c))
            .filter(|c| !c.is_empty())
            .collect();
        slugs.sort();
        slugs.dedup();
        slugs
    }
}

pub fn category_slug(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Latitude/longitude anchor of a search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct Location {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_deserialize_with_defaults() {
        let filters: Filters = serde_json::from_str("{}").unwrap();
        assert_eq!(filters, Filters::default());

        let filters: Filters = serde_json::from_str(
            r#"{"minRating":4,"openNow":true,"maxReviews":200,"distance":2.5,"priceLevel":[1,2],"cuisines":["Thai"]}"#,
        )
        .unwrap();
        assert_eq!(filters.min_rating, 4.0);
        assert!(filters.open_now);
        assert_eq!(filters.distance_km, 2.5);
        assert!(filters.wants_hidden_gems());
        assert!(filters.validate().is_ok());
    }

    #[test]
    fn filters_reject_out_of_range_values() {
        let filters = Filters {
            min_rating: 6.0,
            distance_km: 80.0,
            price_level: vec![0, 5],
            ..Filters::default()
        };
        let errors = filters.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("min_rating"));
        assert!(fields.contains_key("distance_km"));
        assert!(fields.contains_key("price_level"));
    }

    #[test]
    fn zero_distance_falls_back_to_default_radius() {
        let filters = Filters {
            distance_km: 0.0,
            ..Filters::default()
        };
        assert_eq!(filters.effective_radius_km(), DEFAULT_DISTANCE_KM);
    }

    #[test]
    fn cuisine_slugs_are_normalised_and_deduplicated() {
        let filters = Filters {
            cuisines: vec!["Thai Food".into(), "thai  food".into(), " ".into(), "BBQ".into()],
            ..Filters::default()
        };
        assert_eq!(filters.cuisine_slugs(), vec!["bbq", "thai_food"]);
    }

    #[test]
    fn location_bounds_are_validated() {
        assert!(Location { lat: 45.0, lng: -122.6 }.validate().is_ok());
        assert!(Location { lat: 91.0, lng: 0.0 }.validate().is_err());
        assert!(Location { lat: 0.0, lng: 181.0 }.validate().is_err());
    }
}
