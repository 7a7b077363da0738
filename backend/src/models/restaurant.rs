use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::types::RestaurantId;

/// A candidate as presented to session participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    pub id: RestaurantId,
    pub name: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// 0-5, 0 when the source had no rating.
    pub rating: f64,
    pub review_count: u32,
    /// Display names, at most three.
    pub cuisines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub lat: f64,
    pub lng: f64,
    /// 1-4.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_level: Option<u8>,
    /// Distance from the session location in kilometres.
    pub distance_km: f64,
}

impl Restaurant {
    /// `"$$"` style rendering of the price level.
    pub fn price_label(&self) -> Option<String> {
        self.price_level.map(|level| "$".repeat(level as usize))
    }
}

/// `"thai_food"` -> `"Thai Food"`.
pub fn display_category(slug: &str) -> String {
    slug.split(['_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
