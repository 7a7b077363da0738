//! Restaurant selection: turns a location and filters into the ordered
//! candidate list every participant of a session swipes through.

pub mod curated;
pub mod geo;
pub mod google_places;
pub mod outcomes;
pub mod scoring;
pub mod sourcing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

use crate::{
    models::{
        filters::category_slug,
        restaurant::{display_category, Restaurant},
        Filters,
    },
    types::RestaurantId,
};

pub use curated::CuratedPlaceSource;
pub use google_places::GooglePlacesSource;
pub use outcomes::{OutcomeRecorder, OutcomeStore};
pub use scoring::SelectionWeights;
pub use sourcing::{RestaurantSourcing, SourcedRestaurants};

/// Display categories carried over to a [`Restaurant`].
const MAX_DISPLAY_CUISINES: usize = 3;
const FALLBACK_CATEGORY: &str = "other";

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("no restaurants matched")]
    NoResults,
    #[error("{provider} unavailable: {reason}")]
    UpstreamUnavailable {
        provider: &'static str,
        reason: String,
    },
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// A place as reported by a [`PlaceSource`], before filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceCandidate {
    pub id: RestaurantId,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: Option<String>,
    pub lat: f64,
    pub lng: f64,
    /// Category slugs, primary first.
    #[serde(default)]
    pub categories: Vec<String>,
    /// 0-5.
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: Option<u32>,
    /// 1-4.
    #[serde(default)]
    pub price_level: Option<u8>,
    #[serde(default)]
    pub open_now: Option<bool>,
    #[serde(default)]
    pub times_shown: u32,
    #[serde(default)]
    pub pick_rate: Option<f64>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl PlaceCandidate {
    fn primary_category(&self) -> String {
        self.categories
            .first()
            .map(|c| category_slug(c))
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| FALLBACK_CATEGORY.to_string())
    }
}

/// What a source is asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_meters: u32,
    pub filters: Filters,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionRequest {
    pub lat: f64,
    pub lng: f64,
    pub filters: Filters,
    pub limit: usize,
}

impl SelectionRequest {
    fn place_query(&self) -> PlaceQuery {
        PlaceQuery {
            lat: self.lat,
            lng: self.lng,
            radius_meters: (self.filters.effective_radius_km() * 1000.0).round() as u32,
            filters: self.filters.clone(),
            limit: self.limit,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaceSource: Send + Sync {
    /// Short identifier used in logs and responses.
    fn name(&self) -> &'static str;

    /// Candidates around the query point. Sources may over-fetch; filtering
    /// and ranking happen in [`RestaurantSelector`].
    async fn nearby(&self, query: &PlaceQuery) -> Result<Vec<PlaceCandidate>, SelectionError>;

    /// Called with the ids that ended up in a session.
    fn mark_shown(&self, _ids: &[RestaurantId]) {}
}

#[derive(Debug, Clone)]
pub struct RestaurantSelector {
    balanced: SelectionWeights,
    hidden_gem: SelectionWeights,
}

impl Default for RestaurantSelector {
    fn default() -> Self {
        Self::new(SelectionWeights::balanced(), SelectionWeights::hidden_gem())
    }
}

struct Scored {
    candidate: PlaceCandidate,
    distance_km: f64,
    score: f64,
}

impl RestaurantSelector {
    pub fn new(balanced: SelectionWeights, hidden_gem: SelectionWeights) -> Self {
        Self {
            balanced,
            hidden_gem,
        }
    }

    pub async fn select_restaurants_for_session(
        &self,
        source: &dyn PlaceSource,
        request: &SelectionRequest,
    ) -> Result<Vec<Restaurant>, SelectionError> {
        if !request.lat.is_finite() || !request.lng.is_finite() {
            return Err(SelectionError::InvalidQuery(
                "location must be finite".to_string(),
            ));
        }
        if request.limit == 0 {
            return Err(SelectionError::InvalidQuery(
                "limit must be positive".to_string(),
            ));
        }

        let candidates = source.nearby(&request.place_query()).await?;
        let fetched = candidates.len();
        let restaurants = self.rank_candidates(candidates, request);
        tracing::debug!(
            source = source.name(),
            fetched,
            selected = restaurants.len(),
            limit = request.limit,
            "Ranked place candidates"
        );
        if restaurants.is_empty() {
            return Err(SelectionError::NoResults);
        }
        Ok(restaurants)
    }

    /// Filters, scores and orders `candidates`. Deterministic: equal scores
    /// fall back to id order.
    pub fn rank_candidates(
        &self,
        candidates: Vec<PlaceCandidate>,
        request: &SelectionRequest,
    ) -> Vec<Restaurant> {
        let filters = &request.filters;
        let radius_km = filters.effective_radius_km();
        let wanted_cuisines = filters.cuisine_slugs();
        let weights = if filters.wants_hidden_gems() {
            &self.hidden_gem
        } else {
            &self.balanced
        };

        let mut seen = HashSet::new();
        let mut scored: Vec<Scored> = candidates
            .into_iter()
            .filter(|c| seen.insert(c.id.clone()))
            .filter_map(|candidate| {
                let distance_km =
                    geo::haversine_km(request.lat, request.lng, candidate.lat, candidate.lng);
                if distance_km > radius_km || !passes_filters(&candidate, filters, &wanted_cuisines)
                {
                    return None;
                }
                let components = scoring::ScoreComponents::compute(
                    candidate.pick_rate,
                    candidate.rating,
                    candidate.times_shown,
                    distance_km,
                    radius_km,
                    candidate.review_count,
                );
                Some(Scored {
                    score: weights.score(&components),
                    candidate,
                    distance_km,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.candidate.id.cmp(&b.candidate.id))
        });

        let picked = if wanted_cuisines.len() >= 2 {
            round_robin_by_category(scored, request.limit)
        } else {
            scored.into_iter().take(request.limit).collect()
        };

        picked.into_iter().map(into_restaurant).collect()
    }
}

fn passes_filters(candidate: &PlaceCandidate, filters: &Filters, wanted_cuisines: &[String]) -> bool {
    if filters.min_rating > 0.0 {
        match candidate.rating {
            Some(rating) if rating >= filters.min_rating => {}
            _ => return false,
        }
    }
    if let (false, Some(level)) = (filters.price_level.is_empty(), candidate.price_level) {
        if !filters.price_level.contains(&level) {
            return false;
        }
    }
    if filters.open_now && candidate.open_now == Some(false) {
        return false;
    }
    if !wanted_cuisines.is_empty() {
        let matches = candidate.categories.iter().any(|category| {
            let slug = category_slug(category);
            wanted_cuisines.iter().any(|wanted| slug.contains(wanted.as_str()))
        });
        if !matches {
            return false;
        }
    }
    if filters.max_reviews > 0 {
        if let Some(reviews) = candidate.review_count {
            if reviews > filters.max_reviews {
                return false;
            }
        }
    }
    true
}

/// Takes the best of each primary category in turn. Categories are visited
/// in the order of their best candidate.
fn round_robin_by_category(scored: Vec<Scored>, limit: usize) -> Vec<Scored> {
    let mut order: Vec<String> = Vec::new();
    let mut buckets: BTreeMap<String, std::collections::VecDeque<Scored>> = BTreeMap::new();
    for item in scored {
        let category = item.candidate.primary_category();
        if !buckets.contains_key(&category) {
            order.push(category.clone());
        }
        buckets.entry(category).or_default().push_back(item);
    }

    let mut picked = Vec::with_capacity(limit);
    while picked.len() < limit {
        let mut progressed = false;
        for category in &order {
            if picked.len() >= limit {
                break;
            }
            if let Some(item) = buckets.get_mut(category).and_then(|b| b.pop_front()) {
                picked.push(item);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    picked
}

fn into_restaurant(scored: Scored) -> Restaurant {
    let Scored {
        candidate,
        distance_km,
        ..
    } = scored;
    let cuisines = candidate
        .categories
        .iter()
        .map(|c| display_category(c))
        .filter(|c| !c.is_empty())
        .take(MAX_DISPLAY_CUISINES)
        .collect();
    Restaurant {
        id: candidate.id,
        name: candidate.name,
        address: candidate.address,
        city: candidate.city,
        rating: candidate.rating.unwrap_or(0.0),
        review_count: candidate.review_count.unwrap_or(0),
        cuisines,
        image_url: candidate.image_url,
        lat: candidate.lat,
        lng: candidate.lng,
        price_level: candidate.price_level,
        distance_km: (distance_km * 100.0).round() / 100.0,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A candidate `offset_km` north of (45.5, -122.6).
    pub fn candidate(id: &str, category: &str, rating: f64, offset_km: f64) -> PlaceCandidate {
        PlaceCandidate {
            id: RestaurantId::from(id),
            name: format!("Place {id}"),
            address: "1 Test Way".into(),
            city: Some("Portland".into()),
            lat: 45.5 + offset_km / 111.19,
            lng: -122.6,
            categories: vec![category.to_string()],
            rating: Some(rating),
            review_count: Some(100),
            price_level: Some(2),
            open_now: Some(true),
            times_shown: 0,
            pick_rate: None,
            image_url: None,
        }
    }

    pub fn request(filters: Filters, limit: usize) -> SelectionRequest {
        SelectionRequest {
            lat: 45.5,
            lng: -122.6,
            filters,
            limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{candidate, request};
    use super::*;

    fn ids(restaurants: &[Restaurant]) -> Vec<&str> {
        restaurants.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn ranks_by_score_and_respects_limit() {
        let selector = RestaurantSelector::default();
        let ranked = selector.rank_candidates(
            vec![
                candidate("low", "thai", 3.0, 1.0),
                candidate("high", "thai", 4.9, 1.0),
                candidate("mid", "thai", 4.0, 1.0),
            ],
            &request(Filters::default(), 2),
        );
        assert_eq!(ids(&ranked), vec!["high", "mid"]);
    }

    #[test]
    fn ranking_is_deterministic_with_id_tiebreak() {
        let selector = RestaurantSelector::default();
        let input = vec![
            candidate("b", "thai", 4.0, 1.0),
            candidate("a", "thai", 4.0, 1.0),
            candidate("c", "thai", 4.0, 1.0),
        ];
        let first = selector.rank_candidates(input.clone(), &request(Filters::default(), 3));
        let mut reversed = input;
        reversed.reverse();
        let second = selector.rank_candidates(reversed, &request(Filters::default(), 3));
        assert_eq!(ids(&first), vec!["a", "b", "c"]);
        assert_eq!(first, second);
    }

    #[test]
    fn drops_candidates_beyond_radius() {
        let selector = RestaurantSelector::default();
        let filters = Filters {
            distance_km: 2.0,
            ..Filters::default()
        };
        let ranked = selector.rank_candidates(
            vec![
                candidate("near", "thai", 4.0, 1.0),
                candidate("far", "thai", 4.0, 3.0),
            ],
            &request(filters, 5),
        );
        assert_eq!(ids(&ranked), vec!["near"]);
        assert!((ranked[0].distance_km - 1.0).abs() < 0.02);
    }

    #[test]
    fn min_rating_excludes_unrated_and_low_rated() {
        let selector = RestaurantSelector::default();
        let mut unrated = candidate("unrated", "thai", 0.0, 1.0);
        unrated.rating = None;
        let filters = Filters {
            min_rating: 4.0,
            ..Filters::default()
        };
        let ranked = selector.rank_candidates(
            vec![unrated, candidate("ok", "thai", 4.0, 1.0), candidate("meh", "thai", 3.9, 1.0)],
            &request(filters, 5),
        );
        assert_eq!(ids(&ranked), vec!["ok"]);
    }

    #[test]
    fn price_open_now_and_review_filters_apply_when_known() {
        let selector = RestaurantSelector::default();
        let mut pricey = candidate("pricey", "thai", 4.0, 1.0);
        pricey.price_level = Some(4);
        let mut unpriced = candidate("unpriced", "thai", 4.0, 1.0);
        unpriced.price_level = None;
        let mut closed = candidate("closed", "thai", 4.0, 1.0);
        closed.open_now = Some(false);
        let mut popular = candidate("popular", "thai", 4.0, 1.0);
        popular.review_count = Some(10_000);

        let filters = Filters {
            price_level: vec![1, 2],
            open_now: true,
            max_reviews: 500,
            ..Filters::default()
        };
        let ranked = selector.rank_candidates(
            vec![pricey, unpriced, closed, popular, candidate("fine", "thai", 4.0, 1.0)],
            &request(filters, 10),
        );
        let mut got = ids(&ranked);
        got.sort();
        assert_eq!(got, vec!["fine", "unpriced"]);
    }

    #[test]
    fn cuisine_filter_matches_category_slugs() {
        let selector = RestaurantSelector::default();
        let filters = Filters {
            cuisines: vec!["Thai".into()],
            ..Filters::default()
        };
        let ranked = selector.rank_candidates(
            vec![
                candidate("t", "thai_restaurant", 4.0, 1.0),
                candidate("p", "pizza", 4.0, 1.0),
            ],
            &request(filters, 5),
        );
        assert_eq!(ids(&ranked), vec!["t"]);
        assert_eq!(ranked[0].cuisines, vec!["Thai Restaurant".to_string()]);
    }

    #[test]
    fn two_cuisines_alternate_categories() {
        let selector = RestaurantSelector::default();
        let filters = Filters {
            cuisines: vec!["thai".into(), "pizza".into()],
            ..Filters::default()
        };
        let ranked = selector.rank_candidates(
            vec![
                candidate("t1", "thai", 4.9, 1.0),
                candidate("t2", "thai", 4.8, 1.0),
                candidate("t3", "thai", 4.7, 1.0),
                candidate("p1", "pizza", 3.5, 1.0),
                candidate("p2", "pizza", 3.4, 1.0),
            ],
            &request(filters, 4),
        );
        assert_eq!(ids(&ranked), vec!["t1", "p1", "t2", "p2"]);
    }

    #[test]
    fn duplicate_ids_are_collapsed() {
        let selector = RestaurantSelector::default();
        let ranked = selector.rank_candidates(
            vec![candidate("x", "thai", 4.0, 1.0), candidate("x", "thai", 4.5, 1.0)],
            &request(Filters::default(), 5),
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].rating, 4.0);
    }

    #[tokio::test]
    async fn empty_result_is_no_results() {
        let mut source = MockPlaceSource::new();
        source.expect_name().return_const("mock");
        source
            .expect_nearby()
            .returning(|_| Ok(vec![candidate("far", "thai", 4.0, 40.0)]));

        let err = RestaurantSelector::default()
            .select_restaurants_for_session(&source, &request(Filters::default(), 5))
            .await
            .unwrap_err();
        assert!(matches!(err, SelectionError::NoResults));
    }

    #[tokio::test]
    async fn query_carries_radius_in_meters() {
        let mut source = MockPlaceSource::new();
        source.expect_name().return_const("mock");
        source
            .expect_nearby()
            .withf(|q| q.radius_meters == 2500 && q.limit == 3)
            .times(1)
            .returning(|_| Ok(vec![candidate("a", "thai", 4.0, 1.0)]));

        let filters = Filters {
            distance_km: 2.5,
            ..Filters::default()
        };
        let restaurants = RestaurantSelector::default()
            .select_restaurants_for_session(&source, &request(filters, 3))
            .await
            .unwrap();
        assert_eq!(restaurants.len(), 1);
    }

    #[tokio::test]
    async fn zero_limit_is_rejected_before_querying() {
        let mut source = MockPlaceSource::new();
        source.expect_nearby().never();
        let err = RestaurantSelector::default()
            .select_restaurants_for_session(&source, &request(Filters::default(), 0))
            .await
            .unwrap_err();
        assert!(matches!(err, SelectionError::InvalidQuery(_)));
    }
}
