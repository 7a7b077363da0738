//! Primary/fallback orchestration over place sources.

use std::sync::Arc;

use crate::{
    models::Restaurant,
    selection::{PlaceSource, RestaurantSelector, SelectionError, SelectionRequest},
    types::RestaurantId,
};

/// A candidate list and the source that produced it.
#[derive(Debug, Clone)]
pub struct SourcedRestaurants {
    pub restaurants: Vec<Restaurant>,
    pub source: &'static str,
}

pub struct RestaurantSourcing {
    primary: Arc<dyn PlaceSource>,
    fallback: Option<Arc<dyn PlaceSource>>,
    selector: RestaurantSelector,
}

impl RestaurantSourcing {
    pub fn new(
        primary: Arc<dyn PlaceSource>,
        fallback: Option<Arc<dyn PlaceSource>>,
        selector: RestaurantSelector,
    ) -> Self {
        Self {
            primary,
            fallback,
            selector,
        }
    }

    /// Asks the primary source and, when it has nothing or is down, the
    /// fallback. The result always comes from a single source.
    pub async fn select(
        &self,
        request: &SelectionRequest,
    ) -> Result<SourcedRestaurants, SelectionError> {
        let primary_err = match self.try_source(self.primary.as_ref(), request).await {
            Ok(found) => return Ok(found),
            Err(err @ SelectionError::InvalidQuery(_)) => return Err(err),
            Err(err) => err,
        };

        let Some(fallback) = &self.fallback else {
            return Err(primary_err);
        };
        tracing::info!(
            primary = self.primary.name(),
            fallback = fallback.name(),
            reason = %primary_err,
            "Falling back to secondary place source"
        );

        match self.try_source(fallback.as_ref(), request).await {
            Ok(found) => Ok(found),
            // One source answered with nothing, so the area is empty rather
            // than unreachable.
            Err(err @ SelectionError::UpstreamUnavailable { .. })
                if matches!(primary_err, SelectionError::NoResults) =>
            {
                tracing::warn!(reason = %err, "Fallback place source unavailable");
                Err(SelectionError::NoResults)
            }
            Err(err) => Err(err),
        }
    }

    async fn try_source(
        &self,
        source: &dyn PlaceSource,
        request: &SelectionRequest,
    ) -> Result<SourcedRestaurants, SelectionError> {
        let restaurants = self
            .selector
            .select_restaurants_for_session(source, request)
            .await?;
        let ids: Vec<RestaurantId> = restaurants.iter().map(|r| r.id.clone()).collect();
        source.mark_shown(&ids);
        Ok(SourcedRestaurants {
            restaurants,
            source: source.name(),
        })
    }
}
