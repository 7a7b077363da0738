//! Candidate scoring.
//!
//! Every component lands in `[0, 1]`; the final score is their weighted
//! mean. There is no random term, so identical inputs rank identically.

use std::str::FromStr;

/// Neutral value for components the source has no data for.
const UNKNOWN_COMPONENT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionWeights {
    /// Historical share of sessions where the place won.
    pub pick_rate: f64,
    pub rating: f64,
    /// Favours places shown less often.
    pub discovery: f64,
    /// Favours places closer to the session location.
    pub distance: f64,
    /// Favours places with fewer reviews.
    pub obscurity: f64,
}

impl SelectionWeights {
    /// Best-reviewed places first.
    pub fn balanced() -> Self {
        Self {
            pick_rate: 0.30,
            rating: 0.30,
            discovery: 0.15,
            distance: 0.15,
            obscurity: 0.10,
        }
    }

    /// Used when the caller caps review counts.
    pub fn hidden_gem() -> Self {
        Self {
            pick_rate: 0.15,
            rating: 0.15,
            discovery: 0.25,
            distance: 0.10,
            obscurity: 0.35,
        }
    }

    /// Applies `key=value` overrides such as `"rating=0.5,distance=0.2"`.
    pub fn with_overrides(mut self, spec: &str) -> Result<Self, String> {
        for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got '{pair}'"))?;
            let value: f64 = value
                .trim()
                .parse()
                .map_err(|_| format!("invalid weight for {}: '{}'", key.trim(), value.trim()))?;
            if !value.is_finite() || value < 0.0 {
                return Err(format!("weight for {} must be >= 0", key.trim()));
            }
            match key.trim() {
                "pick_rate" => self.pick_rate = value,
                "rating" => self.rating = value,
                "discovery" => self.discovery = value,
                "distance" => self.distance = value,
                "obscurity" => self.obscurity = value,
                other => return Err(format!("unknown weight '{other}'")),
            }
        }
        if self.total() <= 0.0 {
            return Err("at least one weight must be positive".to_string());
        }
        Ok(self)
    }

    fn total(&self) -> f64 {
        self.pick_rate + self.rating + self.discovery + self.distance + self.obscurity
    }

    pub fn score(&self, components: &ScoreComponents) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        (self.pick_rate * components.pick_rate
            + self.rating * components.rating
            + self.discovery * components.discovery
            + self.distance * components.distance
            + self.obscurity * components.obscurity)
            / total
    }
}

impl Default for SelectionWeights {
    fn default() -> Self {
        Self::balanced()
    }
}

impl FromStr for SelectionWeights {
    type Err = String;

    /// Parses overrides on top of [`SelectionWeights::balanced`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::balanced().with_overrides(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreComponents {
    pub pick_rate: f64,
    pub rating: f64,
    pub discovery: f64,
    pub distance: f64,
    pub obscurity: f64,
}

impl ScoreComponents {
    pub fn compute(
        pick_rate: Option<f64>,
        rating: Option<f64>,
        times_shown: u32,
        distance_km: f64,
        radius_km: f64,
        review_count: Option<u32>,
    ) -> Self {
        let distance = if radius_km > 0.0 {
            (1.0 - distance_km / radius_km).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            pick_rate: pick_rate
                .map(|p| p.clamp(0.0, 1.0))
                .unwrap_or(UNKNOWN_COMPONENT),
            rating: rating
                .map(|r| (r / 5.0).clamp(0.0, 1.0))
                .unwrap_or(UNKNOWN_COMPONENT),
            discovery: 1.0 / (f64::from(times_shown) + 2.0).ln(),
            distance,
            obscurity: review_count
                .map(|n| 1.0 / (1.0 + (1.0 + f64::from(n)).ln()))
                .unwrap_or(UNKNOWN_COMPONENT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_stay_in_unit_range() {
        let c = ScoreComponents::compute(Some(1.7), Some(5.0), 0, 0.0, 5.0, Some(0));
        for value in [c.pick_rate, c.rating, c.discovery, c.distance, c.obscurity] {
            assert!((0.0..=1.0).contains(&value), "{value}");
        }
        assert_eq!(c.pick_rate, 1.0);
        assert_eq!(c.obscurity, 1.0);
    }

    #[test]
    fn unknown_data_scores_neutral() {
        let c = ScoreComponents::compute(None, None, 0, 2.5, 5.0, None);
        assert_eq!(c.pick_rate, 0.5);
        assert_eq!(c.rating, 0.5);
        assert_eq!(c.obscurity, 0.5);
        assert_eq!(c.distance, 0.5);
    }

    #[test]
    fn discovery_decays_with_exposure() {
        let fresh = ScoreComponents::compute(None, None, 0, 0.0, 5.0, None);
        let stale = ScoreComponents::compute(None, None, 50, 0.0, 5.0, None);
        assert!(fresh.discovery > stale.discovery);
    }

    #[test]
    fn hidden_gem_prefers_fewer_reviews() {
        let famous = ScoreComponents::compute(None, Some(4.8), 0, 1.0, 5.0, Some(5000));
        let obscure = ScoreComponents::compute(None, Some(4.3), 0, 1.0, 5.0, Some(12));
        let gem = SelectionWeights::hidden_gem();
        assert!(gem.score(&obscure) > gem.score(&famous));
    }

    #[test]
    fn overrides_parse_and_reject_garbage() {
        let weights: SelectionWeights = "rating=1, distance=0".parse().unwrap();
        assert_eq!(weights.rating, 1.0);
        assert_eq!(weights.distance, 0.0);
        assert_eq!(weights.pick_rate, SelectionWeights::balanced().pick_rate);

        assert!("rating".parse::<SelectionWeights>().is_err());
        assert!("charm=1".parse::<SelectionWeights>().is_err());
        assert!("rating=-1".parse::<SelectionWeights>().is_err());
        assert!(SelectionWeights::balanced()
            .with_overrides("pick_rate=0,rating=0,discovery=0,distance=0,obscurity=0")
            .is_err());
    }
}
