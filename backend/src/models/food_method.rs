use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::types::UserId;

/// How the group will eat once a restaurant is picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FoodMethod {
    DineIn,
    Pickup,
    Delivery,
}

impl FoodMethod {
    pub const ALL: [FoodMethod; 3] = [FoodMethod::DineIn, FoodMethod::Pickup, FoodMethod::Delivery];

    pub fn as_str(&self) -> &'static str {
        match self {
            FoodMethod::DineIn => "dine_in",
            FoodMethod::Pickup => "pickup",
            FoodMethod::Delivery => "delivery",
        }
    }
}

impl FromStr for FoodMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dine_in" => Ok(FoodMethod::DineIn),
            "pickup" => Ok(FoodMethod::Pickup),
            "delivery" => Ok(FoodMethod::Delivery),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FoodMethodTallies {
    pub dine_in: usize,
    pub pickup: usize,
    pub delivery: usize,
}

impl FoodMethodTallies {
    pub fn from_votes(votes: &BTreeMap<UserId, FoodMethod>) -> Self {
        let mut tallies = Self::default();
        for method in votes.values() {
            match method {
                FoodMethod::DineIn => tallies.dine_in += 1,
                FoodMethod::Pickup => tallies.pickup += 1,
                FoodMethod::Delivery => tallies.delivery += 1,
            }
        }
        tallies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_methods_only() {
        assert_eq!("dine_in".parse::<FoodMethod>(), Ok(FoodMethod::DineIn));
        assert_eq!("PICKUP".parse::<FoodMethod>(), Ok(FoodMethod::Pickup));
        assert!("drive_thru".parse::<FoodMethod>().is_err());
    }

    #[test]
    fn tallies_count_each_voter_once() {
        let mut votes = BTreeMap::new();
        votes.insert(UserId::from("a"), FoodMethod::Pickup);
        votes.insert(UserId::from("b"), FoodMethod::Pickup);
        votes.insert(UserId::from("c"), FoodMethod::Delivery);
        votes.insert(UserId::from("a"), FoodMethod::DineIn);
        let tallies = FoodMethodTallies::from_votes(&votes);
        assert_eq!(
            tallies,
            FoodMethodTallies {
                dine_in: 1,
                pickup: 1,
                delivery: 1
            }
        );
    }
}
