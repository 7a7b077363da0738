//! Tallying and match selection over a session's votes.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::{
    models::{restaurant::Restaurant, session::Session},
    types::RestaurantId,
};

/// When a restaurant counts as a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    /// Everyone who voted on it liked it, and at least two people voted.
    #[default]
    Voters,
    /// Every session participant liked it.
    AllParticipants,
}

impl FromStr for MatchRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "voters" => Ok(MatchRule::Voters),
            "all_participants" | "all" => Ok(MatchRule::AllParticipants),
            other => Err(format!("unknown match rule: {other}")),
        }
    }
}

const MIN_MATCH_VOTERS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantTally {
    pub restaurant: Restaurant,
    pub yes_count: usize,
    pub no_count: usize,
    pub total_votes: usize,
    /// userId -> liked.
    pub user_votes: BTreeMap<String, bool>,
    pub is_match: bool,
}

impl RestaurantTally {
    fn yes_ratio_cmp(&self, other: &Self) -> Ordering {
        // yes/total compared without floating point.
        let lhs = self.yes_count * other.total_votes.max(1);
        let rhs = other.yes_count * self.total_votes.max(1);
        lhs.cmp(&rhs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResults {
    pub winner: Restaurant,
    pub winner_yes_count: usize,
    pub winner_total_votes: usize,
    /// Every participant liked the winner, not just those who voted on it.
    pub full_agreement: bool,
    pub participant_count: usize,
    /// Presentation order.
    pub tallies: Vec<RestaurantTally>,
}

/// Per-restaurant yes/no counts in presentation order. Votes for ids outside
/// the candidate list are ignored.
pub fn tally_votes(session: &Session, rule: MatchRule) -> Vec<RestaurantTally> {
    let participant_count = session.users.len();
    let mut by_id: BTreeMap<&RestaurantId, BTreeMap<String, bool>> = session
        .restaurants
        .iter()
        .map(|r| (&r.id, BTreeMap::new()))
        .collect();

    for vote in &session.votes {
        if let Some(user_votes) = by_id.get_mut(&vote.restaurant_id) {
            user_votes.insert(vote.user_id.to_string(), vote.liked);
        }
    }

    session
        .restaurants
        .iter()
        .map(|restaurant| {
            let user_votes = by_id.remove(&restaurant.id).unwrap_or_default();
            let yes_count = user_votes.values().filter(|liked| **liked).count();
            let total_votes = user_votes.len();
            let is_match = match rule {
                MatchRule::Voters => total_votes >= MIN_MATCH_VOTERS && yes_count == total_votes,
                MatchRule::AllParticipants => {
                    participant_count > 0 && yes_count == participant_count
                }
            };
            RestaurantTally {
                restaurant: restaurant.clone(),
                yes_count,
                no_count: total_votes - yes_count,
                total_votes,
                user_votes,
                is_match,
            }
        })
        .collect()
}

/// Picks the match with the highest yes ratio, earliest candidate first on
/// ties. `None` when nothing matches.
pub fn calculate_results(session: &Session, rule: MatchRule) -> Option<SessionResults> {
    let tallies = tally_votes(session, rule);
    let participant_count = session.users.len();

    let mut winner: Option<&RestaurantTally> = None;
    for tally in tallies.iter().filter(|t| t.is_match) {
        match winner {
            Some(best) if tally.yes_ratio_cmp(best) != Ordering::Greater => {}
            _ => winner = Some(tally),
        }
    }
    let winner = winner?;

    Some(SessionResults {
        winner: winner.restaurant.clone(),
        winner_yes_count: winner.yes_count,
        winner_total_votes: winner.total_votes,
        full_agreement: participant_count > 0 && winner.yes_count == participant_count,
        participant_count,
        tallies: tallies.clone(),
    })
}
