//! Voting session aggregate.
//!
//! `Session` holds the raw state; the store wraps every mutation in a
//! per-code lock and calls the methods here to apply it. Nothing in this
//! module knows about locking or HTTP.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use utoipa::ToSchema;

use crate::{
    models::{
        filters::{Filters, Location},
        food_method::FoodMethod,
        restaurant::Restaurant,
    },
    types::{RestaurantId, SessionCode, UserId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Active,
    Finished,
    Reconfiguring,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Active => "active",
            SessionStatus::Finished => "finished",
            SessionStatus::Reconfiguring => "reconfiguring",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserTier {
    Anonymous,
    Authenticated,
}

/// What the creator's tier entitled the session to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub creator_tier: UserTier,
    pub restaurant_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub user_id: UserId,
    pub restaurant_id: RestaurantId,
    pub liked: bool,
    pub cast_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub code: SessionCode,
    pub status: SessionStatus,
    pub host_id: UserId,
    /// Join order. Never contains duplicates.
    pub users: Vec<UserId>,
    pub filters: Option<Filters>,
    pub location: Option<Location>,
    pub restaurants: Vec<Restaurant>,
    pub votes: Vec<Vote>,
    pub food_method_votes: BTreeMap<UserId, FoodMethod>,
    pub food_method_result: Option<FoodMethod>,
    pub metadata: Option<SessionMetadata>,
    pub outcomes_recorded: bool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// A placeholder that reserves `code` before candidates are known.
    pub fn pending(code: SessionCode, host_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            code,
            status: SessionStatus::Pending,
            users: vec![host_id.clone()],
            host_id,
            filters: None,
            location: None,
            restaurants: Vec::new(),
            votes: Vec::new(),
            food_method_votes: BTreeMap::new(),
            food_method_result: None,
            metadata: None,
            outcomes_recorded: false,
            created_at: now,
        }
    }

    pub fn is_host(&self, user_id: &UserId) -> bool {
        &self.host_id == user_id
    }

    pub fn is_member(&self, user_id: &UserId) -> bool {
        self.users.iter().any(|u| u == user_id)
    }

    /// A reserved code still waiting for its first candidate list. A session
    /// sent back to `pending` by a reconfigure keeps its filters and is not
    /// a placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.status == SessionStatus::Pending
            && self.filters.is_none()
            && self.restaurants.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.status == SessionStatus::Finished
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }

    pub fn has_restaurant(&self, restaurant_id: &RestaurantId) -> bool {
        self.restaurants.iter().any(|r| &r.id == restaurant_id)
    }

    /// Adds `user_id` unless already present. Returns whether it was added.
    pub fn add_member(&mut self, user_id: &UserId) -> bool {
        if self.is_member(user_id) {
            return false;
        }
        self.users.push(user_id.clone());
        true
    }

    /// Inserts or replaces the vote for `(user_id, restaurant_id)`.
    pub fn upsert_vote(
        &mut self,
        user_id: &UserId,
        restaurant_id: &RestaurantId,
        liked: bool,
        now: DateTime<Utc>,
    ) {
        match self
            .votes
            .iter_mut()
            .find(|v| &v.user_id == user_id && &v.restaurant_id == restaurant_id)
        {
            Some(existing) => {
                existing.liked = liked;
                existing.cast_at = now;
            }
            None => self.votes.push(Vote {
                user_id: user_id.clone(),
                restaurant_id: restaurant_id.clone(),
                liked,
                cast_at: now,
            }),
        }
    }

    /// Number of distinct candidates `user_id` has voted on.
    pub fn vote_count_for(&self, user_id: &UserId) -> usize {
        self.votes
            .iter()
            .filter(|v| &v.user_id == user_id)
            .map(|v| &v.restaurant_id)
            .collect::<HashSet<_>>()
            .len()
    }

    /// True once `user_id` has a vote on every candidate. A session without
    /// candidates has nothing to finish.
    pub fn has_user_finished(&self, user_id: &UserId) -> bool {
        !self.restaurants.is_empty() && self.vote_count_for(user_id) >= self.restaurants.len()
    }

    pub fn all_users_finished(&self) -> bool {
        !self.users.is_empty() && self.users.iter().all(|u| self.has_user_finished(u))
    }

    /// Drops candidates and every vote tied to them.
    pub fn reset_candidates(&mut self) {
        self.restaurants.clear();
        self.votes.clear();
        self.food_method_votes.clear();
        self.food_method_result = None;
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::active_session;
    use super::*;

    #[test]
    fn pending_session_contains_host() {
        let code = SessionCode::parse("ABCD").unwrap();
        let session = Session::pending(code, UserId::from("host"), Utc::now());
        assert_eq!(session.status, SessionStatus::Pending);
        assert_eq!(session.users, vec![UserId::from("host")]);
        assert!(session.is_host(&UserId::from("host")));
    }

    #[test]
    fn add_member_is_idempotent() {
        let mut session = active_session(&["r1"], &["host"]);
        assert!(session.add_member(&UserId::from("guest")));
        assert!(!session.add_member(&UserId::from("guest")));
        assert!(!session.add_member(&UserId::from("host")));
        assert_eq!(session.users.len(), 2);
    }

    #[test]
    fn upsert_vote_replaces_previous_choice() {
        let mut session = active_session(&["r1"], &["a"]);
        let user = UserId::from("a");
        let restaurant = RestaurantId::from("r1");
        session.upsert_vote(&user, &restaurant, true, Utc::now());
        session.upsert_vote(&user, &restaurant, false, Utc::now());
        assert_eq!(session.votes.len(), 1);
        assert!(!session.votes[0].liked);
    }

    #[test]
    fn finished_requires_a_vote_on_every_candidate() {
        let mut session = active_session(&["r1", "r2"], &["a", "b"]);
        let a = UserId::from("a");
        let b = UserId::from("b");
        session.upsert_vote(&a, &RestaurantId::from("r1"), true, Utc::now());
        session.upsert_vote(&a, &RestaurantId::from("r1"), false, Utc::now());
        assert!(!session.has_user_finished(&a));
        session.upsert_vote(&a, &RestaurantId::from("r2"), true, Utc::now());
        assert!(session.has_user_finished(&a));
        assert!(!session.all_users_finished());
        session.upsert_vote(&b, &RestaurantId::from("r1"), true, Utc::now());
        session.upsert_vote(&b, &RestaurantId::from("r2"), true, Utc::now());
        assert!(session.all_users_finished());
    }

    #[test]
    fn empty_candidate_list_is_never_finished() {
        let code = SessionCode::parse("ABCD").unwrap();
        let session = Session::pending(code, UserId::from("host"), Utc::now());
        assert!(!session.has_user_finished(&UserId::from("host")));
        assert!(!session.all_users_finished());
    }

    #[test]
    fn expiry_compares_age_against_ttl() {
        let session = active_session(&["r1"], &["a"]);
        let ttl = Duration::hours(24);
        assert!(!session.is_expired(session.created_at + Duration::hours(23), ttl));
        assert!(session.is_expired(session.created_at + Duration::hours(25), ttl));
    }
}
