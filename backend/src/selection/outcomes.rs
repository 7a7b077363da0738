//! Per-restaurant voting analytics, written after a session finishes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::{
        results::{calculate_results, tally_votes},
        MatchRule, Restaurant, Session,
    },
    repositories::voting_outcome,
    types::{RestaurantId, SessionCode},
};

#[derive(Debug, Error)]
pub enum OutcomeError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// One analytics row: how a single restaurant fared in one session.
#[derive(Debug, Clone, PartialEq)]
pub struct VotingOutcome {
    pub id: Uuid,
    pub session_code: String,
    pub restaurant_id: RestaurantId,
    pub was_winner: bool,
    pub yes_count: i32,
    pub no_count: i32,
    pub participant_count: i32,
    pub city: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoteCounts {
    pub yes: usize,
    pub no: usize,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    async fn record(&self, rows: Vec<VotingOutcome>) -> Result<(), OutcomeError>;
}

/// Keeps rows in process memory. Used when no database is configured.
#[derive(Debug, Default)]
pub struct InMemoryOutcomeStore {
    rows: Mutex<Vec<VotingOutcome>>,
}

impl InMemoryOutcomeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<VotingOutcome> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl OutcomeStore for InMemoryOutcomeStore {
    async fn record(&self, rows: Vec<VotingOutcome>) -> Result<(), OutcomeError> {
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(rows);
        Ok(())
    }
}

/// Writes rows to the `voting_outcomes` table in one transaction.
#[derive(Debug, Clone)]
pub struct PgOutcomeStore {
    pool: PgPool,
}

impl PgOutcomeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutcomeStore for PgOutcomeStore {
    async fn record(&self, rows: Vec<VotingOutcome>) -> Result<(), OutcomeError> {
        let mut tx = self.pool.begin().await?;
        for row in &rows {
            voting_outcome::insert_voting_outcome(&mut tx, row).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// One row per restaurant that received at least one vote.
pub fn build_outcomes(
    session_code: &SessionCode,
    restaurants: &[Restaurant],
    votes: &BTreeMap<RestaurantId, VoteCounts>,
    winner_id: Option<&RestaurantId>,
    participant_count: usize,
    city: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<VotingOutcome> {
    restaurants
        .iter()
        .filter_map(|restaurant| {
            let counts = votes.get(&restaurant.id)?;
            if counts.yes + counts.no == 0 {
                return None;
            }
            Some(VotingOutcome {
                id: Uuid::new_v4(),
                session_code: session_code.to_string(),
                restaurant_id: restaurant.id.clone(),
                was_winner: winner_id == Some(&restaurant.id),
                yes_count: saturating_i32(counts.yes),
                no_count: saturating_i32(counts.no),
                participant_count: saturating_i32(participant_count),
                city: city.map(str::to_string),
                recorded_at: now,
            })
        })
        .collect()
}

fn saturating_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Fire-and-forget front for an [`OutcomeStore`]: failures are logged and
/// never reach the caller.
#[derive(Clone)]
pub struct OutcomeRecorder {
    store: Arc<dyn OutcomeStore>,
}

impl OutcomeRecorder {
    pub fn new(store: Arc<dyn OutcomeStore>) -> Self {
        Self { store }
    }

    pub async fn record_voting_outcomes(
        &self,
        session_code: &SessionCode,
        restaurants: &[Restaurant],
        votes: &BTreeMap<RestaurantId, VoteCounts>,
        winner_id: Option<&RestaurantId>,
        participant_count: usize,
        city: Option<&str>,
    ) {
        let rows = build_outcomes(
            session_code,
            restaurants,
            votes,
            winner_id,
            participant_count,
            city,
            Utc::now(),
        );
        if rows.is_empty() {
            tracing::debug!(code = %session_code, "No votes to record");
            return;
        }
        let count = rows.len();
        match self.store.record(rows).await {
            Ok(()) => tracing::info!(code = %session_code, rows = count, "Voting outcomes recorded"),
            Err(err) => tracing::warn!(
                code = %session_code,
                error = %err,
                "Failed to record voting outcomes"
            ),
        }
    }

    /// Derives counts and the winner from a finished session and records them.
    pub async fn record_session(&self, session: &Session, rule: MatchRule) {
        let votes: BTreeMap<RestaurantId, VoteCounts> = tally_votes(session, rule)
            .into_iter()
            .map(|t| {
                (
                    t.restaurant.id,
                    VoteCounts {
                        yes: t.yes_count,
                        no: t.no_count,
                    },
                )
            })
            .collect();
        let winner = calculate_results(session, rule).map(|r| r.winner.id);
        let city = session.restaurants.iter().find_map(|r| r.city.as_deref());
        self.record_voting_outcomes(
            &session.code,
            &session.restaurants,
            &votes,
            winner.as_ref(),
            session.users.len(),
            city,
        )
        .await;
    }
}
