//! Authoritative registry of live voting sessions.
//!
//! Every read-modify-write goes through [`SessionBackend::update`], which
//! holds the per-code lock for the duration of the mutation. Callers only
//! ever receive cloned snapshots.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use thiserror::Error;

use crate::{
    models::{
        results::{calculate_results, SessionResults},
        Filters, FoodMethod, Location, MatchRule, Restaurant, Session, SessionMetadata,
        SessionStatus,
    },
    services::session_backend::{MemorySessionBackend, SessionBackend},
    types::{RestaurantId, SessionCode, UserId},
};

/// Generated codes tried before giving up on a create.
pub const MAX_CODE_ATTEMPTS: usize = 10;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(SessionCode),
    #[error("restaurant {restaurant_id} is not part of session {code}")]
    RestaurantNotFound {
        code: SessionCode,
        restaurant_id: RestaurantId,
    },
    #[error("session {0} already exists")]
    Conflict(SessionCode),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("no free session code after {0} attempts")]
    CodeSpaceExhausted(usize),
}

/// Lifetime and finishing rules applied to every session.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub ttl: chrono::Duration,
    pub match_rule: MatchRule,
    /// Finish automatically once every participant has voted on every
    /// candidate. The host can always close explicitly.
    pub auto_finish: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            ttl: chrono::Duration::hours(24),
            match_rule: MatchRule::Voters,
            auto_finish: true,
        }
    }
}

/// Outcome of a single vote.
#[derive(Debug, Clone)]
pub struct VoteReceipt {
    pub user_finished: bool,
    pub all_finished: bool,
    pub status: SessionStatus,
    /// This vote completed the last ballot and closed the session.
    pub finished_session: bool,
}

/// A code held for a session whose candidates are still being selected.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub code: SessionCode,
    /// The code was already reserved by the same host.
    pub resumed: bool,
}

pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    policy: SessionPolicy,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>, policy: SessionPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn in_memory(policy: SessionPolicy) -> Self {
        Self::new(Arc::new(MemorySessionBackend::new()), policy)
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Stores a ready session. It starts `active` with the host as its only
    /// participant.
    pub fn create_session(
        &self,
        code: SessionCode,
        host_id: UserId,
        filters: Filters,
        location: Location,
        restaurants: Vec<Restaurant>,
        metadata: Option<SessionMetadata>,
    ) -> Result<Session, SessionError> {
        if restaurants.is_empty() {
            return Err(SessionError::InvalidState(
                "cannot start a session without restaurants".to_string(),
            ));
        }
        let mut session = Session::pending(code, host_id, Utc::now());
        attach_candidates(&mut session, filters, location, restaurants, metadata);
        self.backend.insert_new(session.clone())?;
        tracing::info!(
            code = %session.code,
            host_id = %session.host_id,
            restaurants = session.restaurants.len(),
            "Session created"
        );
        Ok(session)
    }

    /// Reserves `code` with an empty candidate list.
    pub fn init_pending_session(
        &self,
        code: SessionCode,
        host_id: UserId,
    ) -> Result<Session, SessionError> {
        let session = Session::pending(code, host_id, Utc::now());
        self.backend.insert_new(session.clone())?;
        tracing::debug!(code = %session.code, host_id = %session.host_id, "Session code reserved");
        Ok(session)
    }

    /// Reserves `requested`, or a freshly generated code when none is given.
    ///
    /// A requested code that is still a placeholder for the same host is
    /// handed back as resumed. Another host's placeholder is `Forbidden`; any
    /// other existing session, including one being reconfigured, is a
    /// `Conflict`.
    pub fn reserve_code(
        &self,
        requested: Option<SessionCode>,
        host_id: &UserId,
    ) -> Result<Reservation, SessionError> {
        if let Some(code) = requested {
            if let Some(existing) = self.get_session(&code) {
                return if !existing.is_placeholder() {
                    Err(SessionError::Conflict(code))
                } else if existing.is_host(host_id) {
                    Ok(Reservation {
                        code,
                        resumed: true,
                    })
                } else {
                    Err(SessionError::Forbidden(
                        "Only the host can complete this session".to_string(),
                    ))
                };
            }
            self.init_pending_session(code.clone(), host_id.clone())?;
            return Ok(Reservation {
                code,
                resumed: false,
            });
        }

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = SessionCode::generate();
            match self.init_pending_session(code.clone(), host_id.clone()) {
                Ok(_) => {
                    return Ok(Reservation {
                        code,
                        resumed: false,
                    })
                }
                Err(SessionError::Conflict(_)) => {
                    tracing::debug!(%code, attempt, "Generated session code collided");
                }
                Err(err) => return Err(err),
            }
        }
        tracing::error!(
            attempts = MAX_CODE_ATTEMPTS,
            live_sessions = self.session_count(),
            "Could not allocate a session code"
        );
        Err(SessionError::CodeSpaceExhausted(MAX_CODE_ATTEMPTS))
    }

    /// Attaches candidates to a pending session and opens it for voting.
    pub fn complete_session(
        &self,
        code: &SessionCode,
        filters: Filters,
        location: Location,
        restaurants: Vec<Restaurant>,
        metadata: Option<SessionMetadata>,
    ) -> Result<Session, SessionError> {
        if restaurants.is_empty() {
            return Err(SessionError::InvalidState(
                "cannot start a session without restaurants".to_string(),
            ));
        }
        let session = self.modify(code, |session| {
            if session.status != SessionStatus::Pending {
                return Err(SessionError::InvalidState(format!(
                    "session is {}, expected pending",
                    session.status.as_str()
                )));
            }
            attach_candidates(
                session,
                filters.clone(),
                location,
                restaurants.clone(),
                metadata.clone(),
            );
            Ok(())
        })?;
        tracing::info!(
            code = %session.code,
            restaurants = session.restaurants.len(),
            users = session.users.len(),
            "Session opened for voting"
        );
        Ok(session)
    }

    /// Frees a code whose candidate selection failed. Only placeholders are
    /// removed; a live session sent back to `pending` by a reconfigure stays.
    pub fn abandon_pending_session(&self, code: &SessionCode) -> bool {
        let removed = self
            .backend
            .remove_if(code, &mut |session| session.is_placeholder())
            .is_some();
        if removed {
            tracing::debug!(%code, "Pending session abandoned");
        }
        removed
    }

    /// Snapshot of the session. Expired sessions are dropped and reported
    /// absent.
    pub fn get_session(&self, code: &SessionCode) -> Option<Session> {
        let session = self.backend.load(code)?;
        if session.is_expired(Utc::now(), self.policy.ttl) {
            self.expire(code);
            return None;
        }
        Some(session)
    }

    /// Adds a participant. Idempotent; a finished session accepts nobody.
    pub fn add_user_to_session(
        &self,
        code: &SessionCode,
        user_id: &UserId,
    ) -> Result<Session, SessionError> {
        let mut added = false;
        let session = self.modify(code, |session| {
            if session.is_finished() {
                return Err(SessionError::InvalidState(
                    "session has already finished".to_string(),
                ));
            }
            added = session.add_member(user_id);
            Ok(())
        })?;
        if added {
            tracing::info!(%code, %user_id, users = session.users.len(), "User joined session");
        }
        Ok(session)
    }

    pub fn record_vote(
        &self,
        code: &SessionCode,
        user_id: &UserId,
        restaurant_id: &RestaurantId,
        liked: bool,
    ) -> Result<VoteReceipt, SessionError> {
        let auto_finish = self.policy.auto_finish;
        let now = Utc::now();
        let mut reenrolled = false;
        let mut finished_session = false;

        let session = self.modify(code, |session| {
            if session.status != SessionStatus::Active {
                return Err(SessionError::InvalidState(format!(
                    "voting is closed: session is {}",
                    session.status.as_str()
                )));
            }
            if !session.has_restaurant(restaurant_id) {
                return Err(SessionError::RestaurantNotFound {
                    code: session.code.clone(),
                    restaurant_id: restaurant_id.clone(),
                });
            }
            reenrolled = session.add_member(user_id);
            session.upsert_vote(user_id, restaurant_id, liked, now);
            finished_session = auto_finish && session.all_users_finished();
            if finished_session {
                session.status = SessionStatus::Finished;
            }
            Ok(())
        })?;

        if reenrolled {
            tracing::warn!(%code, %user_id, "Voter was missing from participants, re-enrolled");
        }
        let receipt = VoteReceipt {
            user_finished: session.has_user_finished(user_id),
            all_finished: session.all_users_finished(),
            status: session.status,
            finished_session,
        };
        tracing::debug!(
            %code,
            %user_id,
            %restaurant_id,
            liked,
            votes = session.vote_count_for(user_id),
            total = session.restaurants.len(),
            user_finished = receipt.user_finished,
            all_finished = receipt.all_finished,
            "Vote recorded"
        );
        if finished_session {
            tracing::info!(%code, "All participants finished, session closed");
        }
        Ok(receipt)
    }

    pub fn has_user_finished_voting(
        &self,
        code: &SessionCode,
        user_id: &UserId,
    ) -> Result<bool, SessionError> {
        Ok(self.require(code)?.has_user_finished(user_id))
    }

    pub fn all_users_finished(&self, code: &SessionCode) -> Result<bool, SessionError> {
        Ok(self.require(code)?.all_users_finished())
    }

    /// Host moves an active session into `reconfiguring`.
    pub fn set_reconfiguring(
        &self,
        code: &SessionCode,
        actor: &UserId,
    ) -> Result<Session, SessionError> {
        let session = self.modify(code, |session| {
            require_host(session, actor, "Only the host can reconfigure the session")?;
            match session.status {
                SessionStatus::Active => {
                    session.status = SessionStatus::Reconfiguring;
                    Ok(())
                }
                SessionStatus::Reconfiguring => Ok(()),
                other => Err(SessionError::InvalidState(format!(
                    "cannot reconfigure a {} session",
                    other.as_str()
                ))),
            }
        })?;
        tracing::info!(%code, "Session reconfiguring");
        Ok(session)
    }

    /// Host resubmits search criteria. The session returns to `pending`
    /// with its candidates and votes cleared; participants are kept.
    pub fn begin_reconfigure(
        &self,
        code: &SessionCode,
        actor: &UserId,
        filters: Filters,
        location: Location,
    ) -> Result<Session, SessionError> {
        self.modify(code, |session| {
            require_host(session, actor, "Only the host can reconfigure the session")?;
            if !matches!(
                session.status,
                SessionStatus::Active | SessionStatus::Reconfiguring
            ) {
                return Err(SessionError::InvalidState(format!(
                    "cannot reconfigure a {} session",
                    session.status.as_str()
                )));
            }
            session.reset_candidates();
            session.filters = Some(filters.clone());
            session.location = Some(location);
            session.status = SessionStatus::Pending;
            Ok(())
        })
    }

    /// Puts a session whose re-selection failed back into `reconfiguring`
    /// so the host can try again.
    pub fn revert_reconfigure(&self, code: &SessionCode) -> Result<Session, SessionError> {
        self.modify(code, |session| {
            if session.status == SessionStatus::Pending {
                session.status = SessionStatus::Reconfiguring;
            }
            Ok(())
        })
    }

    /// Closes voting. `actor: Some(_)` is a host close, allowed with
    /// participants still voting; `None` is the quorum close and requires
    /// every ballot to be complete. Closing a finished session is a no-op.
    pub fn finish_session(
        &self,
        code: &SessionCode,
        actor: Option<&UserId>,
    ) -> Result<Session, SessionError> {
        let mut closed = false;
        let session = self.modify(code, |session| {
            if let Some(actor) = actor {
                require_host(session, actor, "Only the host can close voting")?;
            }
            match session.status {
                SessionStatus::Finished => Ok(()),
                SessionStatus::Active => {
                    if actor.is_none() && !session.all_users_finished() {
                        return Err(SessionError::InvalidState(
                            "participants are still voting".to_string(),
                        ));
                    }
                    session.status = SessionStatus::Finished;
                    closed = true;
                    Ok(())
                }
                other => Err(SessionError::InvalidState(format!(
                    "cannot close a {} session",
                    other.as_str()
                ))),
            }
        })?;
        if closed {
            tracing::info!(
                %code,
                forced = actor.is_some(),
                votes = session.votes.len(),
                "Session finished"
            );
        }
        Ok(session)
    }

    pub fn calculate_results(
        &self,
        code: &SessionCode,
    ) -> Result<Option<SessionResults>, SessionError> {
        let session = self.require(code)?;
        Ok(calculate_results(&session, self.policy.match_rule))
    }

    /// True exactly once per finished session: the caller that gets `true`
    /// owns recording its outcomes.
    pub fn mark_outcomes_recorded(&self, code: &SessionCode) -> Result<bool, SessionError> {
        let mut claimed = false;
        self.modify(code, |session| {
            if session.is_finished() && !session.outcomes_recorded {
                session.outcomes_recorded = true;
                claimed = true;
            }
            Ok(())
        })?;
        Ok(claimed)
    }

    /// Records how a participant wants to eat. Replaces an earlier choice.
    pub fn vote_food_method(
        &self,
        code: &SessionCode,
        user_id: &UserId,
        method: FoodMethod,
    ) -> Result<Session, SessionError> {
        self.modify(code, |session| {
            if !session.is_member(user_id) {
                return Err(SessionError::Forbidden(
                    "User is not part of this session".to_string(),
                ));
            }
            session.food_method_votes.insert(user_id.clone(), method);
            Ok(())
        })
    }

    pub fn set_food_method_result(
        &self,
        code: &SessionCode,
        actor: &UserId,
        method: FoodMethod,
    ) -> Result<Session, SessionError> {
        let session = self.modify(code, |session| {
            if !session.is_member(actor) {
                return Err(SessionError::Forbidden(
                    "User is not part of this session".to_string(),
                ));
            }
            require_host(session, actor, "Only the host can set the final result")?;
            session.food_method_result = Some(method);
            Ok(())
        })?;
        tracing::info!(%code, method = method.as_str(), "Food method decided");
        Ok(session)
    }

    /// Drops every session older than the TTL at `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.policy.ttl;
        self.backend.retain(&mut |session| !session.is_expired(now, ttl))
    }

    pub fn session_count(&self) -> usize {
        self.backend.len()
    }

    fn require(&self, code: &SessionCode) -> Result<Session, SessionError> {
        self.get_session(code)
            .ok_or_else(|| SessionError::NotFound(code.clone()))
    }

    /// Applies `apply` under the session lock, treating an expired session
    /// as missing.
    fn modify<F>(&self, code: &SessionCode, mut apply: F) -> Result<Session, SessionError>
    where
        F: FnMut(&mut Session) -> Result<(), SessionError>,
    {
        let now = Utc::now();
        let ttl = self.policy.ttl;
        let mut expired = false;
        let result = self.backend.update(code, &mut |session| {
            if session.is_expired(now, ttl) {
                expired = true;
                return Err(SessionError::NotFound(session.code.clone()));
            }
            apply(session)
        });
        if expired {
            self.expire(code);
        }
        result
    }

    fn expire(&self, code: &SessionCode) {
        if self.backend.remove(code).is_some() {
            tracing::info!(%code, "Session expired");
        }
    }
}

fn attach_candidates(
    session: &mut Session,
    filters: Filters,
    location: Location,
    restaurants: Vec<Restaurant>,
    metadata: Option<SessionMetadata>,
) {
    session.filters = Some(filters);
    session.location = Some(location);
    session.restaurants = restaurants;
    if metadata.is_some() {
        session.metadata = metadata;
    }
    session.status = SessionStatus::Active;
}

fn require_host(session: &Session, actor: &UserId, message: &str) -> Result<(), SessionError> {
    if session.is_host(actor) {
        Ok(())
    } else {
        Err(SessionError::Forbidden(message.to_string()))
    }
}

/// Periodically drops expired sessions.
pub fn spawn_expiry_sweeper(
    store: Arc<SessionStore>,
    every: StdDuration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.purge_expired(Utc::now());
            if removed > 0 {
                tracing::info!(removed, remaining = store.session_count(), "Expired sessions swept");
            } else {
                tracing::debug!(remaining = store.session_count(), "Session sweep found nothing to remove");
            }
        }
    })
}
