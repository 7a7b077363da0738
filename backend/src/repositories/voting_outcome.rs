use sqlx::postgres::PgTransaction;

use crate::selection::outcomes::VotingOutcome;

pub async fn insert_voting_outcome(
    tx: &mut PgTransaction<'_>,
    outcome: &VotingOutcome,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO voting_outcomes \
         (id, session_code, restaurant_id, was_winner, yes_count, no_count, participant_count, \
         city, recorded_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(outcome.id)
    .bind(&outcome.session_code)
    .bind(outcome.restaurant_id.as_str())
    .bind(outcome.was_winner)
    .bind(outcome.yes_count)
    .bind(outcome.no_count)
    .bind(outcome.participant_count)
    .bind(&outcome.city)
    .bind(outcome.recorded_at)
    .execute(&mut **tx)
    .await
    .map(|_| ())
}
