pub mod voting_outcome;
