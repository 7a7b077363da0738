pub mod session_backend;
pub mod session_store;

pub use session_backend::{MemorySessionBackend, SessionBackend};
pub use session_store::{
    spawn_expiry_sweeper, Reservation, SessionError, SessionPolicy, SessionStore, VoteReceipt,
};
