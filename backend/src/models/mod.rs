//! Data models shared across the session store, selection and API handlers.

pub mod filters;
pub mod food_method;
pub mod restaurant;
pub mod results;
pub mod session;

pub use filters::{Filters, Location};
pub use food_method::{FoodMethod, FoodMethodTallies};
pub use restaurant::Restaurant;
pub use results::{MatchRule, RestaurantTally, SessionResults};
pub use session::{Session, SessionMetadata, SessionStatus, UserTier, Vote};
