mod id;

pub use id::{InvalidSessionCode, RestaurantId, SessionCode, UserId};
