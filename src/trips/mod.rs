//! 行程：需求、状态机与持久化

pub mod intake;
pub mod lifecycle;
pub mod model;
pub mod store;

pub use intake::{ActivityLevel, Tier, TripIntake};
pub use lifecycle::TripLifecycle;
pub use model::{CityStop, Trip, TripOption, TripStatus};
pub use store::{TripPatch, TripStore};
