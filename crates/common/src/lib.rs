pub mod identity;
pub mod types;

pub use identity::{Caller, Role, UserId};
pub use types::AggregateId;
