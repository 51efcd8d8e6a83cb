//! Read models and projections for the query side.
//!
//! - [`Projection`] trait for processing events into read models
//! - [`ReadModel`] trait for sizing views in health reports
//! - [`ProjectionProcessor`] for feeding events from the store to projections
//! - Views: [`OrderLookupView`] resolves gateway references to orders,
//!   [`CustomerOrdersView`] lists each customer's orders

pub mod error;
pub mod processor;
pub mod projection;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition, ReadModel};
pub use views::{CustomerOrdersSummary, CustomerOrdersView, OrderLookupView};
