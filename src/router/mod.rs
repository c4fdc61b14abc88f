//! Routing decision engine.
//!
//! Turns a [`RouteRequest`] into a fully specified [`RouteResult`]:
//! - Alias selection (forced model, token buckets, language heuristics)
//! - Output cap and temperature resolution
//! - Ordered fallback candidates
//!
//! Every decision point is recorded in the rationale trail. Nothing here
//! performs I/O.

pub mod language;
pub mod limits;
mod selector;
mod types;

pub use selector::{Router, RoutingError};
pub use types::{
    RouteCaps, RouteDecision, RouteMetadata, RouteParameters, RouteRequest, RouteResult,
};
