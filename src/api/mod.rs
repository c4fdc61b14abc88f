//! HTTP API.
//!
//! Exposes routing dry-runs, the delegate tools and catalog listings over
//! JSON. Every response carries an `x-axcess-request-id` header.

mod handlers;
mod server;
pub mod types;

pub use handlers::{
    AXCESS_COST_HEADER, AXCESS_FALLBACK_HEADER, AXCESS_PROVIDER_HEADER, AXCESS_REQUEST_ID_HEADER,
};
pub use server::{create_router, run_server, AppState};
