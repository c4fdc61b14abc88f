//! axcess - Policy-driven LLM request routing with sequential fallback
//!
//! This library provides the routing decision engine, the delegate that
//! executes decisions against provider adapters, and the HTTP surface
//! around them.

pub mod api;
pub mod config;
pub mod delegate;
pub mod error;
pub mod providers;
pub mod router;
pub mod tools;

pub use config::Config;
pub use delegate::{DelegateContext, DelegateResult};
pub use error::{Error, Result};
pub use router::{RouteRequest, RouteResult, Router};
