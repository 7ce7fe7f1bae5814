//! Ordered request-filter pipeline.
//!
//! - [`Exchange`]: request plus response under construction
//! - [`Filter`] / [`Next`] / [`Outcome`]: the filter contract
//! - [`Downstream`]: the routed call at the bottom of the chain
//! - [`FilterChain`]: sorts filters once and drives an exchange through them

pub mod engine;
pub mod exchange;
pub mod filter;

pub use engine::FilterChain;
pub use exchange::Exchange;
pub use filter::{BoxFuture, Downstream, Filter, FilterOrder, Next, Outcome};
