//! Filter chain engine.
//!
//! # Execution model
//!
//! ```text
//! run(exchange)
//!   └─ filter[0].filter(exchange, next₀)      ← lowest order
//!        └─ next₀ → filter[1].filter(exchange, next₁)
//!             └─ …
//!                  └─ nextₙ → downstream.dispatch(exchange)
//!             ◄─ filter[1] post-processing
//!   ◄─ filter[0] post-processing                ← runs last
//!   └─ finalize: commit, or synthesize a terminal error response
//! ```
//!
//! The nesting gives the ordering guarantees for free: ascending order on
//! the way in, descending order on the way out, and every filter that ran
//! on the way in gets to see the outcome on the way out.
//!
//! A panic anywhere in the chain is caught here and finalized like any
//! other internal failure, so headers set on the way in (CORS) survive it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{error, warn};

use crate::error::GatewayError;
use crate::pipeline::{Downstream, Exchange, Filter, Next, Outcome};

/// An explicit, statically ordered list of filters.
///
/// Sorted once at construction with a stable sort, so filters sharing an
/// order keep their declaration order.
#[derive(Clone)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new(mut filters: Vec<Arc<dyn Filter>>) -> Self {
        filters.sort_by_key(|f| f.order());
        Self { filters }
    }

    /// Filter names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Drive `exchange` through every filter and `downstream`.
    ///
    /// Always leaves the exchange committed with a status:
    ///
    /// - a chain that finished without anyone setting a status gets a 500;
    /// - an error reaching the engine on an uncommitted exchange is turned
    ///   into that error's terminal response;
    /// - an error on an already committed exchange is only logged.
    ///
    /// A panicking filter or downstream counts as an internal error.
    pub async fn run(&self, exchange: &mut Exchange, downstream: &dyn Downstream) -> Outcome {
        let result = AssertUnwindSafe(Next::new(&self.filters, downstream).run(exchange))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(GatewayError::Internal(format!(
                    "filter chain panicked: {}",
                    panic_message(&*panic)
                )))
            });

        match result {
            Ok(outcome) if exchange.status().is_some() => {
                exchange.commit();
                outcome
            }
            Ok(_) => {
                let err = GatewayError::Internal("filter chain produced no response".to_string());
                error!(
                    request_id = exchange.request_id(),
                    path = %exchange.path(),
                    "Filter chain finished without a terminal status"
                );
                exchange.terminate_with(&err);
                Outcome::ShortCircuit
            }
            Err(err) if exchange.is_committed() => {
                warn!(
                    request_id = exchange.request_id(),
                    error = %err,
                    "Failure after response was committed"
                );
                Outcome::ShortCircuit
            }
            Err(err) => {
                if err.is_dispatch_failure() {
                    warn!(request_id = exchange.request_id(), error = %err, "Dispatch failed");
                } else {
                    error!(request_id = exchange.request_id(), error = %err, "Unhandled filter chain failure");
                }
                exchange.terminate_with(&err);
                Outcome::ShortCircuit
            }
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
}
