//! Filter and downstream contracts.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::GatewayResult;
use crate::pipeline::Exchange;

/// A heap-allocated, type-erased future.
///
/// `Next::run` recurses through the chain, so its future has to be boxed
/// to have a finite size.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Position of a filter in the chain. Lower values run first on the way in
/// and last on the way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilterOrder(pub i32);

impl FilterOrder {
    /// Outermost: sees every request first and every final status last.
    pub const LOGGING: Self = Self(i32::MIN);
    /// Directly inside logging, ahead of every filter that can reject.
    pub const CORS: Self = Self(i32::MIN + 1);
    pub const AUTH: Self = Self(0);
}

/// How a filter step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The exchange carries the result of `next` (ultimately the downstream call).
    Continue,
    /// A filter completed the response itself; later filters and the
    /// downstream call never ran.
    ShortCircuit,
}

/// A named, ordered unit of request policy.
///
/// Filters are stateless across requests; per-request state lives on the
/// [`Exchange`]. A filter either
///
/// - calls [`Next::run`] and returns (optionally after inspecting or
///   mutating the result),
/// - short-circuits with [`Exchange::short_circuit`] without calling `next`, or
/// - propagates or intercepts an error returned by `next`.
#[async_trait]
pub trait Filter: Send + Sync {
    fn name(&self) -> &str;

    fn order(&self) -> FilterOrder;

    async fn filter(&self, exchange: &mut Exchange, next: Next<'_>) -> GatewayResult<Outcome>;
}

/// Executes the routed call once every filter has let the exchange through.
///
/// Implementations write the backend's status, headers and body into the
/// exchange. Backend error statuses are ordinary results; only a call that
/// did not complete (timeout, refused connection, open breaker) is an `Err`.
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn dispatch(&self, exchange: &mut Exchange) -> GatewayResult<()>;
}

/// Continuation handed to a filter: the rest of the chain plus the
/// downstream call.
///
/// Consumed by [`Next::run`], so a filter can forward at most once.
pub struct Next<'a> {
    filters: &'a [Arc<dyn Filter>],
    downstream: &'a dyn Downstream,
}

impl<'a> Next<'a> {
    pub(crate) fn new(filters: &'a [Arc<dyn Filter>], downstream: &'a dyn Downstream) -> Self {
        Self {
            filters,
            downstream,
        }
    }

    /// Invoke the next filter, or the downstream call after the last filter.
    pub fn run<'b>(self, exchange: &'b mut Exchange) -> BoxFuture<'b, GatewayResult<Outcome>>
    where
        'a: 'b,
    {
        Box::pin(async move {
            match self.filters.split_first() {
                Some((filter, rest)) => {
                    let next = Next::new(rest, self.downstream);
                    filter.filter(exchange, next).await
                }
                None => {
                    self.downstream.dispatch(exchange).await?;
                    Ok(Outcome::Continue)
                }
            }
        })
    }
}
