//! Token validation.

pub mod token;

pub use token::{Identity, MIN_SECRET_BYTES, TokenError, TokenValidator};
