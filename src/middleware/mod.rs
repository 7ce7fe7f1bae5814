//! Tower middleware wrapped around the gateway handler.

pub mod request_id;

pub use request_id::{REQUEST_ID_HEADER, RequestIdLayer, request_id};
