//! HTTP API handlers for mend-co
//!
//! The HTTP layer is a thin 1:1 translation of the coordinator's boundary
//! contract; routing lives in `crate::build_router`.

pub mod handlers;
pub mod sse;
