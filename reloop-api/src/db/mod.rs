//! Database access for reloop-api
//!
//! Table creation lives in `reloop_common::db`; these modules hold the
//! queries each service needs.

pub mod catalog;
pub mod sessions;
pub mod users;
pub mod verifications;
