//! Policy query and pagination layer.
//!
//! Raw documents flow store → normalizer → page / export / statistics. Only
//! the paginator and the service touch the store; everything else is pure.

pub mod cursor;
pub mod error;
pub mod export;
pub mod handlers;
pub mod normalizer;
pub mod pagination;
pub mod query;
pub mod service;
pub mod statistics;
pub mod timestamp;

pub use query::POLICIES_COLLECTION;
