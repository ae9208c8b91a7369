//! ratedb - An in-memory, queryable secondary-index engine
//!
//! A fixed collection of rating-keyed records is bulk-loaded into several
//! alternative index structures (ordered trees, tries, a sorted array, a
//! bucket hash map), each of which answers exact-match, range, top-K and
//! multi-predicate filter queries and is serializable to durable storage.

pub mod filter;
pub mod hashmap;
pub mod observability;
pub mod persist;
pub mod prefix;
pub mod record;
pub mod tree;
