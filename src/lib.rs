//! User-data read path.
//!
//! Entity reads go through a cache-aside layer with negative caching and
//! per-key request coalescing; enriched profile views are assembled from
//! concurrently fetched side datasets under a single deadline.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
