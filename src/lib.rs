//! bloghub: a bounded-concurrency crawler that collects articles from a
//! registry of blog feeds into SQLite.
//!
//! The core lives in [`crawl`]; [`feed`] and [`storage`] provide the HTTP and
//! SQLite collaborators it runs against.

pub mod config;
pub mod crawl;
pub mod feed;
pub mod storage;
pub mod util;
