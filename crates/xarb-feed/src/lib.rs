//! Market data for the xarb pair.
//!
//! - [`InfoClient`]: REST `l2Book` polling against the info endpoint
//! - [`L2BookResponse`]: raw book and top-of-book extraction

pub mod book;
pub mod client;
pub mod error;

pub use book::{L2BookResponse, L2Level};
pub use client::{InfoClient, DEFAULT_INFO_URL};
pub use error::{FeedError, FeedResult};
