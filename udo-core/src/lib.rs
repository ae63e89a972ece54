//! Domain rules for U-Do that do not touch storage.
//!
//! Everything in here is pure: given a clock reading and some task or user
//! fields, it answers which view a task belongs to, how a username is
//! normalized, and how archive pages are sliced. The storage layer and the
//! in-memory store both lean on these rules so the two stay in agreement.

mod config;
mod pagination;
mod task;
mod time;
mod username;

pub use config::*;
pub use pagination::*;
pub use task::*;
pub use time::*;
pub use username::*;
