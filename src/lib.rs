// src/lib.rs

//! Turns racy, coalesced directory notifications into semantic
//! file-lifecycle events (modified, truncated, deleted) for a log-tailing
//! consumer.

pub mod backend;
pub mod changes;
pub mod create;
pub mod errors;
pub mod fs;
pub mod watcher;
