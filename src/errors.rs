// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("notification backend error: {0}")]
    Backend(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path has no watchable file name: {0:?}")]
    InvalidWatchPath(PathBuf),

    #[error("change stream already active for {0:?}")]
    StreamActive(PathBuf),

    #[error("creation watch stream closed")]
    CreationWatchClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, WatchError>;
