//! Error type for the umbrella crate.

use thiserror::Error;
use veles_sniff::ContainerFormat;

/// Errors surfaced by the container dispatch layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Common(#[from] veles_common::Error),

    #[error("{0}")]
    Sniff(#[from] veles_sniff::Error),

    #[error("{0}")]
    Unity(#[from] veles_unity::Error),

    #[error("{0}")]
    Godot(#[from] veles_godot::Error),

    #[error("{0}")]
    Fsb(#[from] veles_fsb::Error),

    /// The requested entry does not exist in this container.
    #[error("no such entry: {0}")]
    EntryNotFound(String),

    /// The container was identified but has no structural parser here;
    /// its bytes are available verbatim.
    #[error("{0} containers are identified but not decoded")]
    NotDecoded(ContainerFormat),
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, Error>;
