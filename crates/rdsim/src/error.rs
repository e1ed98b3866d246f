//! Error types for simulation setup and the event loop.

use thiserror::Error;

/// Fatal simulation errors.
///
/// Non-fatal runtime conditions (a full tile, an ambiguous collision that
/// exhausted its retries) are recovered locally and only counted; they never
/// surface here.
#[derive(Error, Debug)]
pub enum SimError {
    /// Degenerate triangles, non-manifold or inconsistently wound shared
    /// edges, or a non-closed surface where closure is required.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Configuration values that contradict each other or the model.
    #[error("inconsistent configuration: {0}")]
    ConfigInconsistent(String),

    /// A molecule would leave the partition; cross-partition transport is
    /// not supported.
    #[error("molecule {molecule_id} left the partition at ({x:.6e}, {y:.6e}, {z:.6e})")]
    OutOfDomain {
        molecule_id: usize,
        x: f64,
        y: f64,
        z: f64,
    },

    /// A queued unimolecular reaction was found scheduled in the past;
    /// indicates a scheduler bug, never a model problem.
    #[error("unimolecular reaction for molecule {molecule_id} scheduled at {scheduled} but current event time is {event_time}")]
    MissedUnimolecular {
        molecule_id: usize,
        scheduled: f64,
        event_time: f64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl SimError {
    /// Shorthand for an `InvalidGeometry` with a formatted message.
    pub fn geometry(msg: impl Into<String>) -> Self {
        SimError::InvalidGeometry(msg.into())
    }

    /// Shorthand for a `ConfigInconsistent` with a formatted message.
    pub fn config(msg: impl Into<String>) -> Self {
        SimError::ConfigInconsistent(msg.into())
    }
}
