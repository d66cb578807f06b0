//! Error types.

use std::{fmt, io};

use thiserror::Error;

/// A collaborator of the detection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    FrameSource,
    Estimator,
    RenderTarget,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Component::FrameSource => "frame source",
            Component::Estimator => "pose estimator",
            Component::RenderTarget => "render target",
        })
    }
}

/// Errors preventing the detection loop from starting.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("{0} is not ready")]
    NotReady(Component),

    #[error("camera unavailable: {0}")]
    Media(#[from] MediaAccessError),

    #[error("failed to spawn detection thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Errors opening a camera.
#[derive(Debug, Error)]
pub enum MediaAccessError {
    #[error("permission denied opening {device}")]
    PermissionDenied { device: String },

    #[error("no usable camera: {0}")]
    NoDevice(String),

    #[error("camera I/O error: {0}")]
    Io(#[from] io::Error),
}

impl MediaAccessError {
    /// Classifies an I/O error that occurred while accessing `device`.
    pub fn from_io(device: &str, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => MediaAccessError::PermissionDenied {
                device: device.to_string(),
            },
            io::ErrorKind::NotFound => MediaAccessError::NoDevice(format!("{device}: {error}")),
            _ => MediaAccessError::Io(error),
        }
    }
}

/// Invalid detection settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be in 0.0..=1.0, got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f32 },

    #[error("invalid value '{value}' for environment variable {var}")]
    InvalidEnv { var: &'static str, value: String },
}
