//! Real-time wrist keypoint overlay for live camera feeds.
//!
//! The heart of this crate is the [`DetectionLoop`]: it reads a frame from a [`FrameSource`],
//! hands it to a [`PoseEstimator`], filters the resulting estimates by confidence, and draws wrist
//! markers onto a [`RenderTarget`]. Between cycles it waits on a [`FrameScheduler`], typically the
//! window's repaint signal, so that exactly one frame is processed per display refresh.
//!
//! # Environment Variables
//!
//! Some defaults can be overridden by setting environment variables:
//!
//! * `WRISTCAM_WEBCAM_NAME`: Forces the device to use for [`Webcam`]s created without an explicit
//!   device name. If unset, the first device that supports a compatible image format will be used.
//! * `WRISTCAM_MODEL`: Path to the ONNX pose model used by the `wristcam` binary when none is
//!   passed on the command line.
//! * `WRISTCAM_MIN_POSE_CONFIDENCE`, `WRISTCAM_MIN_PART_CONFIDENCE`: Override the confidence
//!   thresholds of [`DetectionConfig::from_env`].
//! * `WRISTCAM_MIRROR`: `0` or `false` disables the selfie-view mirroring.
//!
//! [`DetectionLoop`]: detection_loop::DetectionLoop
//! [`FrameSource`]: video::FrameSource
//! [`PoseEstimator`]: pose::PoseEstimator
//! [`RenderTarget`]: canvas::RenderTarget
//! [`FrameScheduler`]: schedule::FrameScheduler
//! [`Webcam`]: video::webcam::Webcam
//! [`DetectionConfig::from_env`]: config::DetectionConfig::from_env

use log::LevelFilter;

pub mod canvas;
pub mod config;
pub mod detection_loop;
pub mod error;
pub mod filter;
pub mod gui;
pub mod image;
pub mod nn;
pub mod pose;
pub mod render;
pub mod schedule;
pub mod termination;
pub mod timer;
pub mod video;

#[cfg(test)]
mod test;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and wristcam will log at *trace*
/// level. Otherwise, they will log at *debug* level.
///
/// `wgpu` will always log at *warn* level. `RUST_LOG` is parsed on top of these defaults.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
