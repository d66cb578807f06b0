//! Detection settings.

use std::{env, str::FromStr};

use crate::error::ConfigError;

/// Default minimum overall confidence for a pose to be drawn.
pub const DEFAULT_MIN_POSE_CONFIDENCE: f32 = 0.1;

/// Default minimum confidence for a wrist keypoint to be drawn.
pub const DEFAULT_MIN_PART_CONFIDENCE: f32 = 0.5;

/// What gets drawn each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputOptions {
    /// Draw the camera frame underneath the markers.
    pub show_video: bool,
    /// Draw wrist markers.
    pub show_points: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            show_video: true,
            show_points: true,
        }
    }
}

/// Immutable settings of a [`DetectionLoop`][crate::detection_loop::DetectionLoop].
///
/// Both thresholds are guaranteed to be finite and within `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionConfig {
    min_pose_confidence: f32,
    min_part_confidence: f32,
    mirror_horizontally: bool,
    output: OutputOptions,
}

impl DetectionConfig {
    /// Creates a configuration, validating both thresholds.
    pub fn new(
        min_pose_confidence: f32,
        min_part_confidence: f32,
        mirror_horizontally: bool,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            min_pose_confidence: check_threshold("min_pose_confidence", min_pose_confidence)?,
            min_part_confidence: check_threshold("min_part_confidence", min_part_confidence)?,
            mirror_horizontally,
            output: OutputOptions::default(),
        })
    }

    /// Starts from the defaults and applies the `WRISTCAM_MIN_POSE_CONFIDENCE`,
    /// `WRISTCAM_MIN_PART_CONFIDENCE` and `WRISTCAM_MIRROR` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let min_pose = parse_var(
            &lookup,
            "WRISTCAM_MIN_POSE_CONFIDENCE",
            DEFAULT_MIN_POSE_CONFIDENCE,
        )?;
        let min_part = parse_var(
            &lookup,
            "WRISTCAM_MIN_PART_CONFIDENCE",
            DEFAULT_MIN_PART_CONFIDENCE,
        )?;
        let mirror = match lookup("WRISTCAM_MIRROR") {
            None => true,
            Some(value) => match value.trim() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "WRISTCAM_MIRROR",
                        value,
                    })
                }
            },
        };

        Self::new(min_pose, min_part, mirror)
    }

    /// Replaces the output options.
    pub fn with_output(mut self, output: OutputOptions) -> Self {
        self.output = output;
        self
    }

    #[inline]
    pub fn min_pose_confidence(&self) -> f32 {
        self.min_pose_confidence
    }

    #[inline]
    pub fn min_part_confidence(&self) -> f32 {
        self.min_part_confidence
    }

    #[inline]
    pub fn mirror_horizontally(&self) -> bool {
        self.mirror_horizontally
    }

    #[inline]
    pub fn output(&self) -> OutputOptions {
        self.output
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_pose_confidence: DEFAULT_MIN_POSE_CONFIDENCE,
            min_part_confidence: DEFAULT_MIN_PART_CONFIDENCE,
            mirror_horizontally: true,
            output: OutputOptions::default(),
        }
    }
}

fn check_threshold(name: &'static str, value: f32) -> Result<f32, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::ThresholdOutOfRange { name, value })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |var: &str| vars.get(var).cloned()
    }

    #[test]
    fn defaults() {
        let config = DetectionConfig::default();
        assert_eq!(config.min_pose_confidence(), 0.1);
        assert_eq!(config.min_part_confidence(), 0.5);
        assert!(config.mirror_horizontally());
        assert_eq!(config.output(), OutputOptions::default());
        assert_eq!(DetectionConfig::from_lookup(lookup(&[])), Ok(config));
    }

    #[test]
    fn validates_thresholds() {
        assert!(DetectionConfig::new(0.0, 1.0, false).is_ok());
        assert_eq!(
            DetectionConfig::new(-0.1, 0.5, true),
            Err(ConfigError::ThresholdOutOfRange {
                name: "min_pose_confidence",
                value: -0.1
            })
        );
        assert!(DetectionConfig::new(0.1, 1.01, true).is_err());
        assert!(DetectionConfig::new(f32::NAN, 0.5, true).is_err());
        assert!(DetectionConfig::new(0.1, f32::INFINITY, true).is_err());
    }

    #[test]
    fn env_overrides() {
        let config = DetectionConfig::from_lookup(lookup(&[
            ("WRISTCAM_MIN_POSE_CONFIDENCE", "0.3"),
            ("WRISTCAM_MIN_PART_CONFIDENCE", " 0.7 "),
            ("WRISTCAM_MIRROR", "0"),
        ]))
        .unwrap();
        assert_eq!(config.min_pose_confidence(), 0.3);
        assert_eq!(config.min_part_confidence(), 0.7);
        assert!(!config.mirror_horizontally());
    }

    #[test]
    fn env_errors() {
        assert_eq!(
            DetectionConfig::from_lookup(lookup(&[("WRISTCAM_MIRROR", "sideways")])),
            Err(ConfigError::InvalidEnv {
                var: "WRISTCAM_MIRROR",
                value: "sideways".into()
            })
        );
        assert!(matches!(
            DetectionConfig::from_lookup(lookup(&[("WRISTCAM_MIN_POSE_CONFIDENCE", "high")])),
            Err(ConfigError::InvalidEnv { .. })
        ));
        assert!(matches!(
            DetectionConfig::from_lookup(lookup(&[("WRISTCAM_MIN_PART_CONFIDENCE", "2")])),
            Err(ConfigError::ThresholdOutOfRange { .. })
        ));
    }

    #[test]
    fn output_options() {
        let config = DetectionConfig::default().with_output(OutputOptions {
            show_video: false,
            show_points: true,
        });
        assert!(!config.output().show_video);
        assert!(config.output().show_points);
    }
}
