//! Pose estimates and the estimator interface.

pub mod movenet;

use std::{fmt, str::FromStr};

use crate::{image::Image, timer::Timer};

/// A body part tracked by pose estimation models trained on COCO keypoints.
///
/// The discriminant is the keypoint's index in the model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Part {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Part {
    /// The number of keypoints in a full pose.
    pub const COUNT: usize = 17;

    /// All parts, in model output order.
    pub const ALL: [Part; Self::COUNT] = [
        Part::Nose,
        Part::LeftEye,
        Part::RightEye,
        Part::LeftEar,
        Part::RightEar,
        Part::LeftShoulder,
        Part::RightShoulder,
        Part::LeftElbow,
        Part::RightElbow,
        Part::LeftWrist,
        Part::RightWrist,
        Part::LeftHip,
        Part::RightHip,
        Part::LeftKnee,
        Part::RightKnee,
        Part::LeftAnkle,
        Part::RightAnkle,
    ];

    /// Returns the camelCase name of the part, eg. `leftWrist`.
    pub fn name(self) -> &'static str {
        match self {
            Part::Nose => "nose",
            Part::LeftEye => "leftEye",
            Part::RightEye => "rightEye",
            Part::LeftEar => "leftEar",
            Part::RightEar => "rightEar",
            Part::LeftShoulder => "leftShoulder",
            Part::RightShoulder => "rightShoulder",
            Part::LeftElbow => "leftElbow",
            Part::RightElbow => "rightElbow",
            Part::LeftWrist => "leftWrist",
            Part::RightWrist => "rightWrist",
            Part::LeftHip => "leftHip",
            Part::RightHip => "rightHip",
            Part::LeftKnee => "leftKnee",
            Part::RightKnee => "rightKnee",
            Part::LeftAnkle => "leftAnkle",
            Part::RightAnkle => "rightAnkle",
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown part name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown body part '{0}'")]
pub struct UnknownPart(String);

impl FromStr for Part {
    type Err = UnknownPart;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Part::ALL
            .into_iter()
            .find(|part| part.name() == s)
            .ok_or_else(|| UnknownPart(s.to_string()))
    }
}

/// Position of a keypoint, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A named, scored 2D position of one body part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub part: Part,
    pub position: Position,
    /// Confidence in `0.0..=1.0`.
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(part: Part, x: f32, y: f32, confidence: f32) -> Self {
        Self {
            part,
            position: Position::new(x, y),
            confidence,
        }
    }
}

/// A single pose detected by a [`PoseEstimator`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PoseEstimate {
    /// Overall confidence of the pose, in `0.0..=1.0`.
    pub confidence: f32,
    /// The detected keypoints. Not every part is guaranteed to be present.
    pub keypoints: Vec<Keypoint>,
}

impl PoseEstimate {
    pub fn new(confidence: f32, keypoints: Vec<Keypoint>) -> Self {
        Self {
            confidence,
            keypoints,
        }
    }

    /// Returns the first keypoint for `part`, if the estimate contains one.
    pub fn keypoint(&self, part: Part) -> Option<&Keypoint> {
        self.keypoints.iter().find(|kp| kp.part == part)
    }
}

/// How a model's raw outputs are decoded into poses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum DecodingMethod {
    /// Decode at most one pose per frame.
    #[default]
    SinglePerson,
}

/// Per-call parameters passed to [`PoseEstimator::estimate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EstimateRequest {
    /// Report keypoint positions as if the frame was mirrored around its vertical center line.
    pub flip_horizontal: bool,
    pub decoding: DecodingMethod,
}

impl EstimateRequest {
    pub fn single_person(flip_horizontal: bool) -> Self {
        Self {
            flip_horizontal,
            decoding: DecodingMethod::SinglePerson,
        }
    }
}

/// Trait for pose estimation models.
pub trait PoseEstimator {
    /// Returns whether the estimator is loaded and can accept frames.
    fn is_ready(&self) -> bool {
        true
    }

    /// Estimates the poses visible in `frame`.
    ///
    /// Keypoint positions are in `frame`'s pixel coordinates. An empty list means no pose was
    /// found.
    fn estimate(
        &mut self,
        frame: &Image,
        request: &EstimateRequest,
    ) -> anyhow::Result<Vec<PoseEstimate>>;

    /// Returns profiling timers to log along with the detection loop's frame rate.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

impl<E: PoseEstimator + ?Sized> PoseEstimator for Box<E> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn estimate(
        &mut self,
        frame: &Image,
        request: &EstimateRequest,
    ) -> anyhow::Result<Vec<PoseEstimate>> {
        (**self).estimate(frame, request)
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_names_roundtrip() {
        for (index, part) in Part::ALL.into_iter().enumerate() {
            assert_eq!(part as usize, index);
            assert_eq!(part.name().parse::<Part>(), Ok(part));
        }
        assert_eq!("leftWrist".parse::<Part>(), Ok(Part::LeftWrist));
        assert_eq!(
            "left_wrist".parse::<Part>(),
            Err(UnknownPart("left_wrist".into()))
        );
    }

    #[test]
    fn keypoint_lookup() {
        let estimate = PoseEstimate::new(
            0.8,
            vec![
                Keypoint::new(Part::Nose, 1.0, 2.0, 0.9),
                Keypoint::new(Part::RightWrist, 3.0, 4.0, 0.7),
            ],
        );
        assert_eq!(
            estimate.keypoint(Part::RightWrist).map(|kp| kp.position),
            Some(Position::new(3.0, 4.0))
        );
        assert_eq!(estimate.keypoint(Part::LeftWrist), None);
        assert_eq!(PoseEstimate::default().keypoint(Part::Nose), None);
    }
}
