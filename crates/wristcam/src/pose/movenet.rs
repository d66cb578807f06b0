//! Single-person pose estimation with a MoveNet-style ONNX model.
//!
//! The network takes a `[1, H, W, 3]` RGB image with channel values in `0..=255` (as `f32` or
//! `i32`) and outputs a `[1, 1, 17, 3]` tensor of `(y, x, score)` triples, one per COCO keypoint,
//! with coordinates normalized to `0.0..=1.0`.

use std::path::Path;

use crate::{
    image::{Image, Resolution},
    nn::{Cnn, ColorMapper, NeuralNetwork},
    timer::Timer,
};

use super::{DecodingMethod, EstimateRequest, Keypoint, Part, PoseEstimate, PoseEstimator};

const OUTPUT_SHAPE: [usize; 4] = [1, 1, Part::COUNT, 3];

/// Pose estimator running a single-pose MoveNet model.
pub struct MoveNet {
    cnn: Cnn,
    t_infer: Timer,
}

impl MoveNet {
    /// Loads the model from an `.onnx` file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let nn = NeuralNetwork::from_path(path)?.load()?;
        if nn.num_outputs() != 1 {
            anyhow::bail!(
                "pose network must have exactly 1 output, '{}' has {}",
                path.display(),
                nn.num_outputs()
            );
        }
        let cnn = Cnn::new(nn, ColorMapper::linear(0.0..=255.0))?;
        log::info!(
            "loaded pose model '{}' with input resolution {}",
            path.display(),
            cnn.input_resolution()
        );

        Ok(Self {
            cnn,
            t_infer: Timer::new("infer"),
        })
    }

    /// Returns the resolution frames are resampled to before inference.
    pub fn input_resolution(&self) -> Resolution {
        self.cnn.input_resolution()
    }
}

impl PoseEstimator for MoveNet {
    fn is_ready(&self) -> bool {
        true
    }

    fn estimate(
        &mut self,
        frame: &Image,
        request: &EstimateRequest,
    ) -> anyhow::Result<Vec<PoseEstimate>> {
        match request.decoding {
            DecodingMethod::SinglePerson => {}
        }

        let outputs = self.t_infer.time(|| self.cnn.estimate(frame))?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow::anyhow!("pose network produced no output"))?;
        if output.shape() != OUTPUT_SHAPE {
            anyhow::bail!(
                "unexpected pose network output shape {:?} (expected {:?})",
                output.shape(),
                OUTPUT_SHAPE
            );
        }
        let output = output.cast_to::<f32>()?;
        let raw = output.as_slice::<f32>()?;

        Ok(vec![decode_single_pose(
            raw,
            frame.resolution(),
            request.flip_horizontal,
        )])
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_infer]
    }
}

/// Converts raw `(y, x, score)` triples into a pose in frame pixel coordinates.
///
/// With `flip_horizontal`, `x` is mirrored to `width - x`. The pose confidence is the mean of all
/// keypoint scores.
fn decode_single_pose(raw: &[f32], frame: Resolution, flip_horizontal: bool) -> PoseEstimate {
    let (width, height) = (frame.width() as f32, frame.height() as f32);
    let keypoints = Part::ALL
        .into_iter()
        .zip(raw.chunks_exact(3))
        .map(|(part, yxs)| {
            let x = yxs[1] * width;
            let x = if flip_horizontal { width - x } else { x };
            Keypoint::new(part, x, yxs[0] * height, yxs[2])
        })
        .collect::<Vec<_>>();

    let confidence = if keypoints.is_empty() {
        0.0
    } else {
        keypoints.iter().map(|kp| kp.confidence).sum::<f32>() / keypoints.len() as f32
    };

    PoseEstimate::new(confidence, keypoints)
}
