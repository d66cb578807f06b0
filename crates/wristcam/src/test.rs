//! Shared test fixtures.

use std::collections::VecDeque;

use crate::{
    canvas::{RenderTarget, Transform},
    image::{Color, Image, Resolution},
    pose::{EstimateRequest, Keypoint, Part, PoseEstimate, PoseEstimator},
    schedule::FrameScheduler,
    video::FrameSource,
};

/// A drawing operation recorded by [`RecordingTarget`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Resize(Resolution),
    Clear(u32, u32),
    SetTransform(Transform),
    /// Image size and the transform it was drawn with.
    DrawImage(Resolution, Transform),
    /// `x`, `y`, radius, color, in drawing coordinates.
    FillCircle(f32, f32, f32, Color),
    Present,
}

/// A [`RenderTarget`] that only records what was drawn on it.
#[derive(Debug, Default)]
pub struct RecordingTarget {
    pub commands: Vec<Command>,
    pub ready: bool,
    res: Resolution,
    transform: Transform,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self {
            ready: true,
            ..Default::default()
        }
    }

    pub fn circles(&self) -> Vec<(f32, f32, f32, Color)> {
        self.commands
            .iter()
            .filter_map(|cmd| match *cmd {
                Command::FillCircle(x, y, r, color) => Some((x, y, r, color)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|cmd| pred(cmd)).count()
    }
}

impl RenderTarget for RecordingTarget {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn resolution(&self) -> Resolution {
        self.res
    }

    fn resize(&mut self, res: Resolution) {
        self.res = res;
        self.commands.push(Command::Resize(res));
    }

    fn clear(&mut self, width: u32, height: u32) {
        self.commands.push(Command::Clear(width, height));
    }

    fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
        self.commands.push(Command::SetTransform(transform));
    }

    fn transform(&self) -> Transform {
        self.transform
    }

    fn draw_image(&mut self, image: &Image) {
        self.commands
            .push(Command::DrawImage(image.resolution(), self.transform));
    }

    fn fill_circle(&mut self, x: f32, y: f32, radius: f32, color: Color) {
        self.commands.push(Command::FillCircle(x, y, radius, color));
    }

    fn present(&mut self) {
        self.commands.push(Command::Present);
    }
}

/// What a [`ScriptedEstimator`] does on one call.
pub enum Step {
    Estimates(Vec<PoseEstimate>),
    Fail,
    Panic,
}

/// A [`PoseEstimator`] that replays a fixed script, then keeps returning no estimates.
#[derive(Default)]
pub struct ScriptedEstimator {
    pub script: VecDeque<Step>,
    pub requests: Vec<EstimateRequest>,
    pub not_ready: bool,
}

impl ScriptedEstimator {
    pub fn new<I: IntoIterator<Item = Step>>(script: I) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Returns the same estimates for a single call.
    pub fn once(estimates: Vec<PoseEstimate>) -> Self {
        Self::new([Step::Estimates(estimates)])
    }
}

impl PoseEstimator for ScriptedEstimator {
    fn is_ready(&self) -> bool {
        !self.not_ready
    }

    fn estimate(
        &mut self,
        _frame: &Image,
        request: &EstimateRequest,
    ) -> anyhow::Result<Vec<PoseEstimate>> {
        self.requests.push(*request);
        match self.script.pop_front() {
            Some(Step::Estimates(estimates)) => Ok(estimates),
            Some(Step::Fail) => anyhow::bail!("scripted estimator failure"),
            Some(Step::Panic) => panic!("scripted estimator panic"),
            None => Ok(Vec::new()),
        }
    }
}

/// A [`FrameSource`] that yields blank frames, optionally failing on some reads.
///
/// Frame sizes are taken from a list; the last size repeats forever.
pub struct BlankSource {
    sizes: VecDeque<Resolution>,
    res: Resolution,
    pub fail_reads: usize,
    pub ready: bool,
}

impl BlankSource {
    pub fn new(res: Resolution) -> Self {
        Self::sequence([res])
    }

    pub fn sequence<I: IntoIterator<Item = Resolution>>(sizes: I) -> Self {
        let sizes = sizes.into_iter().collect::<VecDeque<_>>();
        Self {
            res: sizes.front().copied().unwrap_or_default(),
            sizes,
            fail_reads: 0,
            ready: true,
        }
    }
}

impl FrameSource for BlankSource {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn resolution(&self) -> Resolution {
        self.res
    }

    fn read(&mut self) -> anyhow::Result<Image> {
        if self.fail_reads > 0 {
            self.fail_reads -= 1;
            anyhow::bail!("scripted read failure");
        }
        if self.sizes.len() > 1 {
            self.sizes.pop_front();
        }
        let res = self.res;
        self.res = self.sizes.front().copied().unwrap_or(res);
        Ok(Image::new(res.width(), res.height()))
    }
}

/// A [`FrameScheduler`] that returns immediately and counts how often it was called.
#[derive(Debug, Default)]
pub struct CountingScheduler {
    pub calls: usize,
}

impl FrameScheduler for CountingScheduler {
    fn next_frame(&mut self) {
        self.calls += 1;
    }
}

/// A pose with both wrists at the given confidences.
pub fn wrists_pose(confidence: f32, left: f32, right: f32) -> PoseEstimate {
    PoseEstimate::new(
        confidence,
        vec![
            Keypoint::new(Part::Nose, 320.0, 100.0, 0.99),
            Keypoint::new(Part::LeftWrist, 200.0, 300.0, left),
            Keypoint::new(Part::RightWrist, 440.0, 310.0, right),
        ],
    )
}
