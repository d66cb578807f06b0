//! The per-frame detection-and-render loop.
//!
//! Every cycle reads a frame, asks the [`PoseEstimator`] for poses, redraws the [`RenderTarget`]
//! and then blocks on the [`FrameScheduler`] until the display is ready for the next frame.
//! Cycles never overlap, so at most one estimation is in flight at any time.

use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use crate::{
    canvas::RenderTarget,
    config::DetectionConfig,
    error::{Component, SetupError},
    image::Resolution,
    pose::{EstimateRequest, PoseEstimate, PoseEstimator},
    render,
    schedule::FrameScheduler,
    timer::{FpsCounter, Timer},
    video::FrameSource,
};

/// Lifecycle of a [`DetectionLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Created, but not running yet.
    Idle,
    /// The last cycle completed normally.
    Running,
    /// The last cycle could not read a frame or estimate poses. The loop keeps going.
    Degraded,
    /// The loop has exited and cannot be restarted.
    Stopped,
}

impl LoopState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LoopState::Idle,
            1 => LoopState::Running,
            2 => LoopState::Degraded,
            _ => LoopState::Stopped,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            LoopState::Idle => 0,
            LoopState::Running => 1,
            LoopState::Degraded => 2,
            LoopState::Stopped => 3,
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoopState::Idle => "idle",
            LoopState::Running => "running",
            LoopState::Degraded => "degraded",
            LoopState::Stopped => "stopped",
        })
    }
}

/// Cooperative cancellation flag shared between a loop and its controllers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the loop to stop after its current cycle.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct Status {
    state: AtomicU8,
    cycles: AtomicU64,
}

/// Read-only view of a loop's state, observable from any thread.
#[derive(Debug, Clone)]
pub struct StatusHandle(Arc<Status>);

impl StatusHandle {
    fn new() -> Self {
        Self(Arc::new(Status {
            state: AtomicU8::new(LoopState::Idle.to_u8()),
            cycles: AtomicU64::new(0),
        }))
    }

    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.0.state.load(Ordering::Acquire))
    }

    /// Returns the number of cycles completed so far, including degraded ones.
    pub fn cycles(&self) -> u64 {
        self.0.cycles.load(Ordering::Acquire)
    }

    /// Stores `state` and returns the previous one.
    fn replace(&self, state: LoopState) -> LoopState {
        LoopState::from_u8(self.0.state.swap(state.to_u8(), Ordering::AcqRel))
    }

    fn count_cycle(&self) {
        self.0.cycles.fetch_add(1, Ordering::AcqRel);
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Frame and estimates were obtained and drawn.
    Completed,
    /// No frame could be read; nothing was drawn.
    SourceFailed(String),
    /// The estimator returned an error or panicked; the frame was drawn without markers.
    EstimatorFailed(String),
}

/// Summary of one [`DetectionLoop::run_cycle`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Size of the frame processed, if one could be read.
    pub resolution: Option<Resolution>,
    /// Number of poses returned by the estimator.
    pub estimates: usize,
    /// Number of poses that passed the pose confidence threshold.
    pub accepted: usize,
    /// Number of wrist markers drawn.
    pub markers: usize,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    pub fn is_degraded(&self) -> bool {
        self.outcome != CycleOutcome::Completed
    }
}

/// Continuously detects wrists in frames from `S` and draws them onto `T`.
pub struct DetectionLoop<S, E, T, C> {
    source: S,
    estimator: E,
    target: T,
    scheduler: C,
    config: DetectionConfig,
    status: StatusHandle,
    fps: FpsCounter,
    t_estimate: Timer,
    t_render: Timer,
}

impl<S, E, T, C> DetectionLoop<S, E, T, C>
where
    S: FrameSource,
    E: PoseEstimator,
    T: RenderTarget,
    C: FrameScheduler,
{
    /// Creates a loop from its collaborators.
    ///
    /// Fails with [`SetupError::NotReady`] if the frame source, the estimator or the target is not
    /// ready yet.
    pub fn new(
        source: S,
        estimator: E,
        target: T,
        scheduler: C,
        config: DetectionConfig,
    ) -> Result<Self, SetupError> {
        if !source.is_ready() {
            return Err(SetupError::NotReady(Component::FrameSource));
        }
        if !estimator.is_ready() {
            return Err(SetupError::NotReady(Component::Estimator));
        }
        if !target.is_ready() {
            return Err(SetupError::NotReady(Component::RenderTarget));
        }

        log::debug!("detection loop created with {:?}", config);
        Ok(Self {
            source,
            estimator,
            target,
            scheduler,
            config,
            status: StatusHandle::new(),
            fps: FpsCounter::new("detection"),
            t_estimate: Timer::new("estimate"),
            t_render: Timer::new("render"),
        })
    }

    /// Creates a loop and runs it on a background thread.
    pub fn start(
        source: S,
        estimator: E,
        target: T,
        scheduler: C,
        config: DetectionConfig,
    ) -> Result<LoopHandle, SetupError>
    where
        S: Send + 'static,
        E: Send + 'static,
        T: Send + 'static,
        C: Send + 'static,
    {
        Self::new(source, estimator, target, scheduler, config)?.spawn()
    }

    /// Runs the loop on a new thread named `detection`.
    pub fn spawn(self) -> Result<LoopHandle, SetupError>
    where
        S: Send + 'static,
        E: Send + 'static,
        T: Send + 'static,
        C: Send + 'static,
    {
        let cancel = CancelToken::new();
        let status = self.status.clone();
        let token = cancel.clone();
        let thread = thread::Builder::new()
            .name("detection".into())
            .spawn(move || self.run(&token))
            .map_err(SetupError::Spawn)?;

        Ok(LoopHandle {
            thread,
            cancel,
            status,
        })
    }

    /// Runs the loop on the current thread until `cancel` is triggered.
    ///
    /// The cancellation token is checked after every cycle, before waiting for the next frame.
    /// Returns the number of cycles run.
    pub fn run(mut self, cancel: &CancelToken) -> u64 {
        let _stopped = StopGuard(self.status.clone());
        self.status.replace(LoopState::Running);
        log::info!("detection loop started");

        let mut cycles = 0;
        while !cancel.is_cancelled() {
            self.run_cycle();
            cycles += 1;
            if cancel.is_cancelled() {
                break;
            }
            self.scheduler.next_frame();
        }

        log::info!("detection loop stopped after {} cycles", cycles);
        cycles
    }

    /// Runs exactly one cycle: read, estimate, filter, draw, present.
    ///
    /// A panic in the estimator is caught and reported as [`CycleOutcome::EstimatorFailed`]. The
    /// process-wide panic hook still runs first, so an estimator that panics on every frame prints
    /// its panic message to stderr on every cycle.
    pub fn run_cycle(&mut self) -> CycleReport {
        let report = self.cycle();
        self.status.count_cycle();

        match &report.outcome {
            CycleOutcome::Completed => self.transition(LoopState::Running, ""),
            CycleOutcome::SourceFailed(reason) | CycleOutcome::EstimatorFailed(reason) => {
                self.transition(LoopState::Degraded, reason)
            }
        }

        let timers = collect_timers(
            &self.source,
            &self.estimator,
            [&self.t_estimate, &self.t_render],
        );
        self.fps.tick_with(timers);
        report
    }

    fn cycle(&mut self) -> CycleReport {
        let frame = match self.source.read() {
            Ok(frame) => frame,
            Err(e) => {
                return CycleReport {
                    resolution: None,
                    estimates: 0,
                    accepted: 0,
                    markers: 0,
                    outcome: CycleOutcome::SourceFailed(format!("failed to read frame: {e}")),
                };
            }
        };

        let resolution = frame.resolution();
        self.target.resize(resolution);

        let request = EstimateRequest::single_person(self.config.mirror_horizontally());
        let (estimates, outcome) = {
            let _guard = self.t_estimate.start();
            let estimator = &mut self.estimator;
            match panic::catch_unwind(AssertUnwindSafe(|| estimator.estimate(&frame, &request))) {
                Ok(Ok(estimates)) => (estimates, CycleOutcome::Completed),
                Ok(Err(e)) => (
                    Vec::new(),
                    CycleOutcome::EstimatorFailed(format!("pose estimation failed: {e}")),
                ),
                Err(payload) => (
                    Vec::new(),
                    CycleOutcome::EstimatorFailed(format!(
                        "pose estimator panicked: {}",
                        panic_message(&*payload)
                    )),
                ),
            }
        };

        let _guard = self.t_render.start();
        let output = self.config.output();
        render::draw_frame_pass(
            &mut self.target,
            &frame,
            self.config.mirror_horizontally(),
            output.show_video,
        );

        let (accepted, markers) = draw_estimates(&mut self.target, &estimates, &self.config);
        self.target.present();

        CycleReport {
            resolution: Some(resolution),
            estimates: estimates.len(),
            accepted,
            markers,
            outcome,
        }
    }

    fn transition(&self, new: LoopState, reason: &str) {
        let old = self.status.replace(new);
        match (old, new) {
            (LoopState::Degraded, LoopState::Running) => log::info!("detection loop recovered"),
            (LoopState::Degraded, LoopState::Degraded) => log::debug!("{}", reason),
            (_, LoopState::Degraded) => log::warn!("{}", reason),
            _ => {}
        }
    }

    /// Returns the profiling timers logged with the loop's frame rate: the frame source's, the
    /// estimator's, then the loop's own.
    pub fn timers(&self) -> Vec<&Timer> {
        collect_timers(
            &self.source,
            &self.estimator,
            [&self.t_estimate, &self.t_render],
        )
    }

    /// Returns a handle to observe this loop's state from other threads.
    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn state(&self) -> LoopState {
        self.status.state()
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn scheduler(&self) -> &C {
        &self.scheduler
    }
}

fn collect_timers<'a, S: FrameSource, E: PoseEstimator>(
    source: &'a S,
    estimator: &'a E,
    own: [&'a Timer; 2],
) -> Vec<&'a Timer> {
    let mut timers = source.timers();
    timers.extend(estimator.timers());
    timers.extend(own);
    timers
}

/// Draws wrist markers for every estimate that passes the pose threshold.
///
/// Returns the number of accepted estimates and the number of markers drawn.
fn draw_estimates<T: RenderTarget + ?Sized>(
    target: &mut T,
    estimates: &[PoseEstimate],
    config: &DetectionConfig,
) -> (usize, usize) {
    let mut accepted = 0;
    let mut markers = 0;
    let passing = estimates
        .iter()
        .filter(|estimate| estimate.confidence >= config.min_pose_confidence());
    for estimate in passing {
        accepted += 1;
        if config.output().show_points {
            markers +=
                render::draw_wrist_markers(target, &estimate.keypoints, config.min_part_confidence());
        }
    }
    (accepted, markers)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// Marks the loop as stopped when `run` returns or unwinds.
struct StopGuard(StatusHandle);

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.0.replace(LoopState::Stopped);
    }
}

/// Controls a [`DetectionLoop`] running on a background thread.
pub struct LoopHandle {
    thread: JoinHandle<u64>,
    cancel: CancelToken,
    status: StatusHandle,
}

impl LoopHandle {
    pub fn state(&self) -> LoopState {
        self.status.state()
    }

    /// Requests the loop to stop after the current cycle. Does not wait for it.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Waits for the loop thread to exit and returns the number of cycles it ran.
    ///
    /// If the loop thread panicked, the panic is propagated to the caller.
    pub fn join(self) -> u64 {
        match self.thread.join() {
            Ok(cycles) => cycles,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}
