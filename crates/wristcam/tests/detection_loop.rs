use std::{
    thread,
    time::{Duration, Instant},
};

use wristcam::{
    canvas::{Canvas, RenderTarget},
    config::DetectionConfig,
    detection_loop::{CycleOutcome, DetectionLoop, LoopState},
    image::{Color, Image, Resolution},
    pose::{EstimateRequest, Keypoint, Part, PoseEstimate, PoseEstimator},
    render::{LEFT_WRIST_COLOR, RIGHT_WRIST_COLOR},
    schedule::RefreshClock,
    video::StillImage,
};

/// Estimator that answers every frame with the output of a closure.
struct FnEstimator<F>(F);

impl<F> FnEstimator<F>
where
    F: FnMut(&Image, &EstimateRequest) -> anyhow::Result<Vec<PoseEstimate>>,
{
    fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> PoseEstimator for FnEstimator<F>
where
    F: FnMut(&Image, &EstimateRequest) -> anyhow::Result<Vec<PoseEstimate>>,
{
    fn estimate(
        &mut self,
        frame: &Image,
        request: &EstimateRequest,
    ) -> anyhow::Result<Vec<PoseEstimate>> {
        (self.0)(frame, request)
    }
}

fn frame() -> StillImage {
    StillImage::new(Image::filled(Resolution::new(160, 120), Color::BLUE))
}

#[test]
fn draws_mirrored_frame_and_markers() {
    // The estimator reports positions in mirrored coordinates, like a real model asked to flip.
    let estimator = FnEstimator::new(|frame: &Image, req: &EstimateRequest| {
        assert!(req.flip_horizontal);
        let x = frame.width() as f32 - 20.0;
        Ok(vec![PoseEstimate::new(
            0.8,
            vec![
                Keypoint::new(Part::LeftWrist, x, 60.0, 0.9),
                Keypoint::new(Part::RightWrist, 100.0, 30.0, 0.2),
            ],
        )])
    });

    let mut source_image = Image::filled(Resolution::new(160, 120), Color::BLUE);
    source_image.set(0, 0, Color::YELLOW);
    let mut lp = DetectionLoop::new(
        StillImage::new(source_image),
        estimator,
        Canvas::default(),
        RefreshClock::new(1000.0),
        DetectionConfig::default(),
    )
    .unwrap();

    let report = lp.run_cycle();
    assert_eq!(report.outcome, CycleOutcome::Completed);
    assert_eq!(report.markers, 1);

    let out = lp.target().image();
    assert_eq!(out.resolution(), Resolution::new(160, 120));
    // Mirrored blit: top-left pixel ends up top-right.
    assert_eq!(out.get(159, 0), Color::YELLOW);
    assert_eq!(out.get(0, 0), Color::BLUE);
    // The left wrist marker is drawn at the reported position, untransformed.
    assert_eq!(out.get(140, 60), LEFT_WRIST_COLOR);
    assert_eq!(out.get(100, 30), Color::BLUE);
    assert_ne!(out.get(100, 30), RIGHT_WRIST_COLOR);
}

#[test]
fn random_estimates_follow_thresholds() {
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    for _ in 0..200 {
        let min_pose = rng.f32();
        let min_part = rng.f32();
        let estimates = (0..rng.usize(0..4))
            .map(|_| {
                let mut keypoints = Vec::new();
                for part in [Part::LeftWrist, Part::RightWrist, Part::Nose] {
                    if rng.bool() {
                        let (x, y) = (rng.f32() * 160.0, rng.f32() * 120.0);
                        keypoints.push(Keypoint::new(part, x, y, rng.f32()));
                    }
                }
                PoseEstimate::new(rng.f32(), keypoints)
            })
            .collect::<Vec<_>>();

        let expected_accepted = estimates
            .iter()
            .filter(|e| e.confidence >= min_pose)
            .count();
        let expected_markers = estimates
            .iter()
            .filter(|e| e.confidence >= min_pose)
            .map(|e| {
                [Part::LeftWrist, Part::RightWrist]
                    .into_iter()
                    .filter(|&part| {
                        e.keypoint(part)
                            .map_or(false, |kp| kp.confidence > min_part)
                    })
                    .count()
            })
            .sum::<usize>();

        let returned = estimates.clone();
        let mut lp = DetectionLoop::new(
            frame(),
            FnEstimator::new(move |_: &Image, _: &EstimateRequest| Ok(returned.clone())),
            Canvas::default(),
            RefreshClock::new(1000.0),
            DetectionConfig::new(min_pose, min_part, rng.bool()).unwrap(),
        )
        .unwrap();

        let report = lp.run_cycle();
        assert_eq!(report.estimates, estimates.len());
        assert_eq!(report.accepted, expected_accepted);
        assert_eq!(report.markers, expected_markers);
    }
}

#[test]
fn failing_estimator_degrades_then_recovers() {
    let mut calls = 0;
    let estimator = FnEstimator::new(move |_: &Image, _: &EstimateRequest| {
        calls += 1;
        if calls == 1 {
            anyhow::bail!("model not warmed up");
        }
        Ok(Vec::new())
    });
    let mut lp = DetectionLoop::new(
        frame(),
        estimator,
        Canvas::default(),
        RefreshClock::new(1000.0),
        DetectionConfig::default(),
    )
    .unwrap();
    assert_eq!(lp.state(), LoopState::Idle);

    assert!(lp.run_cycle().is_degraded());
    assert_eq!(lp.state(), LoopState::Degraded);
    // The frame is still shown while degraded.
    assert_eq!(lp.target().image().get(0, 0), Color::BLUE);

    assert!(!lp.run_cycle().is_degraded());
    assert_eq!(lp.state(), LoopState::Running);
}

#[test]
fn spawned_loop_stops_on_request() {
    let handle = DetectionLoop::start(
        frame(),
        FnEstimator::new(|_: &Image, _: &EstimateRequest| Ok(Vec::new())),
        Canvas::default(),
        RefreshClock::new(500.0),
        DetectionConfig::default(),
    )
    .unwrap();
    let status = handle.status();

    let deadline = Instant::now() + Duration::from_secs(10);
    while status.cycles() < 3 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(status.cycles() >= 3);
    assert!(matches!(
        handle.state(),
        LoopState::Running | LoopState::Degraded
    ));

    handle.stop();
    assert!(handle.cancel_token().is_cancelled());
    let cycles = handle.join();
    assert!(cycles >= 3);
    assert_eq!(status.state(), LoopState::Stopped);
}

#[test]
fn canvas_resolution_tracks_frame() {
    let mut lp = DetectionLoop::new(
        frame(),
        FnEstimator::new(|_: &Image, _: &EstimateRequest| Ok(Vec::new())),
        Canvas::new(Resolution::new(4, 4)),
        RefreshClock::new(1000.0),
        DetectionConfig::default(),
    )
    .unwrap();
    lp.run_cycle();
    assert_eq!(lp.target().resolution(), Resolution::new(160, 120));
}
