//! The per-cycle draw protocol.
//!
//! Every cycle redraws the target from scratch: [`draw_frame_pass`] erases it, blits the camera
//! frame (mirrored for a selfie view), and [`draw_wrist_markers`] then adds one filled circle per
//! confidently detected wrist.

use crate::{
    canvas::{RenderTarget, Transform},
    image::{Color, Image},
    pose::{Keypoint, Part},
};

/// Radius of wrist markers, in pixels.
pub const MARKER_RADIUS: f32 = 10.0;

/// Marker color of the left wrist.
pub const LEFT_WRIST_COLOR: Color = Color::RED;

/// Marker color of the right wrist.
pub const RIGHT_WRIST_COLOR: Color = Color::GREEN;

/// Erases the `width x height` area of `target` and resets its transform.
pub fn clear<T: RenderTarget + ?Sized>(target: &mut T, width: u32, height: u32) {
    target.set_transform(Transform::Identity);
    target.clear(width, height);
}

/// Makes subsequent draws on `target` appear mirrored about `x = width / 2`.
///
/// This replaces the current transform, so applying it twice is the same as applying it once.
pub fn apply_mirror<T: RenderTarget + ?Sized>(target: &mut T, width: u32) {
    target.set_transform(Transform::MirrorX { width });
}

/// Clears `target` and draws `frame` onto it.
///
/// The transform is reset to identity afterwards.
pub fn draw_frame_pass<T: RenderTarget + ?Sized>(
    target: &mut T,
    frame: &Image,
    mirror: bool,
    show_video: bool,
) {
    clear(target, frame.width(), frame.height());
    if mirror {
        apply_mirror(target, frame.width());
    }
    if show_video {
        target.draw_image(frame);
    }
    target.set_transform(Transform::Identity);
}

/// Draws markers for the left and right wrist of one pose.
///
/// A marker is drawn for each wrist that is present in `keypoints` and whose confidence is
/// strictly greater than `min_part_confidence`. Returns the number of markers drawn.
pub fn draw_wrist_markers<T: RenderTarget + ?Sized>(
    target: &mut T,
    keypoints: &[Keypoint],
    min_part_confidence: f32,
) -> usize {
    let mut drawn = 0;
    for (part, color) in [
        (Part::LeftWrist, LEFT_WRIST_COLOR),
        (Part::RightWrist, RIGHT_WRIST_COLOR),
    ] {
        let Some(kp) = keypoints.iter().find(|kp| kp.part == part) else {
            continue;
        };
        if kp.confidence > min_part_confidence {
            draw_point(target, kp.position.y, kp.position.x, MARKER_RADIUS, color);
            drawn += 1;
        }
    }
    drawn
}

/// Fills a circle of `radius` at `(x, y)`.
///
/// Takes `y` first, the order pose models report coordinates in.
pub fn draw_point<T: RenderTarget + ?Sized>(
    target: &mut T,
    y: f32,
    x: f32,
    radius: f32,
    color: Color,
) {
    target.fill_circle(x, y, radius, color);
}
