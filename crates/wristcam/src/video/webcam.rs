//! V4L2 webcam access.
//!
//! Only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are supported. Only
//! video is ever captured; audio devices are not touched.

use std::{cmp::Reverse, env};

use anyhow::bail;
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, PixelFormat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::{
    error::MediaAccessError,
    image::{Image, Resolution},
    timer::Timer,
};

use super::FrameSource;

/// Indicates whether to prefer a higher resolution or frame rate.
///
/// By default, [`ParamPreference::Resolution`] is used, selecting the maximum resolution at the
/// desired frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ParamPreference {
    /// Prefer increased resolution over higher frame rates.
    #[default]
    Resolution,
    /// Prefer higher frame rate over higher image resolution.
    Framerate,
}

#[derive(Debug, Clone, Copy)]
struct FramePrefs {
    resolution: Option<Resolution>,
    fps: Option<u32>,
    pref: ParamPreference,
}

/// Format negotiation options.
///
/// By default, a `640x480` stream is requested.
#[derive(Debug, Clone)]
pub struct WebcamOptions {
    name: Option<String>,
    frame: FramePrefs,
}

impl Default for WebcamOptions {
    fn default() -> Self {
        Self {
            name: None,
            frame: FramePrefs {
                resolution: Some(Resolution::VGA),
                fps: None,
                pref: ParamPreference::default(),
            },
        }
    }
}

impl WebcamOptions {
    /// Sets the name of the webcam device to open.
    ///
    /// If no webcam with the given name can be found, opening the webcam will result in an error.
    #[inline]
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the desired image resolution.
    ///
    /// A different resolution might be selected if the webcam cannot deliver the desired one.
    #[inline]
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.frame.resolution = Some(resolution);
        self
    }

    /// Sets the desired frame rate.
    ///
    /// A lower frame rate might be selected if the webcam cannot deliver the desired resolution.
    #[inline]
    pub fn fps(mut self, fps: u32) -> Self {
        self.frame.fps = Some(fps);
        self
    }

    /// Selects whether to prefer a higher resolution or frame rate.
    ///
    /// When the camera cannot deliver the desired frame rate or resolution, this parameter controls
    /// which one will be maintained.
    #[inline]
    pub fn prefer(mut self, pref: ParamPreference) -> Self {
        self.frame.pref = pref;
        self
    }
}

#[derive(Clone, Copy)]
struct FrameFormat {
    resolution: Resolution,
    frame_interval: Fract,
}

fn negotiate_format(device: &Device, prefs: FramePrefs) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        let format = format.pixel_format();
        if format == PixelFormat::JPEG || format == PixelFormat::MJPG {
            pixel_format = Some(format);
            break;
        }
    }

    let Some(pixel_format) = pixel_format else {
        bail!("no supported pixel format found");
    };

    let mut formats = Vec::new();
    match device.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => {
            for size in sizes {
                let intervals =
                    match device.frame_intervals(pixel_format, size.width(), size.height())? {
                        FrameIntervals::Discrete(intervals) => intervals,
                        FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                            bail!("stepwise or continuous frame rates are not supported")
                        }
                    };
                for rate in intervals {
                    formats.push(FrameFormat {
                        resolution: Resolution::new(size.width(), size.height()),
                        frame_interval: *rate.fract(),
                    });
                }
            }
        }
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported");
        }
    }

    let Some(fmt) = negotiate_with_fallback(&formats, prefs) else {
        bail!("failed to negotiate a webcam format");
    };
    Ok((
        PixFormat::new(
            fmt.resolution.width(),
            fmt.resolution.height(),
            pixel_format,
        ),
        fmt.frame_interval,
    ))
}

/// Picks a format, dropping the less preferred constraint first when nothing matches.
fn negotiate_with_fallback(formats: &[FrameFormat], mut prefs: FramePrefs) -> Option<FrameFormat> {
    loop {
        if let Some(fmt) = negotiate_format_step(formats, prefs) {
            return Some(fmt);
        }

        log::debug!("failed to negotiate format with prefs {:?}", prefs);
        match prefs.pref {
            ParamPreference::Resolution => {
                if prefs.fps.take().is_none() && prefs.resolution.take().is_none() {
                    return None;
                }
            }
            ParamPreference::Framerate => {
                if prefs.resolution.take().is_none() && prefs.fps.take().is_none() {
                    return None;
                }
            }
        }
        log::debug!("retrying with new prefs {:?}", prefs);
    }
}

fn negotiate_format_step(formats: &[FrameFormat], prefs: FramePrefs) -> Option<FrameFormat> {
    let mut formats = formats
        .iter()
        .filter(|fmt| {
            prefs.resolution.map_or(true, |res| {
                fmt.resolution.width() >= res.width() && fmt.resolution.height() >= res.height()
            }) && prefs.fps.map_or(true, |fps| {
                (1.0 / fmt.frame_interval.as_f32()).round() >= fps as f32
            })
        })
        .copied()
        .collect::<Vec<_>>();
    // Preferring resolution picks the smallest satisfying resolution, then the highest frame rate.
    // Preferring frame rate picks the highest frame rate, then the smallest resolution.
    match prefs.pref {
        ParamPreference::Resolution => formats.sort_by_key(|fmt| {
            (
                Reverse(fmt.resolution.num_pixels()),
                Reverse(fmt.frame_interval),
            )
        }),
        ParamPreference::Framerate => formats.sort_by_key(|fmt| {
            (
                Reverse(fmt.frame_interval),
                Reverse(fmt.resolution.num_pixels()),
            )
        }),
    }
    formats.last().copied()
}

/// A webcam yielding a stream of [`Image`]s.
pub struct Webcam {
    stream: ReadStream,
    width: u32,
    height: u32,
    t_dequeue: Timer,
    t_decode: Timer,
}

const ENV_VAR_WEBCAM_NAME: &str = "WRISTCAM_WEBCAM_NAME";

impl Webcam {
    /// Opens the first supported webcam found.
    ///
    /// This function can block for a significant amount of time while the webcam initializes (on
    /// the order of hundreds of milliseconds).
    ///
    /// If every candidate device refused access, [`MediaAccessError::PermissionDenied`] is
    /// returned; if none was suitable, [`MediaAccessError::NoDevice`].
    pub fn open(options: WebcamOptions) -> Result<Self, MediaAccessError> {
        if let Ok(name) = env::var(ENV_VAR_WEBCAM_NAME) {
            log::debug!(
                "webcam override: `{}` is set to '{}'",
                ENV_VAR_WEBCAM_NAME,
                name,
            );
        }

        let mut denied = None;
        for res in linuxvideo::list()? {
            let error = match res {
                Ok(dev) => match Self::open_impl(dev, &options) {
                    Ok(Some(webcam)) => return Ok(webcam),
                    Ok(None) => continue,
                    Err(e) => e,
                },
                Err(e) => MediaAccessError::from_io("video device", e),
            };

            match error {
                MediaAccessError::PermissionDenied { .. } => {
                    log::warn!("{}", error);
                    denied = Some(error);
                }
                _ => log::debug!("{}", error),
            }
        }

        Err(denied.unwrap_or_else(|| {
            MediaAccessError::NoDevice(match &options.name {
                Some(name) => format!("no supported webcam named '{name}' found"),
                None => "no supported webcam device found".into(),
            })
        }))
    }

    fn open_impl(dev: Device, options: &WebcamOptions) -> Result<Option<Self>, MediaAccessError> {
        let path = dev.path()?;
        let device = path.display().to_string();
        let caps = dev
            .capabilities()
            .map_err(|e| MediaAccessError::from_io(&device, e))?;
        let cam_name_from_env = env::var(ENV_VAR_WEBCAM_NAME).ok();
        if let Some(name) = options.name.as_deref().or(cam_name_from_env.as_deref()) {
            if caps.card() != name {
                return Ok(None);
            }
        }

        let cap_flags = caps.device_capabilities();
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            device,
            cap_flags,
        );

        if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let (pixfmt, fract) = negotiate_format(&dev, options.frame)
            .map_err(|e| MediaAccessError::NoDevice(format!("{}: {e}", caps.card())))?;

        let capture = dev
            .video_capture(pixfmt)
            .map_err(|e| MediaAccessError::from_io(&device, e))?;

        let format = capture.format();
        let width = format.width();
        let height = format.height();

        let actual = capture.set_frame_interval(fract)?;

        log::info!(
            "opened {} ({}), {}x{} @ {:.1}Hz",
            caps.card(),
            device,
            width,
            height,
            1.0 / actual.as_f32(),
        );

        let stream = capture.into_stream()?;

        Ok(Some(Self {
            stream,
            width,
            height,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }))
    }

    /// Reads the next frame from the camera.
    ///
    /// If no frame is available, this method will block until one is.
    pub fn read(&mut self) -> anyhow::Result<Image> {
        let dequeue_guard = self.t_dequeue.start();
        let (width, height) = (self.width, self.height);
        let t_decode = &self.t_decode;
        self.stream
            .dequeue(|buf| {
                drop(dequeue_guard);
                let image = match t_decode.time(|| Image::decode_jpeg(&buf)) {
                    Ok(image) => image,
                    Err(e) => {
                        // Even good webcams produce the occasional corrupted MJPG frame. Skipping
                        // it would cause a latency spike, so hand back a blank frame instead.
                        log::error!("webcam decode error: {}", e);
                        Image::new(width, height)
                    }
                };
                Ok(image)
            })
            .map_err(Into::into)
    }

}

impl FrameSource for Webcam {
    fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    fn read(&mut self) -> anyhow::Result<Image> {
        Webcam::read(self)
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_dequeue, &self.t_decode]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(width: u32, height: u32, fps: u32) -> FrameFormat {
        FrameFormat {
            resolution: Resolution::new(width, height),
            frame_interval: Fract::new(1, fps),
        }
    }

    fn fps(fmt: FrameFormat) -> f32 {
        (1.0 / fmt.frame_interval.as_f32()).round()
    }

    fn modes() -> Vec<FrameFormat> {
        vec![
            fmt(320, 240, 30),
            fmt(640, 480, 30),
            fmt(640, 480, 15),
            fmt(1280, 720, 30),
            fmt(1920, 1080, 5),
        ]
    }

    fn prefs(resolution: Option<Resolution>, fps: Option<u32>) -> FramePrefs {
        FramePrefs {
            resolution,
            fps,
            pref: ParamPreference::Resolution,
        }
    }

    #[test]
    fn picks_requested_mode() {
        let fmt =
            negotiate_with_fallback(&modes(), prefs(Some(Resolution::VGA), Some(30))).unwrap();
        assert_eq!(fmt.resolution, Resolution::VGA);
        assert_eq!(fps(fmt), 30.0);
    }

    #[test]
    fn relaxes_framerate_first() {
        let fmt = negotiate_with_fallback(&modes(), prefs(Some(Resolution::RES_1080P), Some(30)))
            .unwrap();
        assert_eq!(fmt.resolution, Resolution::RES_1080P);
    }

    #[test]
    fn relaxes_resolution_for_framerate() {
        let prefs = FramePrefs {
            pref: ParamPreference::Framerate,
            ..prefs(Some(Resolution::RES_1080P), Some(30))
        };
        let fmt = negotiate_with_fallback(&modes(), prefs).unwrap();
        assert_eq!(fps(fmt), 30.0);
        assert_eq!(fmt.resolution, Resolution::new(320, 240));
    }

    #[test]
    fn framerate_preference_picks_fastest_mode() {
        let modes = [
            fmt(640, 480, 15),
            fmt(640, 480, 60),
            fmt(1280, 720, 60),
            fmt(1280, 720, 120),
            fmt(320, 240, 30),
        ];
        let by_resolution = prefs(Some(Resolution::VGA), Some(15));
        let by_framerate = FramePrefs {
            pref: ParamPreference::Framerate,
            ..by_resolution
        };

        let picked = negotiate_with_fallback(&modes, by_framerate).unwrap();
        assert_eq!(fps(picked), 120.0);
        assert_eq!(picked.resolution, Resolution::RES_720P);

        let picked = negotiate_with_fallback(&modes, by_resolution).unwrap();
        assert_eq!(fps(picked), 60.0);
        assert_eq!(picked.resolution, Resolution::VGA);
    }

    #[test]
    fn no_modes() {
        assert!(negotiate_with_fallback(&[], prefs(None, None)).is_none());
        assert!(negotiate_with_fallback(&modes(), prefs(None, Some(120))).is_some());
    }

    #[test]
    fn default_requests_vga() {
        let options = WebcamOptions::default();
        assert_eq!(options.frame.resolution, Some(Resolution::VGA));
        assert_eq!(options.frame.fps, None);
    }
}
