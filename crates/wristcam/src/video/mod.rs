//! Video frame sources.

pub mod webcam;

use std::path::Path;

use crate::{
    image::{Image, Resolution},
    timer::Timer,
};

/// Supplies video frames on demand.
pub trait FrameSource {
    /// Returns whether the source can deliver frames.
    fn is_ready(&self) -> bool {
        true
    }

    /// Returns the size of the frames returned by [`FrameSource::read`].
    fn resolution(&self) -> Resolution;

    /// Returns the current frame, blocking until one is available.
    fn read(&mut self) -> anyhow::Result<Image>;

    /// Returns profiling timers to log along with the detection loop's frame rate.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn resolution(&self) -> Resolution {
        (**self).resolution()
    }

    fn read(&mut self) -> anyhow::Result<Image> {
        (**self).read()
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}

/// A [`FrameSource`] that returns the same image on every read.
#[derive(Debug, Clone)]
pub struct StillImage {
    image: Image,
}

impl StillImage {
    pub fn new(image: Image) -> Self {
        Self { image }
    }

    /// Loads the image file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Ok(Self::new(Image::load(path)?))
    }
}

impl FrameSource for StillImage {
    fn is_ready(&self) -> bool {
        !self.image.resolution().is_empty()
    }

    fn resolution(&self) -> Resolution {
        self.image.resolution()
    }

    fn read(&mut self) -> anyhow::Result<Image> {
        Ok(self.image.clone())
    }
}

#[cfg(test)]
mod tests {
    use crate::image::Color;

    use super::*;

    #[test]
    fn still_image_repeats() {
        let mut source = StillImage::new(Image::filled(Resolution::new(3, 2), Color::BLUE));
        assert!(source.is_ready());
        assert_eq!(source.resolution(), Resolution::new(3, 2));
        let first = source.read().unwrap();
        assert_eq!(source.read().unwrap(), first);
        assert_eq!(first.get(2, 1), Color::BLUE);
    }

    #[test]
    fn empty_image_is_not_ready() {
        assert!(!StillImage::new(Image::new(0, 0)).is_ready());
    }

    #[test]
    fn load_rejects_unknown_extension() {
        assert!(StillImage::load("frame.bmp").is_err());
    }
}
