//! 2D drawing surfaces.
//!
//! A [`RenderTarget`] is what the detection loop draws each cycle onto: the camera frame, then one
//! marker per detected wrist. [`Canvas`] is the in-memory implementation; the GUI presents one in a
//! window (see [`crate::gui::WindowCanvas`]).

use crate::image::{draw, Color, Image, Resolution};

/// Coordinate transform applied to subsequent drawing operations on a [`RenderTarget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transform {
    /// Draw at the given coordinates.
    #[default]
    Identity,
    /// Mirror horizontally about the vertical line `x = width / 2`.
    MirrorX { width: u32 },
}

impl Transform {
    /// Maps a point from drawing coordinates to surface coordinates.
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        match *self {
            Transform::Identity => (x, y),
            Transform::MirrorX { width } => (width as f32 - x, y),
        }
    }

    /// Maps the column of a pixel from drawing coordinates to surface coordinates.
    ///
    /// Unlike [`Transform::apply`], this maps whole pixels, so column `x` of a mirrored image lands
    /// on column `width - 1 - x`.
    pub fn apply_pixel(&self, x: i64) -> i64 {
        match *self {
            Transform::Identity => x,
            Transform::MirrorX { width } => i64::from(width) - 1 - x,
        }
    }
}

/// A 2D surface that can be cleared, transformed, and drawn on.
pub trait RenderTarget {
    /// Returns whether the surface can be drawn on.
    fn is_ready(&self) -> bool {
        true
    }

    /// Returns the current size of the surface.
    fn resolution(&self) -> Resolution;

    /// Resizes the surface. Resizing to the current size keeps its contents.
    fn resize(&mut self, res: Resolution);

    /// Erases the `width x height` area starting at the top-left corner, in surface coordinates.
    fn clear(&mut self, width: u32, height: u32);

    /// Replaces the current transform.
    fn set_transform(&mut self, transform: Transform);

    /// Returns the current transform.
    fn transform(&self) -> Transform;

    /// Draws `image` with its top-left corner at the origin, through the current transform.
    fn draw_image(&mut self, image: &Image);

    /// Fills a circle centered at `(x, y)`, through the current transform.
    ///
    /// Circles outside of the surface draw nothing.
    fn fill_circle(&mut self, x: f32, y: f32, radius: f32, color: Color);

    /// Makes the drawn contents visible. Called once at the end of every cycle.
    fn present(&mut self) {}
}

impl<T: RenderTarget + ?Sized> RenderTarget for Box<T> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn resolution(&self) -> Resolution {
        (**self).resolution()
    }

    fn resize(&mut self, res: Resolution) {
        (**self).resize(res)
    }

    fn clear(&mut self, width: u32, height: u32) {
        (**self).clear(width, height)
    }

    fn set_transform(&mut self, transform: Transform) {
        (**self).set_transform(transform)
    }

    fn transform(&self) -> Transform {
        (**self).transform()
    }

    fn draw_image(&mut self, image: &Image) {
        (**self).draw_image(image)
    }

    fn fill_circle(&mut self, x: f32, y: f32, radius: f32, color: Color) {
        (**self).fill_circle(x, y, radius, color)
    }

    fn present(&mut self) {
        (**self).present()
    }
}

/// A [`RenderTarget`] backed by an in-memory [`Image`].
#[derive(Debug, Clone)]
pub struct Canvas {
    image: Image,
    transform: Transform,
}

impl Canvas {
    /// Creates a fully transparent canvas of the given size.
    pub fn new(res: Resolution) -> Self {
        Self {
            image: Image::new(res.width(), res.height()),
            transform: Transform::Identity,
        }
    }

    /// Returns the drawn contents.
    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn into_image(self) -> Image {
        self.image
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(Resolution::default())
    }
}

impl RenderTarget for Canvas {
    fn resolution(&self) -> Resolution {
        self.image.resolution()
    }

    fn resize(&mut self, res: Resolution) {
        if self.image.resolution() != res {
            log::debug!("resizing canvas from {} to {}", self.image.resolution(), res);
            self.image = Image::new(res.width(), res.height());
        }
    }

    fn clear(&mut self, width: u32, height: u32) {
        self.image.fill_area(width, height, Color::TRANSPARENT);
    }

    fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    fn transform(&self) -> Transform {
        self.transform
    }

    fn draw_image(&mut self, image: &Image) {
        let (w, h) = (self.image.width(), self.image.height());
        for y in 0..image.height().min(h) {
            for x in 0..image.width() {
                let dest = self.transform.apply_pixel(i64::from(x));
                if dest >= 0 && dest < i64::from(w) {
                    self.image.set(dest as u32, y, image.get(x, y));
                }
            }
        }
    }

    fn fill_circle(&mut self, x: f32, y: f32, radius: f32, color: Color) {
        if !x.is_finite() || !y.is_finite() || !radius.is_finite() || radius <= 0.0 {
            return;
        }
        let (x, y) = self.transform.apply(x, y);
        let (w, h) = (self.image.width() as f32, self.image.height() as f32);
        // A circle larger than the diagonal covers the whole surface anyway.
        let radius = radius.min(w.hypot(h));
        if x + radius < 0.0 || x - radius > w || y + radius < 0.0 || y - radius > h {
            return;
        }
        let diameter = (radius * 2.0).round() as u32;
        draw::circle(&mut self.image, x.round() as i32, y.round() as i32, diameter).color(color);
    }
}
