//! Scaling between a layer image's natural pixel grid and the size it is
//! rendered at. Callers compute a [`ViewportMetrics`] once per layout or
//! resize and pass it to every conversion.

/// A point in the natural pixel grid of a layer image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePoint {
    pub x: f64,
    pub y: f64,
}

/// A point in rendered (on-screen) pixels, relative to the image's top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportMetrics {
    rendered_width: f64,
    rendered_height: f64,
    natural_width: f64,
    natural_height: f64,
}

impl ViewportMetrics {
    /// Returns `None` unless every dimension is finite and positive.
    pub fn new(
        rendered_width: f64,
        rendered_height: f64,
        natural_width: f64,
        natural_height: f64,
    ) -> Option<Self> {
        let dims = [rendered_width, rendered_height, natural_width, natural_height];
        if dims.iter().all(|d| d.is_finite() && *d > 0.0) {
            Some(Self {
                rendered_width,
                rendered_height,
                natural_width,
                natural_height,
            })
        } else {
            None
        }
    }

    pub fn scale_x(&self) -> f64 {
        self.rendered_width / self.natural_width
    }

    pub fn scale_y(&self) -> f64 {
        self.rendered_height / self.natural_height
    }

    pub fn to_screen(&self, p: ImagePoint) -> ScreenPoint {
        ScreenPoint {
            x: p.x * self.scale_x(),
            y: p.y * self.scale_y(),
        }
    }

    pub fn to_image(&self, p: ScreenPoint) -> ImagePoint {
        ImagePoint {
            x: p.x / self.scale_x(),
            y: p.y / self.scale_y(),
        }
    }
}
