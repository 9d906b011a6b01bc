use crate::{Error, Result};

/// A dense `H x W x C` image of 32-bit floats, stored row major.
///
/// The channel count is a runtime value: grayscale, color or anything else.
/// Calibration and color space travel alongside the image, not inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<f32>,
}

impl Image {
    /// Create a new image from pixel data.
    ///
    /// Returns `Err(Error::BufferSizeMismatch)` if `data` does not hold
    /// exactly `width * height * channels` values, and
    /// `Err(Error::InvalidInput)` if `channels` is zero.
    pub fn new(width: usize, height: usize, channels: usize, data: Vec<f32>) -> Result<Self> {
        if channels == 0 {
            return Err(Error::InvalidInput);
        }
        let expected = width * height * channels;
        if data.len() != expected {
            return Err(Error::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Create a new image filled with `val`.
    pub fn from_size_val(width: usize, height: usize, channels: usize, val: f32) -> Result<Self> {
        Self::new(width, height, channels, vec![val; width * height * channels])
    }

    /// Create an image by evaluating `f(x, y)` for every pixel.
    ///
    /// `f` must return exactly `channels` values.
    pub fn from_fn<F>(width: usize, height: usize, channels: usize, f: F) -> Result<Self>
    where
        F: Fn(usize, usize) -> Vec<f32>,
    {
        let mut data = Vec::with_capacity(width * height * channels);
        for y in 0..height {
            for x in 0..width {
                let pixel = f(x, y);
                if pixel.len() != channels {
                    return Err(Error::ChannelMismatch {
                        expected: channels,
                        actual: pixel.len(),
                    });
                }
                data.extend_from_slice(&pixel);
            }
        }
        Self::new(width, height, channels, data)
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of channels per pixel.
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels
    }

    /// The raw row-major data.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Consume the image and return its data.
    #[inline]
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// The channels of pixel `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the pixel is out of bounds.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> &[f32] {
        let start = (y * self.width + x) * self.channels;
        &self.data[start..start + self.channels]
    }
}

/// A dense point cloud with one 3D point per reference pixel.
///
/// Points are stored row major. Pixels without a valid point hold NaN in all
/// three coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    width: usize,
    height: usize,
    points: Vec<[f32; 3]>,
}

impl PointCloud {
    /// Create a point cloud from `width * height` points.
    pub fn new(width: usize, height: usize, points: Vec<[f32; 3]>) -> Result<Self> {
        if points.len() != width * height {
            return Err(Error::BufferSizeMismatch {
                expected: width * height,
                actual: points.len(),
            });
        }
        Ok(Self {
            width,
            height,
            points,
        })
    }

    /// Width of the grid.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height of the grid.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// All points, row major.
    #[inline]
    pub fn points(&self) -> &[[f32; 3]] {
        &self.points
    }

    /// The point of pixel `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the pixel is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> [f32; 3] {
        self.points[y * self.width + x]
    }

    /// The `z` coordinate of every point as a single channel image.
    pub fn depth_map(&self) -> Image {
        Image {
            width: self.width,
            height: self.height,
            channels: 1,
            data: self.points.iter().map(|p| p[2]).collect(),
        }
    }

    /// Number of points that are not NaN.
    pub fn num_valid(&self) -> usize {
        self.points.iter().filter(|p| !p[2].is_nan()).count()
    }
}
