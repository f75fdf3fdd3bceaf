use crate::error::ImageError;

/// Image size in pixels
///
/// A struct to represent the size of an image in pixels.
///
/// # Examples
///
/// ```
/// use prism_image::ImageSize;
///
/// let image_size = ImageSize {
///   width: 10,
///   height: 20,
/// };
///
/// assert_eq!(image_size.width, 10);
/// assert_eq!(image_size.height, 20);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageSize {
    /// Width of the image in pixels
    pub width: usize,
    /// Height of the image in pixels
    pub height: usize,
}

impl ImageSize {
    /// Number of pixels covered by this size.
    pub fn num_pixels(&self) -> usize {
        self.width * self.height
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "ImageSize {{ width: {}, height: {} }}",
            self.width, self.height
        )
    }
}

impl From<[usize; 2]> for ImageSize {
    fn from(size: [usize; 2]) -> Self {
        ImageSize {
            width: size[0],
            height: size[1],
        }
    }
}

/// Round and saturate a float sample into the 8-bit range.
///
/// NaN maps to zero.
#[inline]
pub fn saturate_u8(x: f32) -> u8 {
    x.round().clamp(0.0, 255.0) as u8
}

/// An immutable 8-bit raster image.
///
/// The pixel data is stored interleaved with shape (H, W, C), where C is
/// either 1 (grayscale) or 3 (R, G, B). Kernels never modify an image in
/// place; every transform allocates a new one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterImage {
    size: ImageSize,
    channels: usize,
    data: Vec<u8>,
}

impl RasterImage {
    /// Create a new image from pixel data.
    ///
    /// # Arguments
    ///
    /// * `size` - The size of the image in pixels.
    /// * `channels` - The number of channels, 1 or 3.
    /// * `data` - The interleaved pixel data of the image.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is degenerate, the channel count is not
    /// supported or the data length does not match the shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use prism_image::{ImageSize, RasterImage};
    ///
    /// let image = RasterImage::new(
    ///     ImageSize {
    ///         width: 10,
    ///         height: 20,
    ///     },
    ///     3,
    ///     vec![0u8; 10 * 20 * 3],
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(image.width(), 10);
    /// assert_eq!(image.height(), 20);
    /// assert_eq!(image.num_channels(), 3);
    /// ```
    pub fn new(size: ImageSize, channels: usize, data: Vec<u8>) -> Result<Self, ImageError> {
        if size.width == 0 || size.height == 0 {
            return Err(ImageError::EmptyImage(size.width, size.height));
        }

        if channels != 1 && channels != 3 {
            return Err(ImageError::UnsupportedChannels(channels));
        }

        let expected = size.num_pixels() * channels;
        if data.len() != expected {
            return Err(ImageError::InvalidChannelShape(data.len(), expected));
        }

        Ok(Self {
            size,
            channels,
            data,
        })
    }

    /// Create a new image with every sample set to `val`.
    pub fn from_size_val(size: ImageSize, channels: usize, val: u8) -> Result<Self, ImageError> {
        Self::new(size, channels, vec![val; size.num_pixels() * channels])
    }

    /// Build an image from float planes, one per channel.
    ///
    /// Samples are rounded and saturated to `[0, 255]`.
    pub fn from_planes_f32(size: ImageSize, planes: &[Vec<f32>]) -> Result<Self, ImageError> {
        let channels = planes.len();
        if channels != 1 && channels != 3 {
            return Err(ImageError::UnsupportedChannels(channels));
        }
        for plane in planes {
            if plane.len() != size.num_pixels() {
                return Err(ImageError::InvalidChannelShape(
                    plane.len(),
                    size.num_pixels(),
                ));
            }
        }

        let mut data = vec![0u8; size.num_pixels() * channels];
        for (c, plane) in planes.iter().enumerate() {
            data.iter_mut()
                .skip(c)
                .step_by(channels)
                .zip(plane.iter())
                .for_each(|(dst, &v)| *dst = saturate_u8(v));
        }

        Self::new(size, channels, data)
    }

    /// Build an image by stacking single-channel images.
    ///
    /// Accepts one or three grayscale images of the same size.
    pub fn from_channels(channels: &[RasterImage]) -> Result<Self, ImageError> {
        let first = channels
            .first()
            .ok_or(ImageError::UnsupportedChannels(0))?;
        let size = first.size();
        let mut planes = Vec::with_capacity(channels.len());
        for ch in channels {
            if ch.num_channels() != 1 {
                return Err(ImageError::UnsupportedChannels(ch.num_channels()));
            }
            if ch.size() != size {
                return Err(ImageError::InvalidImageSize(
                    size.width,
                    size.height,
                    ch.width(),
                    ch.height(),
                ));
            }
            planes.push(ch.as_slice());
        }

        let n = planes.len();
        let mut data = vec![0u8; size.num_pixels() * n];
        for (c, plane) in planes.iter().enumerate() {
            data.iter_mut()
                .skip(c)
                .step_by(n)
                .zip(plane.iter())
                .for_each(|(dst, &v)| *dst = v);
        }

        Self::new(size, n, data)
    }

    /// The size of the image in pixels.
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// The width of the image in pixels.
    pub fn width(&self) -> usize {
        self.size.width
    }

    /// The height of the image in pixels.
    pub fn height(&self) -> usize {
        self.size.height
    }

    /// Alias of [`RasterImage::width`].
    pub fn cols(&self) -> usize {
        self.size.width
    }

    /// Alias of [`RasterImage::height`].
    pub fn rows(&self) -> usize {
        self.size.height
    }

    /// The number of channels, 1 or 3.
    pub fn num_channels(&self) -> usize {
        self.channels
    }

    /// Whether the image carries three color channels.
    pub fn is_color(&self) -> bool {
        self.channels == 3
    }

    /// Total number of samples, `H * W * C`.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// The raw interleaved samples.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Get the sample at the given pixel and channel.
    pub fn get_pixel(&self, x: usize, y: usize, ch: usize) -> Result<u8, ImageError> {
        if x >= self.width() || y >= self.height() {
            return Err(ImageError::PixelIndexOutOfBounds(
                x,
                y,
                self.width(),
                self.height(),
            ));
        }

        if ch >= self.channels {
            return Err(ImageError::ChannelIndexOutOfBounds(ch, self.channels));
        }

        Ok(self.data[(y * self.width() + x) * self.channels + ch])
    }

    /// Extract a single channel as a grayscale image.
    pub fn channel(&self, ch: usize) -> Result<RasterImage, ImageError> {
        if ch >= self.channels {
            return Err(ImageError::ChannelIndexOutOfBounds(ch, self.channels));
        }

        let data = self
            .data
            .iter()
            .skip(ch)
            .step_by(self.channels)
            .copied()
            .collect();

        RasterImage::new(self.size, 1, data)
    }

    /// Split the image into its channels.
    pub fn split_channels(&self) -> Result<Vec<RasterImage>, ImageError> {
        (0..self.channels).map(|c| self.channel(c)).collect()
    }

    /// Extract a channel as `f32` samples in row-major order.
    pub fn channel_f32(&self, ch: usize) -> Result<Vec<f32>, ImageError> {
        if ch >= self.channels {
            return Err(ImageError::ChannelIndexOutOfBounds(ch, self.channels));
        }

        Ok(self
            .data
            .iter()
            .skip(ch)
            .step_by(self.channels)
            .map(|&v| v as f32)
            .collect())
    }

    /// Extract every channel as `f32` planes.
    pub fn planes_f32(&self) -> Vec<Vec<f32>> {
        (0..self.channels)
            .map(|c| {
                self.data
                    .iter()
                    .skip(c)
                    .step_by(self.channels)
                    .map(|&v| v as f32)
                    .collect()
            })
            .collect()
    }

    /// Copy out a rectangular region.
    ///
    /// # Arguments
    ///
    /// * `x`, `y` - The top-left corner of the region.
    /// * `width`, `height` - The size of the region.
    pub fn crop(
        &self,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    ) -> Result<RasterImage, ImageError> {
        if width == 0
            || height == 0
            || x.checked_add(width).map_or(true, |end| end > self.width())
            || y.checked_add(height).map_or(true, |end| end > self.height())
        {
            return Err(ImageError::InvalidRegion(x, y, width, height));
        }

        let row_len = width * self.channels;
        let mut data = Vec::with_capacity(row_len * height);
        for row in self.data.chunks_exact(self.width() * self.channels).skip(y).take(height) {
            let start = x * self.channels;
            data.extend_from_slice(&row[start..start + row_len]);
        }

        RasterImage::new(ImageSize { width, height }, self.channels, data)
    }
}
