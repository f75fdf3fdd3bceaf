/// An error type for images and the kernels operating on them.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ImageError {
    /// Error when the data length does not match the image shape.
    #[error("Data length ({0}) does not match the image size ({1})")]
    InvalidChannelShape(usize, usize),

    /// Error when the number of channels is not supported.
    #[error("Unsupported number of channels: {0}, expected 1 or 3")]
    UnsupportedChannels(usize),

    /// Error when the image has a zero dimension.
    #[error("Image must be at least 1x1, got {0}x{1}")]
    EmptyImage(usize, usize),

    /// Error when two images are expected to have the same size.
    #[error("Image size mismatch: {0}x{1} vs {2}x{3}")]
    InvalidImageSize(usize, usize, usize, usize),

    /// Error when the channel index is out of bounds.
    #[error("Channel index {0} is out of bounds for {1} channels")]
    ChannelIndexOutOfBounds(usize, usize),

    /// Error when the pixel coordinates are out of bounds.
    #[error("Pixel ({0}, {1}) is out of bounds for a {2}x{3} image")]
    PixelIndexOutOfBounds(usize, usize, usize, usize),

    /// Error when the crop region falls outside the image.
    #[error("Region at ({0}, {1}) of size {2}x{3} does not fit in the image")]
    InvalidRegion(usize, usize, usize, usize),

    /// Error when a kernel parameter is out of its domain.
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// The parameter name.
        name: &'static str,
        /// What is wrong with the value.
        reason: String,
    },

    /// Error when a numeric routine produces an unusable result.
    #[error("Numeric failure: {0}")]
    Computation(String),
}

impl ImageError {
    /// Shorthand to build an [`ImageError::InvalidParameter`].
    pub fn invalid_param(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
