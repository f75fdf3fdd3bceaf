use prism_image::ImageSize;
use rayon::prelude::*;

/// A border type for the spatial padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingMode {
    /// This border type takes the outermost row or column of pixels and repeats it into the padded region.
    ///
    /// Example: ...d c b a | a a a a...
    Replicate,

    /// This border type reflects the pixel values at the boundary, starting with the pixel 'next' to the edge.
    ///
    /// Example: ...d c b a | b c d e...
    Reflect101,

    /// This border type reflects the pixel values at the boundary, starting with the edge pixel itself.
    ///
    /// Example: ...d c b a | a b c d...
    Reflect,
}

/// The border policy shared by every neighborhood kernel in this crate.
pub const BORDER_DEFAULT: PaddingMode = PaddingMode::Reflect101;

impl PaddingMode {
    #[inline]
    fn reflect(i: isize, len: usize) -> usize {
        if len == 1 {
            return 0;
        }
        let len = len as isize;
        let mut i = i;
        while i < 0 || i >= len {
            if i < 0 {
                i = -i - 1;
            } else if i >= len {
                i = 2 * len - i - 1;
            }
        }
        i as usize
    }

    #[inline]
    fn reflect101(i: isize, len: usize) -> usize {
        if len == 1 {
            return 0;
        }
        let len = len as isize;
        let mut i = i;
        while i < 0 || i >= len {
            if i < 0 {
                i = -i;
            } else if i >= len {
                i = 2 * len - i - 2;
            }
        }
        i as usize
    }

    /// Maps index `i` to a valid index i.e. within `[0, len)` according to the padding mode.
    ///
    /// - `Replicate`: clamp to edge
    /// - `Reflect`: mirror including edge
    /// - `Reflect101`: mirror excluding edge
    #[inline]
    pub fn map_index(&self, i: isize, len: usize) -> usize {
        match self {
            PaddingMode::Replicate => i.clamp(0, len as isize - 1) as usize,
            PaddingMode::Reflect => Self::reflect(i, len),
            PaddingMode::Reflect101 => Self::reflect101(i, len),
        }
    }
}

/// A single channel buffer padded on every side.
pub struct PaddedPlane<T> {
    /// The padded samples in row-major order.
    pub data: Vec<T>,
    /// The padded width.
    pub width: usize,
    /// The padded height.
    pub height: usize,
    /// Padding on the left and right sides.
    pub pad_x: usize,
    /// Padding on the top and bottom sides.
    pub pad_y: usize,
}

impl<T: Copy> PaddedPlane<T> {
    /// Sample at padded coordinates.
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> T {
        self.data[y * self.width + x]
    }

    /// A row of the padded buffer.
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        &self.data[y * self.width..(y + 1) * self.width]
    }
}

/// Pad a single channel plane.
///
/// # Arguments
///
/// * `src` - The plane samples with `size.width * size.height` elements.
/// * `size` - The size of the plane.
/// * `pad_x` - Padding added on the left and right sides.
/// * `pad_y` - Padding added on the top and bottom sides.
/// * `mode` - How the border is filled.
pub fn pad_plane<T: Copy + Send + Sync>(
    src: &[T],
    size: ImageSize,
    pad_x: usize,
    pad_y: usize,
    mode: PaddingMode,
) -> PaddedPlane<T> {
    let width = size.width + 2 * pad_x;
    let height = size.height + 2 * pad_y;

    let col_map = (0..width)
        .map(|x| mode.map_index(x as isize - pad_x as isize, size.width))
        .collect::<Vec<_>>();

    let data = (0..height)
        .into_par_iter()
        .flat_map_iter(|y| {
            let src_y = mode.map_index(y as isize - pad_y as isize, size.height);
            let src_row = &src[src_y * size.width..(src_y + 1) * size.width];
            col_map.iter().map(move |&sx| src_row[sx])
        })
        .collect::<Vec<T>>();

    PaddedPlane {
        data,
        width,
        height,
        pad_x,
        pad_y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_index() {
        // a b c d | ...
        let len = 4;
        assert_eq!(PaddingMode::Reflect101.map_index(-1, len), 1);
        assert_eq!(PaddingMode::Reflect101.map_index(-2, len), 2);
        assert_eq!(PaddingMode::Reflect101.map_index(4, len), 2);
        assert_eq!(PaddingMode::Reflect.map_index(-1, len), 0);
        assert_eq!(PaddingMode::Reflect.map_index(4, len), 3);
        assert_eq!(PaddingMode::Replicate.map_index(-3, len), 0);
        assert_eq!(PaddingMode::Replicate.map_index(9, len), 3);
        assert_eq!(PaddingMode::Reflect101.map_index(-5, 1), 0);
    }

    #[test]
    fn test_pad_plane_reflect101() {
        let size = ImageSize {
            width: 3,
            height: 2,
        };
        let src = [1u8, 2, 3, 4, 5, 6];
        let padded = pad_plane(&src, size, 1, 1, PaddingMode::Reflect101);
        assert_eq!(padded.width, 5);
        assert_eq!(padded.height, 4);

        #[rustfmt::skip]
        assert_eq!(
            padded.data,
            vec![
                5, 4, 5, 6, 5,
                2, 1, 2, 3, 2,
                5, 4, 5, 6, 5,
                2, 1, 2, 3, 2,
            ]
        );
        assert_eq!(padded.at(1, 1), 1);
        assert_eq!(padded.row(2), &[5, 4, 5, 6, 5]);
    }
}
