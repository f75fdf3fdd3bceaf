/// Create a box blur kernel.
///
/// # Arguments
///
/// * `kernel_size` - The size of the kernel.
///
/// # Returns
///
/// A vector of the kernel.
pub fn box_blur_kernel_1d(kernel_size: usize) -> Vec<f32> {
    vec![1.0 / kernel_size as f32; kernel_size]
}

/// Create a gaussian blur kernel.
///
/// # Arguments
///
/// * `kernel_size` - The size of the kernel.
/// * `sigma` - The sigma of the gaussian kernel.
///
/// # Returns
///
/// A vector of the kernel.
pub fn gaussian_kernel_1d(kernel_size: usize, sigma: f32) -> Vec<f32> {
    let mut kernel = Vec::with_capacity(kernel_size);

    let mean = (kernel_size - 1) as f32 / 2.0;
    let sigma_sq = sigma * sigma;

    // compute the kernel
    for i in 0..kernel_size {
        let x = i as f32 - mean;
        kernel.push((-(x * x) / (2.0 * sigma_sq)).exp());
    }

    // normalize the kernel
    let norm = kernel.iter().sum::<f32>();
    kernel.iter_mut().for_each(|k| *k /= norm);
    kernel
}

/// Sigma of the gaussian kernel implied by its size when none is given.
///
/// Uses `0.3 * ((kernel_size - 1) * 0.5 - 1) + 0.8`.
pub fn sigma_from_kernel_size(kernel_size: usize) -> f32 {
    0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Size of the gaussian kernel covering three sigmas on each side.
///
/// The result is odd and at least 3.
pub fn kernel_size_from_sigma(sigma: f32) -> usize {
    (((sigma * 6.0 + 1.0).round() as usize) | 1).max(3)
}

/// Full convolution of two 1d kernels.
fn convolve_1d(a: &[f32], b: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, &x) in a.iter().enumerate() {
        for (j, &y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// Row of binomial coefficients of length `n`, e.g. `[1, 2, 1]` for 3.
pub fn binomial_kernel_1d(n: usize) -> Vec<f32> {
    (1..n).fold(vec![1.0], |acc, _| convolve_1d(&acc, &[1.0, 1.0]))
}

/// Create the pair of 1d kernels of a sobel derivative.
///
/// # Arguments
///
/// * `kernel_size` - The aperture size, one of 1, 3, 5 or 7.
/// * `order` - The derivative order, 1 or 2.
///
/// # Returns
///
/// A tuple `(derivative, smoothing)`. The derivative kernel runs along the
/// differentiated axis, the smoothing kernel along the other one.
pub fn sobel_kernels_1d(kernel_size: usize, order: usize) -> (Vec<f32>, Vec<f32>) {
    let base: &[f32] = if order == 2 {
        &[1.0, -2.0, 1.0]
    } else {
        &[-1.0, 0.0, 1.0]
    };

    if kernel_size == 1 {
        return (base.to_vec(), vec![1.0]);
    }

    let derivative = convolve_1d(base, &binomial_kernel_1d(kernel_size - 2));
    (derivative, binomial_kernel_1d(kernel_size))
}

/// 4-neighbour Laplacian used by the aperture size 1.
#[rustfmt::skip]
pub const LAPLACIAN_KERNEL_3X3: [f32; 9] = [
    0.0,  1.0, 0.0,
    1.0, -4.0, 1.0,
    0.0,  1.0, 0.0,
];

/// Directional emboss kernel.
#[rustfmt::skip]
pub const EMBOSS_KERNEL_3X3: [f32; 9] = [
    -2.0, -1.0, 0.0,
    -1.0,  1.0, 1.0,
     0.0,  1.0, 2.0,
];

/// Identity minus `strength` times the 4-neighbour Laplacian.
#[rustfmt::skip]
pub fn sharpen_kernel(strength: f32) -> [f32; 9] {
    [
        0.0,       -strength,              0.0,
        -strength, 1.0 + 4.0 * strength,   -strength,
        0.0,       -strength,              0.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sobel_kernels_1d() {
        let (d, s) = sobel_kernels_1d(3, 1);
        assert_eq!(d, vec![-1.0, 0.0, 1.0]);
        assert_eq!(s, vec![1.0, 2.0, 1.0]);

        let (d, s) = sobel_kernels_1d(5, 1);
        assert_eq!(d, vec![-1.0, -2.0, 0.0, 2.0, 1.0]);
        assert_eq!(s, vec![1.0, 4.0, 6.0, 4.0, 1.0]);

        let (d, s) = sobel_kernels_1d(5, 2);
        assert_eq!(d, vec![1.0, 0.0, -2.0, 0.0, 1.0]);
        assert_eq!(s.len(), 5);

        let (d, s) = sobel_kernels_1d(1, 1);
        assert_eq!(d, vec![-1.0, 0.0, 1.0]);
        assert_eq!(s, vec![1.0]);
    }

    #[test]
    fn test_gaussian_kernel_1d() {
        let kernel = gaussian_kernel_1d(5, 0.5);

        let expected = [
            0.00026386508,
            0.10645077,
            0.78657067,
            0.10645077,
            0.00026386508,
        ];

        for (i, &k) in kernel.iter().enumerate() {
            approx::assert_relative_eq!(k, expected[i], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_kernel_size_rules() {
        approx::assert_relative_eq!(sigma_from_kernel_size(3), 0.8);
        approx::assert_relative_eq!(sigma_from_kernel_size(5), 1.1, epsilon = 1e-6);
        assert_eq!(kernel_size_from_sigma(1.0), 7);
        assert_eq!(kernel_size_from_sigma(0.1), 3);
        assert_eq!(binomial_kernel_1d(4), vec![1.0, 3.0, 3.0, 1.0]);
    }

    #[test]
    fn test_sharpen_kernel_sums_to_one() {
        let k = sharpen_kernel(1.5);
        approx::assert_relative_eq!(k.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        assert_eq!(k[4], 7.0);
    }
}
