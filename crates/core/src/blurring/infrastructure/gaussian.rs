/// ROI rectangle within a frame, in whole pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoiRect {
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
}

/// Normalised 1D Gaussian kernel of odd length `kernel_size` and standard deviation `sigma`.
pub fn gaussian_kernel_1d(kernel_size: usize, sigma: f64) -> Vec<f32> {
    debug_assert!(kernel_size >= 1 && kernel_size % 2 == 1);
    debug_assert!(sigma > 0.0);
    let half = (kernel_size / 2) as f64;
    let weights: Vec<f64> = (0..kernel_size)
        .map(|i| {
            let x = i as f64 - half;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter().map(|&v| (v / sum) as f32).collect()
}

/// Source index for every position of a line padded by `half` on both
/// sides, mirroring about the edge pixels (`dcb|abcd|cba`).
fn reflect_101_map(len: usize, half: usize) -> Vec<usize> {
    (0..len + 2 * half)
        .map(|p| {
            if len == 1 {
                return 0;
            }
            let last = (len - 1) as isize;
            let mut i = p as isize - half as isize;
            while i < 0 || i > last {
                if i < 0 {
                    i = -i;
                }
                if i > last {
                    i = 2 * last - i;
                }
            }
            i as usize
        })
        .collect()
}

/// Separable Gaussian blur of a tightly packed `width` x `height` image, in place.
///
/// Borders mirror without repeating the edge pixel. `temp` is scratch space
/// reused across calls.
pub fn separable_gaussian_blur_with_kernel(
    data: &mut [u8],
    width: usize,
    height: usize,
    channels: usize,
    kernel: &[f32],
    temp: &mut Vec<f32>,
) {
    let kernel_size = kernel.len();
    if kernel_size <= 1 || width == 0 || height == 0 {
        return;
    }
    let half = kernel_size / 2;
    let x_map = reflect_101_map(width, half);
    let y_map = reflect_101_map(height, half);

    temp.clear();
    temp.resize(width * height * channels, 0.0);

    // Horizontal pass: data → temp
    for y in 0..height {
        let row = y * width;
        for x in 0..width {
            for c in 0..channels {
                let mut sum = 0.0f32;
                for (k, &w) in kernel.iter().enumerate() {
                    sum += data[(row + x_map[x + k]) * channels + c] as f32 * w;
                }
                temp[(row + x) * channels + c] = sum;
            }
        }
    }

    // Vertical pass: temp → data
    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let mut sum = 0.0f32;
                for (k, &w) in kernel.iter().enumerate() {
                    sum += temp[(y_map[y + k] * width + x) * channels + c] * w;
                }
                data[(y * width + x) * channels + c] = sum.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Copy a rectangular ROI out of frame data into a reusable buffer.
pub fn extract_roi(data: &[u8], frame_width: usize, channels: usize, rect: RoiRect, roi: &mut Vec<u8>) {
    let row_len = rect.w * channels;
    roi.resize(row_len * rect.h, 0);
    for row in 0..rect.h {
        let src = ((rect.y + row) * frame_width + rect.x) * channels;
        roi[row * row_len..(row + 1) * row_len].copy_from_slice(&data[src..src + row_len]);
    }
}

/// Write an ROI buffer back into frame data.
pub fn write_roi_back(data: &mut [u8], roi: &[u8], frame_width: usize, channels: usize, rect: RoiRect) {
    let row_len = rect.w * channels;
    for row in 0..rect.h {
        let dst = ((rect.y + row) * frame_width + rect.x) * channels;
        data[dst..dst + row_len].copy_from_slice(&roi[row * row_len..(row + 1) * row_len]);
    }
}
