/// BT.601 luma weights in 16.16 fixed point (0.299, 0.587, 0.114).
const LUMA_R: u32 = 19595;
const LUMA_G: u32 = 38470;
const LUMA_B: u32 = 7471;

/// A single photo or video frame: contiguous bytes in row-major order.
///
/// Colour frames are RGB (3 channels); luminance frames carry 1 channel.
/// Format conversion happens at I/O boundaries only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Single-channel luminance copy of this frame.
    ///
    /// RGB input is weighted with the BT.601 coefficients; frames that are
    /// already single-channel are cloned as-is.
    pub fn to_luma(&self) -> Frame {
        if self.channels == 1 {
            return self.clone();
        }
        let channels = self.channels as usize;
        let luma = self
            .data
            .chunks_exact(channels)
            .map(|px| {
                let (r, g, b) = if channels >= 3 {
                    (px[0] as u32, px[1] as u32, px[2] as u32)
                } else {
                    (px[0] as u32, px[0] as u32, px[0] as u32)
                };
                ((r * LUMA_R + g * LUMA_G + b * LUMA_B + (1 << 15)) >> 16) as u8
            })
            .collect();
        Frame::new(luma, self.width, self.height, 1, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 3, 5);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.index(), 5);
        assert_eq!(frame.data(), &data[..]);
    }

    #[test]
    fn test_data_mut_allows_modification() {
        let mut frame = Frame::new(vec![0u8; 6], 2, 1, 3, 0);
        frame.data_mut()[0] = 255;
        assert_eq!(frame.data()[0], 255);
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        Frame::new(vec![0u8; 10], 2, 2, 3, 0);
    }

    #[test]
    fn test_to_luma_pure_colours() {
        // red, green, blue, white
        let data = vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255];
        let luma = Frame::new(data, 4, 1, 3, 7).to_luma();
        assert_eq!(luma.channels(), 1);
        assert_eq!(luma.index(), 7);
        assert_eq!(luma.data(), &[76, 150, 29, 255]);
    }

    #[test]
    fn test_to_luma_grey_is_identity() {
        let luma = Frame::new(vec![90; 2 * 2 * 3], 2, 2, 3, 0).to_luma();
        assert!(luma.data().iter().all(|&v| v == 90));
    }

    #[test]
    fn test_to_luma_of_luma_is_clone() {
        let frame = Frame::new(vec![1, 2, 3, 4], 2, 2, 1, 0);
        assert_eq!(frame.to_luma(), frame);
    }
}
