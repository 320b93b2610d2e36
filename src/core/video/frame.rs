use std::ops::Range;

use image::{GrayImage, RgbImage};

/// 帧数据结构（RGB24，行优先）
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), (width * height * 3) as usize);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self::new(width, height, data)
    }

    pub fn from_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = ((y * self.width + x) * 3) as usize;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let idx = ((y * self.width + x) * 3) as usize;
        self.data[idx..idx + 3].copy_from_slice(&rgb);
    }

    /// Fill an axis-aligned rectangle, clipped to the frame.
    pub fn fill_rect(&mut self, x: Range<u32>, y: Range<u32>, rgb: [u8; 3]) {
        for py in y.start..y.end.min(self.height) {
            for px in x.start..x.end.min(self.width) {
                self.set_pixel(px, py, rgb);
            }
        }
    }

    pub fn to_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    pub fn to_gray(&self) -> GrayImage {
        let gray: Vec<u8> = self.data.chunks_exact(3).map(luma).collect();
        GrayImage::from_raw(self.width, self.height, gray)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    /// Single color plane as a grayscale buffer.
    pub fn channel(&self, index: usize) -> GrayImage {
        let plane: Vec<u8> = self.data.chunks_exact(3).map(|px| px[index]).collect();
        GrayImage::from_raw(self.width, self.height, plane)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    /// Copy out a sub-rectangle; ranges are clipped to the frame.
    pub fn crop(&self, x: Range<u32>, y: Range<u32>) -> Frame {
        let x0 = x.start.min(self.width);
        let x1 = x.end.clamp(x0, self.width);
        let y0 = y.start.min(self.height);
        let y1 = y.end.clamp(y0, self.height);

        let row_len = ((x1 - x0) * 3) as usize;
        let mut data = Vec::with_capacity(row_len * (y1 - y0) as usize);
        for py in y0..y1 {
            let start = ((py * self.width + x0) * 3) as usize;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }

        Frame::new(x1 - x0, y1 - y0, data)
    }

    /// Per-channel absolute difference, same shape as the inputs.
    pub fn abs_diff(&self, other: &Frame) -> Frame {
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a.abs_diff(*b))
            .collect();
        Frame::new(self.width, self.height, data)
    }
}

/// BT.601 luma, integer form
pub fn luma(rgb: &[u8]) -> u8 {
    ((rgb[0] as u32 * 299 + rgb[1] as u32 * 587 + rgb[2] as u32 * 114) / 1000) as u8
}
