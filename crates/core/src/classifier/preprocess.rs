//! Frame preprocessing
//!
//! Converts a captured frame into the fixed-size, normalized tensor the classifier
//! expects: smooth resize to `side x side`, row-major pixel walk, per-component
//! `(v - mean) / std`, channel-interleaved output. No colour-space conversion or
//! orientation correction is applied.

use crate::error::PreprocessError;
use crate::models::{FrameSample, InputTensor, PixelFormat};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Pixel, Rgb, Rgba};

/// Default normalization mean, maps 0..255 onto roughly -1..1 together with the std
pub const DEFAULT_MEAN: f32 = 127.5;

/// Default normalization standard deviation
pub const DEFAULT_STD: f32 = 127.5;

/// Per-component normalization applied to 8-bit values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub mean: f32,
    pub std: f32,
}

impl Normalization {
    pub fn new(mean: f32, std: f32) -> Self {
        Self { mean, std }
    }

    #[inline]
    pub fn apply(&self, value: u8) -> f32 {
        (value as f32 - self.mean) / self.std
    }
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            mean: DEFAULT_MEAN,
            std: DEFAULT_STD,
        }
    }
}

/// Convert a frame into a `target_side² × channels` tensor
pub fn preprocess(
    frame: &FrameSample,
    target_side: u32,
    channels: u32,
    normalization: Normalization,
) -> Result<InputTensor, PreprocessError> {
    if !matches!(channels, 1 | 3) {
        return Err(PreprocessError::UnsupportedChannels(channels));
    }
    frame.validate()?;

    let capacity = target_side as usize * target_side as usize * channels as usize;
    let mut data = Vec::with_capacity(capacity);

    match frame.format {
        PixelFormat::Luma8 => {
            let resized = resize::<Luma<u8>>(frame, target_side)?;
            write_components(&resized, channels, normalization, &mut data);
        }
        PixelFormat::Rgb8 => {
            let resized = resize::<Rgb<u8>>(frame, target_side)?;
            write_components(&resized, channels, normalization, &mut data);
        }
        PixelFormat::Rgba8 => {
            let resized = resize::<Rgba<u8>>(frame, target_side)?;
            write_components(&resized, channels, normalization, &mut data);
        }
    }

    debug_assert_eq!(data.len(), capacity);

    Ok(InputTensor {
        side: target_side,
        channels,
        data,
    })
}

fn resize<P>(frame: &FrameSample, side: u32) -> Result<ImageBuffer<P, Vec<u8>>, PreprocessError>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let view = ImageBuffer::<P, &[u8]>::from_raw(frame.width, frame.height, frame.data.as_slice())
        .ok_or(PreprocessError::BufferMismatch {
            expected: frame.expected_len(),
            actual: frame.data.len(),
        })?;
    Ok(imageops::resize(&view, side, side, FilterType::Triangle))
}

fn write_components<P>(
    image: &ImageBuffer<P, Vec<u8>>,
    channels: u32,
    normalization: Normalization,
    out: &mut Vec<f32>,
) where
    P: Pixel<Subpixel = u8>,
{
    for pixel in image.pixels() {
        if channels == 1 {
            out.push(normalization.apply(pixel.to_luma().0[0]));
        } else {
            let Rgb(rgb) = pixel.to_rgb();
            out.extend(rgb.iter().map(|&v| normalization.apply(v)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> FrameSample {
        let data = rgb.repeat((width * height) as usize);
        FrameSample::new(width, height, PixelFormat::Rgb8, data)
    }

    #[test]
    fn test_tensor_shape_224_rgb() {
        let frame = solid_frame(640, 480, [10, 200, 255]);
        let tensor = preprocess(&frame, 224, 3, Normalization::default()).unwrap();

        assert_eq!(tensor.len(), 150_528);
        assert_eq!(tensor.shape(), [1, 224, 224, 3]);
        assert!(tensor.as_slice().iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_normalization_bounds() {
        let norm = Normalization::default();
        assert_eq!(norm.apply(0), -1.0);
        assert_eq!(norm.apply(255), 1.0);
        assert!(norm.apply(127).abs() < 0.01);
    }

    #[test]
    fn test_channels_interleaved() {
        let frame = solid_frame(8, 8, [0, 255, 0]);
        let tensor = preprocess(&frame, 4, 3, Normalization::default()).unwrap();

        for pixel in tensor.as_slice().chunks(3) {
            assert_eq!(pixel, &[-1.0, 1.0, -1.0]);
        }
    }

    #[test]
    fn test_rgba_alpha_dropped() {
        let data = [255u8, 0, 0, 255].repeat(16);
        let frame = FrameSample::new(4, 4, PixelFormat::Rgba8, data);
        let tensor = preprocess(&frame, 2, 3, Normalization::default()).unwrap();

        assert_eq!(tensor.len(), 12);
        for pixel in tensor.as_slice().chunks(3) {
            assert_eq!(pixel, &[1.0, -1.0, -1.0]);
        }
    }

    #[test]
    fn test_single_channel_output() {
        let frame = FrameSample::new(6, 6, PixelFormat::Luma8, vec![255; 36]);
        let tensor = preprocess(&frame, 3, 1, Normalization::default()).unwrap();

        assert_eq!(tensor.len(), 9);
        assert!(tensor.as_slice().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_corrupt_buffer_rejected() {
        let frame = FrameSample::new(10, 10, PixelFormat::Rgb8, vec![0; 50]);
        let err = preprocess(&frame, 224, 3, Normalization::default()).unwrap_err();
        assert_eq!(
            err,
            PreprocessError::BufferMismatch {
                expected: 300,
                actual: 50
            }
        );
    }

    #[test]
    fn test_unsupported_channels() {
        let frame = solid_frame(4, 4, [1, 2, 3]);
        let err = preprocess(&frame, 2, 4, Normalization::default()).unwrap_err();
        assert_eq!(err, PreprocessError::UnsupportedChannels(4));
    }
}
