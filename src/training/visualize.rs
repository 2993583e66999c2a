//! Tensor-to-image conversion for visualization summaries
//!
//! Frames are `[batch, channels, height, width]` tensors with values in
//! `[0, 1]`. Single-channel frames are shown in grayscale; for frames with
//! three or more channels the first three are shown as RGB.

use candle_core::{DType, Tensor};
use image::{imageops, RgbImage};

use crate::error::{Error, Result};
use crate::training::data::Split;

/// Convert a batch of frames into one image per sample
pub fn tensor_to_images(frames: &Tensor) -> Result<Vec<RgbImage>> {
    let (batch, channels, height, width) = frames.dims4()?;
    if channels == 0 {
        return Err(Error::config("cannot visualize frames with zero channels"));
    }

    let rgb = match channels {
        1 | 2 => {
            let gray = frames.narrow(1, 0, 1)?;
            Tensor::cat(&[&gray, &gray, &gray], 1)?
        }
        _ => frames.narrow(1, 0, 3)?,
    };

    let pixels = (rgb.to_dtype(DType::F32)?.clamp(0f32, 1f32)? * 255.0)?
        .round()?
        .to_dtype(DType::U8)?
        .permute((0, 2, 3, 1))?
        .contiguous()?
        .flatten_all()?
        .to_vec1::<u8>()?;

    let frame_len = height * width * 3;
    (0..batch)
        .map(|index| {
            let raw = pixels[index * frame_len..(index + 1) * frame_len].to_vec();
            RgbImage::from_raw(width as u32, height as u32, raw)
                .ok_or_else(|| Error::logging("frame buffer does not match image size"))
        })
        .collect()
}

/// Place each left image next to its right counterpart
pub fn side_by_side(left: &[RgbImage], right: &[RgbImage]) -> Result<Vec<RgbImage>> {
    if left.len() != right.len() {
        return Err(Error::logging(format!(
            "cannot pair {} images with {} images",
            left.len(),
            right.len()
        )));
    }

    Ok(left
        .iter()
        .zip(right)
        .map(|(a, b)| {
            let height = a.height().max(b.height());
            let mut canvas = RgbImage::new(a.width() + b.width(), height);
            imageops::replace(&mut canvas, a, 0, 0);
            imageops::replace(&mut canvas, b, i64::from(a.width()), 0);
            canvas
        })
        .collect())
}

/// Frames gathered for one split's visualization
pub struct SplitVisualization<'a> {
    /// Split the frames came from
    pub split: Split,
    /// Model inputs
    pub inputs: &'a Tensor,
    /// Reconstructions of the inputs
    pub outputs: &'a Tensor,
    /// Ground-truth targets
    pub targets: &'a Tensor,
    /// Independent decodes of prior draws
    pub samples: &'a [Tensor],
}

impl SplitVisualization<'_> {
    /// Tagged image groups: inputs alone, everything else paired with the inputs
    pub fn summaries(&self) -> Result<Vec<(String, Vec<RgbImage>)>> {
        let split = self.split;
        let inputs = tensor_to_images(self.inputs)?;

        let mut summaries = vec![
            (format!("{}-inputs", split), inputs.clone()),
            (
                format!("{}-outputs", split),
                side_by_side(&inputs, &tensor_to_images(self.outputs)?)?,
            ),
            (
                format!("{}-targets", split),
                side_by_side(&inputs, &tensor_to_images(self.targets)?)?,
            ),
        ];

        for (k, sample) in self.samples.iter().enumerate() {
            summaries.push((
                format!("{}-samples-{}", split, k + 1),
                side_by_side(&inputs, &tensor_to_images(sample)?)?,
            ));
        }

        Ok(summaries)
    }
}
