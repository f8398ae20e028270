use image::{DynamicImage, imageops::FilterType};

use super::Processor;
use crate::params::RequestParameters;
use crate::pipeline::PipelineError;

/// Quarter-turn rotation via the `rotate` parameter. Values other than
/// 90, 180 and 270 are treated as not requested.
pub struct RotateProcessor;

impl Processor for RotateProcessor {
    fn process(
        &self,
        image: &mut DynamicImage,
        parameters: &RequestParameters,
    ) -> Result<(), PipelineError> {
        match parameters.integer(&["rotate"]) {
            Some(90) => *image = image.rotate90(),
            Some(180) => *image = image.rotate180(),
            Some(270) => *image = image.rotate270(),
            _ => {}
        }
        Ok(())
    }
}

/// Mirror via `flip=h` or `flip=v`.
pub struct FlipProcessor;

impl Processor for FlipProcessor {
    fn process(
        &self,
        image: &mut DynamicImage,
        parameters: &RequestParameters,
    ) -> Result<(), PipelineError> {
        match parameters.first_of(&["flip"]) {
            Some("h") => *image = image.fliph(),
            Some("v") => *image = image.flipv(),
            _ => {}
        }
        Ok(())
    }
}

/// Center crop to at most `crop=WxH`.
pub struct CropProcessor;

impl Processor for CropProcessor {
    fn process(
        &self,
        image: &mut DynamicImage,
        parameters: &RequestParameters,
    ) -> Result<(), PipelineError> {
        if let Some((width, height)) = parameters.dimensions(&["crop"]) {
            let crop_width = width.min(image.width());
            let crop_height = height.min(image.height());
            let x = (image.width() - crop_width) / 2;
            let y = (image.height() - crop_height) / 2;
            *image = image.crop_imm(x, y, crop_width, crop_height);
        }
        Ok(())
    }
}

/// Resize within a bounding box from `width` and/or `height`, preserving
/// aspect ratio. Never upscales: requested dimensions larger than the
/// original are clamped to the original.
pub struct ResizeProcessor;

impl Processor for ResizeProcessor {
    fn process(
        &self,
        image: &mut DynamicImage,
        parameters: &RequestParameters,
    ) -> Result<(), PipelineError> {
        let width = parameters
            .integer(&["width"])
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0);
        let height = parameters
            .integer(&["height"])
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0);

        if width.is_none() && height.is_none() {
            return Ok(());
        }

        let target_width = width.unwrap_or(u32::MAX).min(image.width());
        let target_height = height.unwrap_or(u32::MAX).min(image.height());

        if target_width != image.width() || target_height != image.height() {
            *image = image.resize(target_width, target_height, FilterType::Lanczos3);
        }
        Ok(())
    }
}

/// Crop-resize to exactly `fit=WxH`, filling the box and trimming overflow.
pub struct FitProcessor;

impl Processor for FitProcessor {
    fn process(
        &self,
        image: &mut DynamicImage,
        parameters: &RequestParameters,
    ) -> Result<(), PipelineError> {
        if let Some((width, height)) = parameters.dimensions(&["fit"]) {
            let width = width.min(image.width());
            let height = height.min(image.height());
            if width != image.width() || height != image.height() {
                *image = image.resize_to_fill(width, height, FilterType::Lanczos3);
            }
        }
        Ok(())
    }
}
