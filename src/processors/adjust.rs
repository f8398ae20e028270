use image::DynamicImage;

use super::Processor;
use crate::params::RequestParameters;
use crate::pipeline::PipelineError;

/// Desaturate when `greyscale` is truthy.
pub struct GreyscaleProcessor;

impl Processor for GreyscaleProcessor {
    fn process(
        &self,
        image: &mut DynamicImage,
        parameters: &RequestParameters,
    ) -> Result<(), PipelineError> {
        if parameters.flag(&["greyscale", "grayscale"]) {
            *image = image.grayscale();
        }
        Ok(())
    }
}

/// Contrast adjustment, `contrast` in [-100, 100].
pub struct ContrastProcessor;

impl Processor for ContrastProcessor {
    fn process(
        &self,
        image: &mut DynamicImage,
        parameters: &RequestParameters,
    ) -> Result<(), PipelineError> {
        if let Some(value) = parameters.integer(&["contrast"]) {
            if value != 0 && (-100..=100).contains(&value) {
                *image = image.adjust_contrast(value as f32);
            }
        }
        Ok(())
    }
}

/// Gaussian blur, `blur` in [1, 100] used as the sigma.
pub struct BlurProcessor;

impl Processor for BlurProcessor {
    fn process(
        &self,
        image: &mut DynamicImage,
        parameters: &RequestParameters,
    ) -> Result<(), PipelineError> {
        if let Some(value) = parameters.integer(&["blur"]) {
            if (1..=100).contains(&value) {
                *image = image.blur(value as f32);
            }
        }
        Ok(())
    }
}

/// Unsharp mask, `sharpen` in [1, 100].
pub struct SharpenProcessor;

impl Processor for SharpenProcessor {
    fn process(
        &self,
        image: &mut DynamicImage,
        parameters: &RequestParameters,
    ) -> Result<(), PipelineError> {
        if let Some(value) = parameters.integer(&["sharpen"]) {
            if (1..=100).contains(&value) {
                *image = image.unsharpen(value as f32 / 10.0, 1);
            }
        }
        Ok(())
    }
}
