// Processor chain - stateless transformation units run at the PreProcess stage
mod adjust;
mod geometry;
mod limit_colors;

pub use adjust::{BlurProcessor, ContrastProcessor, GreyscaleProcessor, SharpenProcessor};
pub use geometry::{CropProcessor, FitProcessor, FlipProcessor, ResizeProcessor, RotateProcessor};
pub use limit_colors::LimitColorsProcessor;

use std::sync::Arc;

use image::DynamicImage;

use crate::params::RequestParameters;
use crate::pipeline::{EventPayload, PipelineError, Stage, Subscriber};

/// A stateless transformation unit invoked synchronously with the current
/// image and the validated request parameters.
///
/// Processors must be idempotent with respect to inputs that do not request
/// their transformation: when their recognized parameter keys are absent or
/// malformed they leave the image unchanged.
pub trait Processor: Send + Sync {
    fn process(
        &self,
        image: &mut DynamicImage,
        parameters: &RequestParameters,
    ) -> Result<(), PipelineError>;
}

/// Adapts a [`Processor`] to the pipeline's subscriber contract.
///
/// An absent image is a precondition violation handled here by skipping the
/// processor rather than dereferencing, so individual processors can assume
/// a present image.
pub struct ProcessorSubscriber {
    processor: Arc<dyn Processor>,
}

impl ProcessorSubscriber {
    pub fn new(processor: Arc<dyn Processor>) -> Self {
        Self { processor }
    }
}

impl Subscriber for ProcessorSubscriber {
    fn handle(&self, stage: Stage, payload: &mut EventPayload) -> Result<(), PipelineError> {
        if stage != Stage::PreProcess {
            return Ok(());
        }
        if let EventPayload::Image(event) = payload
            && let Some(image) = event.image.as_mut()
        {
            self.processor.process(image, &event.parameters)?;
        }
        Ok(())
    }
}

/// The default processor chain in registration order. Ordering is a
/// correctness requirement: geometry first, then palette work, then tonal
/// adjustments, and watermarking only afterwards at the PostProcess stage.
pub fn default_chain() -> Vec<Arc<dyn Processor>> {
    vec![
        Arc::new(RotateProcessor),
        Arc::new(FlipProcessor),
        Arc::new(CropProcessor),
        Arc::new(ResizeProcessor),
        Arc::new(FitProcessor),
        Arc::new(LimitColorsProcessor),
        Arc::new(GreyscaleProcessor),
        Arc::new(ContrastProcessor),
        Arc::new(BlurProcessor),
        Arc::new(SharpenProcessor),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::params::RequestParameters;
    use image::{DynamicImage, Rgba, RgbaImage};

    pub fn params(pairs: &[(&str, &str)]) -> RequestParameters {
        RequestParameters::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
    }

    pub fn solid_image(width: u32, height: u32, color: Rgba<u8>) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, color))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{params, solid_image};
    use super::*;
    use crate::pipeline::ImageEvent;
    use image::Rgba;

    #[test]
    fn subscriber_skips_absent_image() {
        let subscriber = ProcessorSubscriber::new(Arc::new(RotateProcessor));
        let mut payload = EventPayload::Image(ImageEvent::new(
            None,
            params(&[("rotate", "90")]),
        ));
        subscriber.handle(Stage::PreProcess, &mut payload).unwrap();
        assert!(payload.into_image().is_none());
    }

    #[test]
    fn subscriber_only_reacts_to_pre_process() {
        let subscriber = ProcessorSubscriber::new(Arc::new(RotateProcessor));
        let image = solid_image(4, 2, Rgba([10, 20, 30, 255]));
        let mut payload = EventPayload::Image(ImageEvent::new(
            Some(image),
            params(&[("rotate", "90")]),
        ));
        subscriber.handle(Stage::PostProcess, &mut payload).unwrap();
        let out = payload.into_image().unwrap();
        assert_eq!((out.width(), out.height()), (4, 2));
    }
}
