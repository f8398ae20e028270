// Pipeline core - stages, event payloads, and the subscription dispatcher
mod dispatcher;
mod event;

pub use dispatcher::{Dispatcher, DispatcherBuilder, PipelineError, Subscriber};
pub use event::{
    EventPayload, ImageEvent, ResponseEvent, ResponseMetadata, Stage, FIRST_GENERATION_HEADER,
    WATERMARKED_HEADER,
};

use image::DynamicImage;

use crate::params::RequestParameters;

/// Drive the image stages for one request: PreProcess runs the processor
/// chain, PostProcess runs the image listeners. Returns the final image,
/// which may have been replaced by any handler along the way.
pub fn run_image_stages(
    dispatcher: &Dispatcher,
    image: DynamicImage,
    parameters: RequestParameters,
) -> Result<Option<DynamicImage>, PipelineError> {
    let payload = EventPayload::Image(ImageEvent::new(Some(image), parameters));
    let payload = dispatcher.fire(Stage::PreProcess, payload)?;
    let payload = dispatcher.fire(Stage::PostProcess, payload)?;
    Ok(payload.into_image())
}

/// Drive the response stage, giving listeners a chance to inspect and
/// annotate the outgoing response metadata.
pub fn run_response_stage(
    dispatcher: &Dispatcher,
    metadata: ResponseMetadata,
) -> Result<ResponseMetadata, PipelineError> {
    let payload = EventPayload::Response(ResponseEvent::new(metadata));
    let payload = dispatcher.fire(Stage::Response, payload)?;
    Ok(payload.into_metadata())
}
