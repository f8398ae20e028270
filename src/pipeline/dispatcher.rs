use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::event::{EventPayload, Stage};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Handler failed: {0}")]
    Handler(String),
}

/// Capability interface implemented by every processor and listener variant.
///
/// Handlers subscribed to several stages receive the stage tag with each
/// firing and dispatch on it; mutations of the payload are visible to the
/// subscribers that run after them in the same firing.
pub trait Subscriber: Send + Sync {
    fn handle(&self, stage: Stage, payload: &mut EventPayload) -> Result<(), PipelineError>;
}

/// Ordered mapping from stage to subscribed handlers.
///
/// Built once at startup through [`DispatcherBuilder`] and never mutated
/// afterwards, so it is shared freely across concurrent requests. Invocation
/// order equals registration order.
pub struct Dispatcher {
    table: HashMap<Stage, Vec<Arc<dyn Subscriber>>>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Invoke every handler registered for `stage` in order, passing the
    /// (possibly already-mutated) payload to each, and return the final
    /// payload. A failing handler aborts the remainder of the stage. Firing
    /// a stage with no handlers returns the payload unchanged.
    pub fn fire(
        &self,
        stage: Stage,
        mut payload: EventPayload,
    ) -> Result<EventPayload, PipelineError> {
        if let Some(handlers) = self.table.get(&stage) {
            debug!("Firing {:?} with {} handlers", stage, handlers.len());
            for handler in handlers {
                handler.handle(stage, &mut payload)?;
            }
        }
        Ok(payload)
    }

    pub fn handler_count(&self, stage: Stage) -> usize {
        self.table.get(&stage).map_or(0, Vec::len)
    }
}

#[derive(Default)]
pub struct DispatcherBuilder {
    table: HashMap<Stage, Vec<Arc<dyn Subscriber>>>,
}

impl DispatcherBuilder {
    /// Append a handler to the stage's ordered list. The same handler value
    /// may subscribe to several stages.
    pub fn register(mut self, stage: Stage, handler: Arc<dyn Subscriber>) -> Self {
        self.table.entry(stage).or_default().push(handler);
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher { table: self.table }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RequestParameters;
    use crate::pipeline::event::{ImageEvent, ResponseEvent, ResponseMetadata};
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Subscriber for Recorder {
        fn handle(&self, _stage: Stage, _payload: &mut EventPayload) -> Result<(), PipelineError> {
            self.log.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    struct Failing;

    impl Subscriber for Failing {
        fn handle(&self, _stage: Stage, _payload: &mut EventPayload) -> Result<(), PipelineError> {
            Err(PipelineError::Handler("boom".to_string()))
        }
    }

    fn image_payload() -> EventPayload {
        EventPayload::Image(ImageEvent::new(None, RequestParameters::default()))
    }

    #[test]
    fn invocation_order_is_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::builder()
            .register(
                Stage::PreProcess,
                Arc::new(Recorder {
                    name: "h1",
                    log: log.clone(),
                }),
            )
            .register(
                Stage::PreProcess,
                Arc::new(Recorder {
                    name: "h2",
                    log: log.clone(),
                }),
            )
            .register(
                Stage::PreProcess,
                Arc::new(Recorder {
                    name: "h3",
                    log: log.clone(),
                }),
            )
            .build();

        // Repeated firings invoke handlers in exactly the same order.
        for _ in 0..3 {
            dispatcher.fire(Stage::PreProcess, image_payload()).unwrap();
        }

        let entries = log.lock().unwrap();
        assert_eq!(
            *entries,
            vec!["h1", "h2", "h3", "h1", "h2", "h3", "h1", "h2", "h3"]
        );
    }

    #[test]
    fn firing_unregistered_stage_is_a_no_op() {
        let dispatcher = Dispatcher::builder().build();
        let metadata = {
            let mut m = ResponseMetadata::new();
            m.set("x-ir-first-gen", "1");
            m
        };
        let payload = dispatcher
            .fire(Stage::Response, EventPayload::Response(ResponseEvent::new(metadata)))
            .unwrap();
        assert!(payload.into_metadata().is_truthy("x-ir-first-gen"));
    }

    #[test]
    fn failing_handler_aborts_the_stage() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::builder()
            .register(
                Stage::PostProcess,
                Arc::new(Recorder {
                    name: "before",
                    log: log.clone(),
                }),
            )
            .register(Stage::PostProcess, Arc::new(Failing))
            .register(
                Stage::PostProcess,
                Arc::new(Recorder {
                    name: "after",
                    log: log.clone(),
                }),
            )
            .build();

        let result = dispatcher.fire(Stage::PostProcess, image_payload());
        assert!(result.is_err());
        assert_eq!(*log.lock().unwrap(), vec!["before"]);
    }

    #[test]
    fn handler_counts_track_registrations() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::builder()
            .register(
                Stage::PreProcess,
                Arc::new(Recorder {
                    name: "h1",
                    log: log.clone(),
                }),
            )
            .build();
        assert_eq!(dispatcher.handler_count(Stage::PreProcess), 1);
        assert_eq!(dispatcher.handler_count(Stage::Response), 0);
    }
}
