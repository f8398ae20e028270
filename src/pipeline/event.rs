use std::collections::BTreeMap;

use image::DynamicImage;

use crate::params::RequestParameters;

/// Response annotation set by the generation path when the image was
/// computed for this request rather than served from cache.
pub const FIRST_GENERATION_HEADER: &str = "x-ir-first-gen";
/// Response annotation set by the watermark listener on freshly generated
/// images so downstream caching layers need not re-inspect pixels.
pub const WATERMARKED_HEADER: &str = "x-ir-watermarked";

/// A named point in the request lifecycle at which subscribed handlers fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    PreProcess,
    PostProcess,
    Response,
}

/// Payload for the image stages. The image is threaded through the pipeline
/// by unique reference and may be absent, replaced, or mutated in place;
/// every subscriber sees the mutations of the ones before it.
pub struct ImageEvent {
    pub image: Option<DynamicImage>,
    pub parameters: RequestParameters,
}

impl ImageEvent {
    pub fn new(image: Option<DynamicImage>, parameters: RequestParameters) -> Self {
        Self { image, parameters }
    }
}

/// Payload for the response stage.
pub struct ResponseEvent {
    pub metadata: ResponseMetadata,
}

impl ResponseEvent {
    pub fn new(metadata: ResponseMetadata) -> Self {
        Self { metadata }
    }
}

/// Header-like annotations attached to the outgoing response. Keys are
/// case-insensitive (stored lowercase).
#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    values: BTreeMap<String, String>,
}

impl ResponseMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Truthiness of an annotation: absent, empty, and "0" are falsy,
    /// everything else is truthy.
    pub fn is_truthy(&self, key: &str) -> bool {
        matches!(self.get(key), Some(value) if !value.is_empty() && value != "0")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Tagged event payload carried to every subscriber of a stage firing.
pub enum EventPayload {
    Image(ImageEvent),
    Response(ResponseEvent),
}

impl EventPayload {
    pub fn into_image(self) -> Option<DynamicImage> {
        match self {
            EventPayload::Image(event) => event.image,
            EventPayload::Response(_) => None,
        }
    }

    pub fn into_metadata(self) -> ResponseMetadata {
        match self {
            EventPayload::Response(event) => event.metadata,
            EventPayload::Image(_) => ResponseMetadata::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_keys_are_case_insensitive() {
        let mut metadata = ResponseMetadata::new();
        metadata.set("X-IR-First-Gen", "1");
        assert_eq!(metadata.get("x-ir-first-gen"), Some("1"));
        assert_eq!(metadata.get(FIRST_GENERATION_HEADER), Some("1"));
    }

    #[test]
    fn truthiness_matches_loose_boolean_cast() {
        let mut metadata = ResponseMetadata::new();
        assert!(!metadata.is_truthy(FIRST_GENERATION_HEADER));

        metadata.set(FIRST_GENERATION_HEADER, "0");
        assert!(!metadata.is_truthy(FIRST_GENERATION_HEADER));

        metadata.set(FIRST_GENERATION_HEADER, "");
        assert!(!metadata.is_truthy(FIRST_GENERATION_HEADER));

        metadata.set(FIRST_GENERATION_HEADER, "1");
        assert!(metadata.is_truthy(FIRST_GENERATION_HEADER));

        metadata.set(FIRST_GENERATION_HEADER, "yes");
        assert!(metadata.is_truthy(FIRST_GENERATION_HEADER));
    }
}
