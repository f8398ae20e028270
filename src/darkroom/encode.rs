use image::{DynamicImage, ImageEncoder, ImageFormat, codecs::jpeg::JpegEncoder};
use std::path::Path;
use tracing::debug;

use super::DarkroomError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Jpeg,
    WebP,
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::WebP => "webp",
            OutputFormat::Png => "png",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::WebP => "image/webp",
            OutputFormat::Png => "image/png",
        }
    }

    /// Pick the output format from the Accept header and the source
    /// extension: WebP opportunistically when the client advertises it,
    /// otherwise the source's own family (PNG stays PNG, everything else
    /// becomes JPEG).
    pub fn negotiate(accept_header: &str, path: &str) -> Self {
        if accept_header.contains("image/webp") {
            return OutputFormat::WebP;
        }
        let lower = path.to_lowercase();
        if lower.ends_with(".png") {
            OutputFormat::Png
        } else if lower.ends_with(".webp") {
            OutputFormat::WebP
        } else {
            OutputFormat::Jpeg
        }
    }
}

/// Encode the final image into the cache file.
pub fn save_image(
    image: &DynamicImage,
    path: &Path,
    format: OutputFormat,
    jpeg_quality: u8,
    webp_quality: f32,
) -> Result<(), DarkroomError> {
    match format {
        OutputFormat::Jpeg => {
            // JPEG doesn't support alpha, convert to RGB first.
            let rgb_image = image.to_rgb8();
            let output = std::fs::File::create(path)?;
            let encoder = JpegEncoder::new_with_quality(output, jpeg_quality);
            encoder.write_image(
                &rgb_image,
                rgb_image.width(),
                rgb_image.height(),
                image::ExtendedColorType::Rgb8,
            )?;
            debug!("JPEG written at quality {}", jpeg_quality);
        }
        OutputFormat::WebP => {
            let rgb_image = image.to_rgb8();
            let (width, height) = rgb_image.dimensions();
            let rgb_data = rgb_image.into_raw();
            let encoder = webp::Encoder::from_rgb(&rgb_data, width, height);
            let encoded = encoder.encode(webp_quality);
            std::fs::write(path, &*encoded)?;
            debug!("WebP written at quality {}", webp_quality);
        }
        OutputFormat::Png => {
            image.save_with_format(path, ImageFormat::Png)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_prefers_webp_when_advertised() {
        assert_eq!(
            OutputFormat::negotiate("image/avif,image/webp,*/*", "photo.jpg"),
            OutputFormat::WebP
        );
    }

    #[test]
    fn negotiation_falls_back_to_source_family() {
        assert_eq!(
            OutputFormat::negotiate("*/*", "photo.PNG"),
            OutputFormat::Png
        );
        assert_eq!(
            OutputFormat::negotiate("*/*", "photo.webp"),
            OutputFormat::WebP
        );
        assert_eq!(
            OutputFormat::negotiate("*/*", "photo.jpeg"),
            OutputFormat::Jpeg
        );
    }

    #[test]
    fn formats_round_trip_extension_and_mime() {
        for (format, ext, mime) in [
            (OutputFormat::Jpeg, "jpg", "image/jpeg"),
            (OutputFormat::WebP, "webp", "image/webp"),
            (OutputFormat::Png, "png", "image/png"),
        ] {
            assert_eq!(format.extension(), ext);
            assert_eq!(format.mime_type(), mime);
        }
    }
}
