use std::path::PathBuf;

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::builtin_font;
use crate::params::HexColor;
use crate::pipeline::{
    EventPayload, PipelineError, Stage, Subscriber, FIRST_GENERATION_HEADER, WATERMARKED_HEADER,
};

#[derive(Debug, Error)]
pub enum WatermarkConfigError {
    #[error("Failed to read font file {0}: {1}")]
    FontRead(PathBuf, std::io::Error),

    #[error("Failed to parse font file {0}")]
    FontParse(PathBuf),

    #[error("Builtin font id must be between 1 and 5, got {0}")]
    InvalidBuiltinFont(u8),

    #[error("Unrecognized watermark color: {0}")]
    InvalidColor(String),
}

/// Font reference: a path to a TrueType file, or an integer 1-5 selecting
/// one of the builtin bitmap faces. Font sizing and rotation only apply to
/// file fonts; builtin faces accept them without visual effect.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FontSetting {
    Builtin(u8),
    File(PathBuf),
}

impl Default for FontSetting {
    fn default() -> Self {
        FontSetting::Builtin(1)
    }
}

/// Fill color: a hex string (leading `#` optional), a named color, or an
/// `[r, g, b]` component triplet.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ColorSetting {
    Triplet([u8; 3]),
    Named(String),
}

impl Default for ColorSetting {
    fn default() -> Self {
        ColorSetting::Named("ffffff".to_string())
    }
}

impl ColorSetting {
    fn resolve(&self) -> Result<Rgba<u8>, WatermarkConfigError> {
        match self {
            ColorSetting::Triplet([r, g, b]) => Ok(Rgba([*r, *g, *b, 255])),
            ColorSetting::Named(name) => {
                let named = match name.to_ascii_lowercase().as_str() {
                    "white" => Some([255, 255, 255]),
                    "black" => Some([0, 0, 0]),
                    "red" => Some([255, 0, 0]),
                    "green" => Some([0, 255, 0]),
                    "blue" => Some([0, 0, 255]),
                    _ => None,
                };
                if let Some([r, g, b]) = named {
                    return Ok(Rgba([r, g, b, 255]));
                }
                let stripped = name.strip_prefix('#').unwrap_or(name);
                HexColor::parse(stripped)
                    .map(|c| {
                        let [r, g, b] = c.rgb();
                        Rgba([r, g, b, 255])
                    })
                    .ok_or_else(|| WatermarkConfigError::InvalidColor(name.clone()))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HorizontalAlign {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalAlign {
    Top,
    #[default]
    #[serde(alias = "center")]
    Middle,
    Bottom,
}

/// Watermark settings, supplied at registration time rather than per-request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatermarkConfig {
    pub text: String,
    #[serde(default)]
    pub font: FontSetting,
    #[serde(default = "default_size")]
    pub size: f32,
    #[serde(default)]
    pub color: ColorSetting,
    #[serde(default)]
    pub align: HorizontalAlign,
    #[serde(default)]
    pub valign: VerticalAlign,
    /// Rotation in degrees, counter-clockwise around the aligned basepoint.
    #[serde(default)]
    pub angle: i32,
}

fn default_size() -> f32 {
    24.0
}

enum ResolvedFont {
    /// Builtin id doubles as the integer pixel scale of the bitmap face.
    Builtin(u8),
    Outline(FontVec),
}

/// Renders configured text onto freshly processed images (PostProcess) and
/// marks freshly generated responses as watermarked (Response) so cached
/// output is never misreported as newly watermarked.
pub struct WatermarkListener {
    text: String,
    font: ResolvedFont,
    size: f32,
    color: Rgba<u8>,
    align: HorizontalAlign,
    valign: VerticalAlign,
    angle: i32,
    supports: Box<dyn Fn(&DynamicImage) -> bool + Send + Sync>,
}

impl WatermarkListener {
    /// Resolves the font and color settings once; configuration errors
    /// (unreadable font file, bad color) surface here, at startup.
    pub fn from_config(config: &WatermarkConfig) -> Result<Self, WatermarkConfigError> {
        let font = match &config.font {
            FontSetting::Builtin(id) => {
                if !(1..=5).contains(id) {
                    return Err(WatermarkConfigError::InvalidBuiltinFont(*id));
                }
                ResolvedFont::Builtin(*id)
            }
            FontSetting::File(path) => {
                let data = std::fs::read(path)
                    .map_err(|e| WatermarkConfigError::FontRead(path.clone(), e))?;
                let font = FontVec::try_from_vec(data)
                    .map_err(|_| WatermarkConfigError::FontParse(path.clone()))?;
                ResolvedFont::Outline(font)
            }
        };

        Ok(Self {
            text: config.text.clone(),
            font,
            size: config.size,
            color: config.color.resolve()?,
            align: config.align,
            valign: config.valign,
            angle: config.angle,
            supports: Box::new(|_| true),
        })
    }

    /// Replace the exclusion predicate deciding which images receive a
    /// watermark. The default accepts every present image.
    pub fn with_supports(
        mut self,
        predicate: impl Fn(&DynamicImage) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.supports = Box::new(predicate);
        self
    }

    /// Top-left drawing position for a text block of (width, height)
    /// aligned relative to the basepoint.
    fn block_origin(&self, basepoint: (u32, u32), width: u32, height: u32) -> (i32, i32) {
        let (bx, by) = (basepoint.0 as i32, basepoint.1 as i32);
        let x = match self.align {
            HorizontalAlign::Left => bx,
            HorizontalAlign::Center => bx - width as i32 / 2,
            HorizontalAlign::Right => bx - width as i32,
        };
        let y = match self.valign {
            VerticalAlign::Top => by,
            VerticalAlign::Middle => by - height as i32 / 2,
            VerticalAlign::Bottom => by - height as i32,
        };
        (x, y)
    }

    fn render(&self, image: &mut DynamicImage) {
        let mut canvas = image.to_rgba8();
        let basepoint = (canvas.width() / 2, canvas.height() / 2);

        match &self.font {
            ResolvedFont::Builtin(id) => {
                // Size and rotation have no effect for the bitmap faces.
                let scale = *id as u32;
                let (width, height) = builtin_font::text_extent(&self.text, scale);
                let (x, y) = self.block_origin(basepoint, width, height);
                builtin_font::draw_text(&mut canvas, self.color, x, y, scale, &self.text);
            }
            ResolvedFont::Outline(font) => {
                let scale = PxScale::from(self.size);
                let (width, height) = text_size(scale, font, &self.text);
                if self.angle == 0 {
                    let (x, y) = self.block_origin(basepoint, width, height);
                    draw_text_mut(&mut canvas, self.color, x, y, scale, font, &self.text);
                } else {
                    self.render_rotated(&mut canvas, font, scale, basepoint, width, height);
                }
            }
        }

        *image = DynamicImage::ImageRgba8(canvas);
    }

    /// Draw the text on a transparent layer, rotate it counter-clockwise,
    /// and composite the layer so the text block lands on the basepoint.
    fn render_rotated(
        &self,
        canvas: &mut RgbaImage,
        font: &FontVec,
        scale: PxScale,
        basepoint: (u32, u32),
        width: u32,
        height: u32,
    ) {
        let side =
            (f64::from(width).powi(2) + f64::from(height).powi(2)).sqrt().ceil() as u32 + 2;
        let margin_x = (side - width) / 2;
        let margin_y = (side - height) / 2;

        let mut layer = RgbaImage::from_pixel(side, side, Rgba([0, 0, 0, 0]));
        draw_text_mut(
            &mut layer,
            self.color,
            margin_x as i32,
            margin_y as i32,
            scale,
            font,
            &self.text,
        );

        let theta = -(self.angle as f32).to_radians();
        let rotated = rotate_about_center(&layer, theta, Interpolation::Bilinear, Rgba([0, 0, 0, 0]));

        let (x, y) = self.block_origin(basepoint, width, height);
        image::imageops::overlay(
            canvas,
            &rotated,
            i64::from(x) - i64::from(margin_x),
            i64::from(y) - i64::from(margin_y),
        );
    }
}

impl Subscriber for WatermarkListener {
    fn handle(&self, stage: Stage, payload: &mut EventPayload) -> Result<(), PipelineError> {
        match (stage, payload) {
            (Stage::PostProcess, EventPayload::Image(event)) => {
                match event.image.as_mut() {
                    Some(image) if (self.supports)(image) => self.render(image),
                    Some(_) => debug!("Watermark predicate rejected image, skipping"),
                    None => {}
                }
                Ok(())
            }
            (Stage::Response, EventPayload::Response(event)) => {
                if event.metadata.is_truthy(FIRST_GENERATION_HEADER) {
                    event.metadata.set(WATERMARKED_HEADER, "1");
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RequestParameters;
    use crate::pipeline::{ImageEvent, ResponseEvent, ResponseMetadata};

    fn builtin_config(text: &str) -> WatermarkConfig {
        WatermarkConfig {
            text: text.to_string(),
            font: FontSetting::Builtin(2),
            size: 24.0,
            color: ColorSetting::Named("ff00ff".to_string()),
            align: HorizontalAlign::Center,
            valign: VerticalAlign::Middle,
            angle: 0,
        }
    }

    fn image_event(image: Option<DynamicImage>) -> EventPayload {
        EventPayload::Image(ImageEvent::new(image, RequestParameters::default()))
    }

    #[test]
    fn absent_image_is_a_no_op() {
        let listener = WatermarkListener::from_config(&builtin_config("SAMPLE")).unwrap();
        let mut payload = image_event(None);
        listener.handle(Stage::PostProcess, &mut payload).unwrap();
        assert!(payload.into_image().is_none());
    }

    #[test]
    fn builtin_font_renders_text_at_center() {
        let listener = WatermarkListener::from_config(&builtin_config("SAMPLE")).unwrap();
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            200,
            100,
            Rgba([0, 0, 0, 255]),
        ));
        let mut payload = image_event(Some(image));
        listener.handle(Stage::PostProcess, &mut payload).unwrap();

        let out = payload.into_image().unwrap().to_rgba8();
        let magenta = out
            .pixels()
            .filter(|p| p.0 == [255, 0, 255, 255])
            .count();
        assert!(magenta > 0, "no watermark pixels rendered");

        // Centered block: watermark pixels stay inside the middle band.
        let outside = out
            .enumerate_pixels()
            .filter(|(_, y, p)| p.0 == [255, 0, 255, 255] && (*y < 25 || *y > 75))
            .count();
        assert_eq!(outside, 0);
    }

    #[test]
    fn supports_predicate_is_replaceable() {
        let listener = WatermarkListener::from_config(&builtin_config("SAMPLE"))
            .unwrap()
            .with_supports(|image| image.width() >= 1000);
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            100,
            100,
            Rgba([0, 0, 0, 255]),
        ));
        let before = image.clone();
        let mut payload = image_event(Some(image));
        listener.handle(Stage::PostProcess, &mut payload).unwrap();
        assert_eq!(
            payload.into_image().unwrap().as_bytes(),
            before.as_bytes()
        );
    }

    #[test]
    fn response_annotation_follows_first_generation_flag() {
        let listener = WatermarkListener::from_config(&builtin_config("SAMPLE")).unwrap();

        // Unset flag: never annotated.
        let mut payload =
            EventPayload::Response(ResponseEvent::new(ResponseMetadata::new()));
        listener.handle(Stage::Response, &mut payload).unwrap();
        assert!(payload.into_metadata().get(WATERMARKED_HEADER).is_none());

        // Falsy flag: never annotated.
        let mut metadata = ResponseMetadata::new();
        metadata.set(FIRST_GENERATION_HEADER, "0");
        let mut payload = EventPayload::Response(ResponseEvent::new(metadata));
        listener.handle(Stage::Response, &mut payload).unwrap();
        assert!(payload.into_metadata().get(WATERMARKED_HEADER).is_none());

        // Truthy flag: annotated with "1".
        let mut metadata = ResponseMetadata::new();
        metadata.set(FIRST_GENERATION_HEADER, "1");
        let mut payload = EventPayload::Response(ResponseEvent::new(metadata));
        listener.handle(Stage::Response, &mut payload).unwrap();
        assert_eq!(payload.into_metadata().get(WATERMARKED_HEADER), Some("1"));
    }

    #[test]
    fn builtin_font_id_is_validated() {
        let mut config = builtin_config("SAMPLE");
        config.font = FontSetting::Builtin(0);
        assert!(matches!(
            WatermarkListener::from_config(&config),
            Err(WatermarkConfigError::InvalidBuiltinFont(0))
        ));
        config.font = FontSetting::Builtin(6);
        assert!(WatermarkListener::from_config(&config).is_err());
    }

    #[test]
    fn color_settings_resolve() {
        assert_eq!(
            ColorSetting::Named("#FFFFFF".to_string()).resolve().unwrap(),
            Rgba([255, 255, 255, 255])
        );
        assert_eq!(
            ColorSetting::Named("black".to_string()).resolve().unwrap(),
            Rgba([0, 0, 0, 255])
        );
        assert_eq!(
            ColorSetting::Triplet([1, 2, 3]).resolve().unwrap(),
            Rgba([1, 2, 3, 255])
        );
        assert!(ColorSetting::Named("chartreuse-ish".to_string())
            .resolve()
            .is_err());
    }

    #[test]
    fn config_deserializes_from_toml() {
        let config: WatermarkConfig = toml_edit::de::from_str(
            r#"
            text = "SAMPLE"
            font = 3
            size = 24.0
            color = [255, 255, 255]
            align = "center"
            valign = "center"
            angle = 0
            "#,
        )
        .unwrap();
        assert!(matches!(config.font, FontSetting::Builtin(3)));
        assert_eq!(config.valign, VerticalAlign::Middle);
        assert!(matches!(config.color, ColorSetting::Triplet(_)));
    }
}
