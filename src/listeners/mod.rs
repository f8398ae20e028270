// Lifecycle listeners - units subscribed to named pipeline stages
mod builtin_font;
mod watermark;

pub use watermark::{
    ColorSetting, FontSetting, HorizontalAlign, VerticalAlign, WatermarkConfig,
    WatermarkConfigError, WatermarkListener,
};
