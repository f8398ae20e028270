use std::collections::BTreeMap;

/// Immutable view of the transformation query parameters for one request.
///
/// Processors and listeners only ever read from this; the typed accessors
/// return `None` for absent or malformed values so a missing directive is
/// indistinguishable from one that was never requested.
#[derive(Debug, Clone, Default)]
pub struct RequestParameters {
    values: BTreeMap<String, String>,
}

impl RequestParameters {
    pub fn new(values: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// First present key wins, even if its value later fails validation.
    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }

    /// Validate a prioritized list of keys against the hex color grammar.
    pub fn hex_color(&self, keys: &[&str]) -> Option<HexColor> {
        HexColor::parse(self.first_of(keys)?)
    }

    /// Lenient integer coercion: a value that does not parse is treated as
    /// not requested, so the processor falls back to its default.
    pub fn integer(&self, keys: &[&str]) -> Option<i64> {
        self.first_of(keys)?.trim().parse().ok()
    }

    /// Parse a `WxH` dimension pair such as `300x200`. Zero dimensions are
    /// rejected along with anything else that does not match the grammar.
    pub fn dimensions(&self, keys: &[&str]) -> Option<(u32, u32)> {
        let raw = self.first_of(keys)?;
        let (w, h) = raw.split_once(['x', 'X'])?;
        let width: u32 = w.trim().parse().ok()?;
        let height: u32 = h.trim().parse().ok()?;
        if width == 0 || height == 0 {
            return None;
        }
        Some((width, height))
    }

    /// Truthy in the loose query-string sense: present and not "" or "0".
    pub fn flag(&self, keys: &[&str]) -> bool {
        matches!(self.first_of(keys), Some(value) if !value.is_empty() && value != "0")
    }

    /// Stable representation of the parameter set, used for cache keys.
    /// BTreeMap ordering makes this independent of query string order.
    pub fn canonical_string(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.values {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('&');
        }
        out
    }
}

/// A validated six-digit hex color directive.
///
/// Only constructed when validation succeeds; the canonical form is
/// lowercase without a leading `#`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexColor {
    rgb: [u8; 3],
}

impl HexColor {
    /// Accepts exactly six hexadecimal digits, case-insensitive. Anything
    /// else (wrong length, non-hex characters, empty) is absent.
    pub fn parse(value: &str) -> Option<Self> {
        if value.len() != 6 || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let mut rgb = [0u8; 3];
        for (i, channel) in rgb.iter_mut().enumerate() {
            *channel = u8::from_str_radix(&value[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self { rgb })
    }

    pub fn rgb(&self) -> [u8; 3] {
        self.rgb
    }

    pub fn canonical(&self) -> String {
        format!(
            "{:02x}{:02x}{:02x}",
            self.rgb[0], self.rgb[1], self.rgb[2]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> RequestParameters {
        RequestParameters::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
    }

    #[test]
    fn hex_color_accepts_lowercase_and_uppercase() {
        let lower = HexColor::parse("1a2b3c").unwrap();
        let upper = HexColor::parse("1A2B3C").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.rgb(), [0x1a, 0x2b, 0x3c]);
        assert_eq!(upper.canonical(), "1a2b3c");
    }

    #[test]
    fn hex_color_rejects_malformed_input() {
        for bad in ["", "fff", "1a2b3c4", "gggggg", "#1a2b3c", "1a2b3 "] {
            assert!(HexColor::parse(bad).is_none(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn first_present_key_wins() {
        let p = params(&[("background", "zzzzzz"), ("limit_color", "1a2b3c")]);
        // background is present but invalid, so the directive is absent
        // rather than falling through to limit_color.
        assert_eq!(p.first_of(&["background", "limit_color"]), Some("zzzzzz"));
        assert!(p.hex_color(&["background", "limit_color"]).is_none());

        let p = params(&[("limit_color", "1a2b3c")]);
        let color = p.hex_color(&["background", "limit_color"]).unwrap();
        assert_eq!(color.canonical(), "1a2b3c");
    }

    #[test]
    fn integer_coercion_falls_back_on_garbage() {
        let p = params(&[("rotate", "90"), ("blur", "lots")]);
        assert_eq!(p.integer(&["rotate"]), Some(90));
        assert_eq!(p.integer(&["blur"]), None);
        assert_eq!(p.integer(&["contrast"]), None);
    }

    #[test]
    fn dimensions_grammar() {
        let p = params(&[
            ("fit", "300x200"),
            ("crop", "0x100"),
            ("tile", "300-200"),
        ]);
        assert_eq!(p.dimensions(&["fit"]), Some((300, 200)));
        assert_eq!(p.dimensions(&["crop"]), None);
        assert_eq!(p.dimensions(&["tile"]), None);
    }

    #[test]
    fn canonical_string_is_order_independent() {
        let a = params(&[("width", "100"), ("blur", "3")]);
        let b = params(&[("blur", "3"), ("width", "100")]);
        assert_eq!(a.canonical_string(), b.canonical_string());
    }
}
