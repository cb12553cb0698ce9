//! Transform parameters: parse, validate, canonicalise (spec.md §3, §4.2, §6).
//!
//! Grounded on the original `transform/params.rs`, which parsed a query
//! string into a typed struct via `FromStr` with explicit string-equality
//! enum parsing (no ordinal casts). Generalised here to the full
//! comma-separated `key=value` transform mini-language, its aliases, and a
//! canonical cache-key serialisation.

use crate::error::{ParamError, ValidationError};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Auto,
    Jpeg,
    Png,
    Webp,
    Avif,
    Gif,
}

impl OutputFormat {
    fn parse(s: &str) -> Result<Self, ParamError> {
        match s {
            "auto" => Ok(OutputFormat::Auto),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::Webp),
            "avif" => Ok(OutputFormat::Avif),
            "gif" => Ok(OutputFormat::Gif),
            _ => Err(ParamError::InvalidFormat),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Auto => "auto",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
            OutputFormat::Avif => "avif",
            OutputFormat::Gif => "gif",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Auto => "application/octet-stream",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Avif => "image/avif",
            OutputFormat::Gif => "image/gif",
        }
    }

    pub fn supports_animation(self) -> bool {
        matches!(self, OutputFormat::Webp | OutputFormat::Gif)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMode {
    Contain,
    Cover,
    Fill,
    Inside,
    Outside,
    Pad,
}

impl FitMode {
    fn parse(s: &str) -> Result<Self, ParamError> {
        match s {
            "contain" => Ok(FitMode::Contain),
            "cover" => Ok(FitMode::Cover),
            "fill" => Ok(FitMode::Fill),
            "inside" => Ok(FitMode::Inside),
            "outside" => Ok(FitMode::Outside),
            "pad" => Ok(FitMode::Pad),
            _ => Err(ParamError::InvalidFit),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FitMode::Contain => "contain",
            FitMode::Cover => "cover",
            FitMode::Fill => "fill",
            FitMode::Inside => "inside",
            FitMode::Outside => "outside",
            FitMode::Pad => "pad",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gravity {
    Center,
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
    Smart,
    Attention,
}

impl Gravity {
    fn parse(s: &str) -> Result<Self, ParamError> {
        match s {
            "center" | "centre" => Ok(Gravity::Center),
            "n" => Ok(Gravity::North),
            "s" => Ok(Gravity::South),
            "e" => Ok(Gravity::East),
            "w" => Ok(Gravity::West),
            "ne" => Ok(Gravity::NorthEast),
            "nw" => Ok(Gravity::NorthWest),
            "se" => Ok(Gravity::SouthEast),
            "sw" => Ok(Gravity::SouthWest),
            "smart" => Ok(Gravity::Smart),
            "att" | "attention" => Ok(Gravity::Attention),
            _ => Err(ParamError::InvalidGravity),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gravity::Center => "center",
            Gravity::North => "n",
            Gravity::South => "s",
            Gravity::East => "e",
            Gravity::West => "w",
            Gravity::NorthEast => "ne",
            Gravity::NorthWest => "nw",
            Gravity::SouthEast => "se",
            Gravity::SouthWest => "sw",
            Gravity::Smart => "smart",
            Gravity::Attention => "att",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flip {
    Horizontal,
    Vertical,
    Both,
}

impl Flip {
    fn parse(s: &str) -> Result<Self, ParamError> {
        match s {
            "h" => Ok(Flip::Horizontal),
            "v" => Ok(Flip::Vertical),
            "hv" | "vh" => Ok(Flip::Both),
            _ => Err(ParamError::InvalidFlip),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Flip::Horizontal => "h",
            Flip::Vertical => "v",
            Flip::Both => "hv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataPolicy {
    Strip,
    Keep,
    Copyright,
}

impl MetadataPolicy {
    fn parse(s: &str) -> Result<Self, ParamError> {
        match s {
            "strip" | "none" => Ok(MetadataPolicy::Strip),
            "keep" | "all" => Ok(MetadataPolicy::Keep),
            "copyright" => Ok(MetadataPolicy::Copyright),
            _ => Err(ParamError::InvalidMetadata),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MetadataPolicy::Strip => "strip",
            MetadataPolicy::Keep => "keep",
            MetadataPolicy::Copyright => "copyright",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimMode {
    Auto,
    Static,
    Animate,
}

impl AnimMode {
    fn parse(s: &str) -> Result<Self, ParamError> {
        match s {
            "auto" | "true" => Ok(AnimMode::Auto),
            "static" | "false" => Ok(AnimMode::Static),
            "animate" => Ok(AnimMode::Animate),
            _ => Err(ParamError::InvalidAnim),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnimMode::Auto => "auto",
            AnimMode::Static => "static",
            AnimMode::Animate => "animate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    fn parse(s: &str) -> Result<Self, ParamError> {
        if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParamError::InvalidBackground);
        }
        let r = u8::from_str_radix(&s[0..2], 16).map_err(|_| ParamError::InvalidBackground)?;
        let g = u8::from_str_radix(&s[2..4], 16).map_err(|_| ParamError::InvalidBackground)?;
        let b = u8::from_str_radix(&s[4..6], 16).map_err(|_| ParamError::InvalidBackground)?;
        Ok(Rgb(r, g, b))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

/// Parsed (but not yet validated) transform descriptor. Optional fields carry
/// no value when the key was absent from the transform string; `validate()`
/// checks ranges on whatever was supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformParams {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: u8,
    pub format: OutputFormat,
    pub fit: FitMode,
    pub gravity: Gravity,
    pub sharpen: Option<f32>,
    pub blur: Option<f32>,
    pub dpr: f32,
    pub rotate: u16,
    pub flip: Option<Flip>,
    pub brightness: Option<f32>,
    pub contrast: Option<f32>,
    pub saturation: Option<f32>,
    pub gamma: Option<f32>,
    pub background: Option<Rgb>,
    pub metadata: MetadataPolicy,
    pub trim: Option<u8>,
    pub anim: AnimMode,
    pub frame: Option<u32>,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            quality: 80,
            format: OutputFormat::Auto,
            fit: FitMode::Contain,
            gravity: Gravity::Center,
            sharpen: None,
            blur: None,
            dpr: 1.0,
            rotate: 0,
            flip: None,
            brightness: None,
            contrast: None,
            saturation: None,
            gamma: None,
            background: None,
            metadata: MetadataPolicy::Strip,
            trim: None,
            anim: AnimMode::Auto,
            frame: None,
        }
    }
}

fn canon_key(key: &str) -> Option<&'static str> {
    match key {
        "w" | "width" => Some("w"),
        "h" | "height" => Some("h"),
        "q" | "quality" => Some("q"),
        "f" | "fmt" | "format" => Some("f"),
        "fit" => Some("fit"),
        "g" | "gravity" => Some("g"),
        "sharpen" => Some("sharpen"),
        "blur" => Some("blur"),
        "dpr" => Some("dpr"),
        "rotate" => Some("rotate"),
        "flip" => Some("flip"),
        "brightness" => Some("brightness"),
        "contrast" => Some("contrast"),
        "saturation" => Some("saturation"),
        "gamma" => Some("gamma"),
        "bg" | "background" => Some("bg"),
        "metadata" => Some("metadata"),
        "trim" => Some("trim"),
        "anim" => Some("anim"),
        "frame" => Some("frame"),
        _ => None,
    }
}

impl TransformParams {
    /// Parse a raw transform string of comma-separated `key=value` pairs.
    /// The success path never allocates on the heap: every field is parsed
    /// from string slices of the borrowed input. Error paths allocate to
    /// carry the offending key into the error value.
    pub fn parse(s: &str) -> Result<Self, ParamError> {
        let mut p = TransformParams::default();
        if s.is_empty() {
            return Ok(p);
        }
        for pair in s.split(',') {
            let mut it = pair.splitn(2, '=');
            let key = it.next().unwrap_or("");
            let value = it.next();
            let value = match value {
                Some(v) if !v.is_empty() => v,
                Some(_) => return Err(ParamError::EmptyValue(key.to_string())),
                None => return Err(ParamError::EmptyValue(key.to_string())),
            };
            let canon = canon_key(key).ok_or_else(|| ParamError::InvalidParameter(key.to_string()))?;
            match canon {
                "w" => p.width = Some(value.parse().map_err(|_| ParamError::InvalidWidth)?),
                "h" => p.height = Some(value.parse().map_err(|_| ParamError::InvalidHeight)?),
                "q" => p.quality = value.parse().map_err(|_| ParamError::InvalidQuality)?,
                "f" => p.format = OutputFormat::parse(value)?,
                "fit" => p.fit = FitMode::parse(value)?,
                "g" => p.gravity = Gravity::parse(value)?,
                "sharpen" => p.sharpen = Some(value.parse().map_err(|_| ParamError::InvalidSharpen)?),
                "blur" => p.blur = Some(value.parse().map_err(|_| ParamError::InvalidBlur)?),
                "dpr" => p.dpr = value.parse().map_err(|_| ParamError::InvalidDpr)?,
                "rotate" => p.rotate = value.parse().map_err(|_| ParamError::InvalidRotate)?,
                "flip" => p.flip = Some(Flip::parse(value)?),
                "brightness" => p.brightness = Some(value.parse().map_err(|_| ParamError::InvalidBrightness)?),
                "contrast" => p.contrast = Some(value.parse().map_err(|_| ParamError::InvalidContrast)?),
                "saturation" => p.saturation = Some(value.parse().map_err(|_| ParamError::InvalidSaturation)?),
                "gamma" => p.gamma = Some(value.parse().map_err(|_| ParamError::InvalidGamma)?),
                "bg" => p.background = Some(Rgb::parse(value)?),
                "metadata" => p.metadata = MetadataPolicy::parse(value)?,
                "trim" => p.trim = Some(value.parse().map_err(|_| ParamError::InvalidTrim)?),
                "anim" => p.anim = AnimMode::parse(value)?,
                "frame" => p.frame = Some(value.parse().map_err(|_| ParamError::InvalidFrame)?),
                _ => unreachable!("canon_key only returns known keys"),
            }
        }
        Ok(p)
    }

    /// Enforce the per-field ranges from spec.md §3. Parse success does not
    /// imply validation success: e.g. `w=9999` parses but fails here.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(w) = self.width {
            if !(1..=8192).contains(&w) {
                return Err(ValidationError::Width);
            }
        }
        if let Some(h) = self.height {
            if !(1..=8192).contains(&h) {
                return Err(ValidationError::Height);
            }
        }
        if !(1..=100).contains(&self.quality) {
            return Err(ValidationError::Quality);
        }
        if let Some(s) = self.sharpen {
            if !(0.0..=10.0).contains(&s) {
                return Err(ValidationError::Sharpen);
            }
        }
        if let Some(b) = self.blur {
            if !(0.1..=250.0).contains(&b) {
                return Err(ValidationError::Blur);
            }
        }
        if !(1.0..=5.0).contains(&self.dpr) {
            return Err(ValidationError::Dpr);
        }
        if !matches!(self.rotate, 0 | 90 | 180 | 270) {
            return Err(ValidationError::Rotate);
        }
        if let Some(b) = self.brightness {
            if !(0.0..=2.0).contains(&b) {
                return Err(ValidationError::Brightness);
            }
        }
        if let Some(c) = self.contrast {
            if !(0.0..=2.0).contains(&c) {
                return Err(ValidationError::Contrast);
            }
        }
        if let Some(s) = self.saturation {
            if !(0.0..=2.0).contains(&s) {
                return Err(ValidationError::Saturation);
            }
        }
        if let Some(g) = self.gamma {
            if !(0.1..=10.0).contains(&g) {
                return Err(ValidationError::Gamma);
            }
        }
        if let Some(t) = self.trim {
            if !(1..=100).contains(&t) {
                return Err(ValidationError::Trim);
            }
        }
        if let Some(fr) = self.frame {
            if fr > 999 {
                return Err(ValidationError::Frame);
            }
        }
        Ok(())
    }

    /// Effective width/height: declared size times DPR, clamped to 8192.
    pub fn effective_dimensions(&self, src_w: u32, src_h: u32) -> (Option<u32>, Option<u32>) {
        let scale = |v: u32| -> u32 {
            let scaled = (v as f32 * self.dpr).round();
            scaled.clamp(1.0, 8192.0) as u32
        };
        let w = self.width.map(scale);
        let h = self.height.map(scale);
        match (w, h) {
            (Some(w), None) => {
                let ratio = w as f32 / src_w.max(1) as f32;
                (Some(w), Some(((src_h as f32 * ratio).round() as u32).clamp(1, 8192)))
            }
            (None, Some(h)) => {
                let ratio = h as f32 / src_h.max(1) as f32;
                (Some(((src_w as f32 * ratio).round() as u32).clamp(1, 8192)), Some(h))
            }
            other => other,
        }
    }

    /// Canonical cache-key serialisation: fixed field order, defaults
    /// omitted, floats to 2 decimals (1 for DPR), RGB as 6 upper-case hex.
    /// Deterministic and insensitive to the order fields were parsed in.
    pub fn to_cache_key(&self, buf: &mut String) {
        let mut first = true;
        let mut push = |buf: &mut String, s: &str| {
            if !first {
                buf.push(',');
            }
            buf.push_str(s);
            first = false;
        };
        if let Some(w) = self.width {
            push(buf, &format!("w={}", w));
        }
        if let Some(h) = self.height {
            push(buf, &format!("h={}", h));
        }
        if self.quality != 80 {
            push(buf, &format!("q={}", self.quality));
        }
        if self.format != OutputFormat::Auto {
            push(buf, &format!("f={}", self.format.as_str()));
        }
        if self.fit != FitMode::Contain {
            push(buf, &format!("fit={}", self.fit.as_str()));
        }
        if self.gravity != Gravity::Center {
            push(buf, &format!("g={}", self.gravity.as_str()));
        }
        if let Some(s) = self.sharpen {
            push(buf, &format!("sharpen={:.2}", s));
        }
        if let Some(b) = self.blur {
            push(buf, &format!("blur={:.2}", b));
        }
        if self.dpr != 1.0 {
            push(buf, &format!("dpr={:.1}", self.dpr));
        }
        if self.rotate != 0 {
            push(buf, &format!("rotate={}", self.rotate));
        }
        if let Some(fl) = self.flip {
            push(buf, &format!("flip={}", fl.as_str()));
        }
        if let Some(b) = self.brightness {
            push(buf, &format!("brightness={:.2}", b));
        }
        if let Some(c) = self.contrast {
            push(buf, &format!("contrast={:.2}", c));
        }
        if let Some(s) = self.saturation {
            push(buf, &format!("saturation={:.2}", s));
        }
        if let Some(g) = self.gamma {
            push(buf, &format!("gamma={:.2}", g));
        }
        if let Some(bg) = self.background {
            push(buf, &format!("bg={}", bg));
        }
        if self.metadata != MetadataPolicy::Strip {
            push(buf, &format!("metadata={}", self.metadata.as_str()));
        }
        if let Some(t) = self.trim {
            push(buf, &format!("trim={}", t));
        }
        if self.anim != AnimMode::Auto {
            push(buf, &format!("anim={}", self.anim.as_str()));
        }
        if let Some(fr) = self.frame {
            push(buf, &format!("frame={}", fr));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        let p = TransformParams::parse("width=800,height=600,format=jpeg").unwrap();
        assert_eq!(p.width, Some(800));
        assert_eq!(p.height, Some(600));
        assert_eq!(p.format, OutputFormat::Jpeg);
    }

    #[test]
    fn rejects_unknown_key() {
        assert_eq!(
            TransformParams::parse("banana=42"),
            Err(ParamError::InvalidParameter("banana".into()))
        );
    }

    #[test]
    fn rejects_empty_value() {
        assert_eq!(
            TransformParams::parse("w="),
            Err(ParamError::EmptyValue("w".into()))
        );
    }

    #[test]
    fn validate_rejects_out_of_range_width() {
        let p = TransformParams::parse("w=9999").unwrap();
        assert_eq!(p.validate(), Err(ValidationError::Width));
    }

    #[test]
    fn cache_key_omits_defaults_and_is_order_insensitive() {
        let a = TransformParams::parse("w=100,h=200").unwrap();
        let b = TransformParams::parse("h=200,w=100").unwrap();
        let mut ka = String::new();
        let mut kb = String::new();
        a.to_cache_key(&mut ka);
        b.to_cache_key(&mut kb);
        assert_eq!(ka, kb);
        assert_eq!(ka, "w=100,h=200");
    }

    #[test]
    fn cache_key_differs_when_nondefault_field_differs() {
        let a = TransformParams::parse("w=100").unwrap();
        let b = TransformParams::parse("w=100,q=90").unwrap();
        let mut ka = String::new();
        let mut kb = String::new();
        a.to_cache_key(&mut ka);
        b.to_cache_key(&mut kb);
        assert_ne!(ka, kb);
    }

    #[test]
    fn rgb_formats_as_six_upper_hex() {
        let rgb = Rgb(255, 0, 16);
        assert_eq!(rgb.to_string(), "FF0010");
    }
}
