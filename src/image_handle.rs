//! The image handle and its primitive operations (spec.md §4.3).
//!
//! The external image-processing library in the original design (libvips,
//! consumed via its thumbnail/crop/arrayjoin primitives) is out of scope
//! per spec.md §1; here the `image` crate plays that role. Its
//! `DynamicImage` is already a single owning, move-only value whose buffer
//! is freed on drop, which is exactly the "ownership-typed wrapper that
//! releases on drop" spec.md §9 prefers — no separate ref-counting layer is
//! needed on top of it.
//!
//! Animated images are represented the same way the spec's Animated image
//! glossary entry describes: every frame is vertically stacked into a
//! single tall `DynamicImage`, with `n_pages`/`page_height` carried
//! alongside as handle metadata (the `image` crate has no slot for this, so
//! the handle wrapper is what carries the invariant).

use crate::error::PipelineError;
use crate::params::{Flip as FlipDir, Rgb};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, GenericImageView, RgbaImage};
use std::io::Cursor;

/// Crop gravity as understood by the resize primitives (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropMode {
    Centre,
    Entropy,
    Attention,
}

/// Resize sizing mode (spec.md §4.4 mapping table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeMode {
    Down,
    Up,
    Force,
    Both,
}

/// An owning handle to a decoded image plus stacked-frame metadata.
/// `n_pages` is `None` for a static image; when present it must always
/// satisfy `height = n_pages * page_height` (spec.md §3 invariant).
pub struct ImageHandle {
    img: DynamicImage,
    n_pages: Option<u32>,
    page_height: Option<u32>,
}

impl ImageHandle {
    fn from_static(img: DynamicImage) -> Self {
        Self { img, n_pages: None, page_height: None }
    }

    /// Wrap an already-decoded `DynamicImage` as a fresh static handle
    /// (used by the pipeline when it needs to treat one already-resized
    /// frame in isolation, e.g. during animated-cover per-frame cropping).
    pub(crate) fn from_dynamic(img: DynamicImage) -> Self {
        Self::from_static(img)
    }

    fn from_stack(img: DynamicImage, n_pages: u32, page_height: u32) -> Self {
        Self { img, n_pages: Some(n_pages), page_height: Some(page_height) }
    }

    pub fn width(&self) -> u32 {
        self.img.width()
    }

    pub fn height(&self) -> u32 {
        self.img.height()
    }

    pub fn has_alpha(&self) -> bool {
        self.img.color().has_alpha()
    }

    pub fn get_n_pages(&self) -> Option<u32> {
        self.n_pages
    }

    pub fn get_page_height(&self) -> Option<u32> {
        self.page_height
    }

    pub fn set_page_height(&mut self, v: u32) {
        self.page_height = Some(v);
    }

    pub fn set_n_pages(&mut self, v: u32) {
        self.n_pages = Some(v);
    }

    pub fn inner(&self) -> &DynamicImage {
        &self.img
    }

    pub fn into_inner(self) -> DynamicImage {
        self.img
    }

    /// Decode only the first frame. For a static format this is simply the
    /// whole image; for GIF it is frame 0, with `n-pages` still populated
    /// from the container so Stage 1 (Probe) can read animation metadata
    /// without a full decode.
    pub fn decode(bytes: &[u8]) -> Result<Self, PipelineError> {
        if is_gif(bytes) {
            let frames = gif_frame_count(bytes)?;
            let decoder = GifDecoder::new(Cursor::new(bytes))
                .map_err(|e| PipelineError::OperationFailed(e.to_string()))?;
            let mut it = decoder.into_frames();
            let first = it
                .next()
                .ok_or_else(|| PipelineError::OperationFailed("empty gif".into()))?
                .map_err(|e| PipelineError::OperationFailed(e.to_string()))?;
            let buf = first.into_buffer();
            let h = buf.height();
            let img = DynamicImage::ImageRgba8(buf);
            if frames > 1 {
                return Ok(Self::from_stack(img, frames, h));
            }
            return Ok(Self::from_static(img));
        }
        let img = image::load_from_memory(bytes).map_err(|e| PipelineError::OperationFailed(e.to_string()))?;
        Ok(Self::from_static(img))
    }

    /// Decode all frames, vertically stacked into one handle.
    pub fn decode_all(bytes: &[u8]) -> Result<Self, PipelineError> {
        Self::decode_n(bytes, u32::MAX)
    }

    /// Decode the first `n` frames, vertically stacked.
    pub fn decode_n(bytes: &[u8], n: u32) -> Result<Self, PipelineError> {
        if !is_gif(bytes) {
            return Self::decode(bytes);
        }
        let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(|e| PipelineError::OperationFailed(e.to_string()))?;
        let mut frames = Vec::new();
        for (i, frame) in decoder.into_frames().enumerate() {
            if i as u32 >= n {
                break;
            }
            let frame = frame.map_err(|e| PipelineError::OperationFailed(e.to_string()))?;
            frames.push(frame.into_buffer());
        }
        if frames.is_empty() {
            return Err(PipelineError::OperationFailed("empty gif".into()));
        }
        let page_height = frames[0].height();
        let width = frames[0].width();
        let count = frames.len() as u32;
        let stacked = stack_vertical(&frames, width, page_height);
        let img = DynamicImage::ImageRgba8(stacked);
        if count > 1 {
            Ok(Self::from_stack(img, count, page_height))
        } else {
            Ok(Self::from_static(img))
        }
    }

    pub fn thumbnail(
        self,
        width: u32,
        height: Option<u32>,
        size_mode: SizeMode,
        crop_mode: Option<CropMode>,
    ) -> Self {
        let (src_w, src_h) = (self.img.width(), self.img.height());
        let target_h = height.unwrap_or_else(|| {
            let ratio = width as f32 / src_w.max(1) as f32;
            ((src_h as f32 * ratio).round() as u32).max(1)
        });
        let resized = match size_mode {
            SizeMode::Force => self.img.resize_exact(width, target_h, image::imageops::FilterType::Lanczos3),
            SizeMode::Down => {
                if width >= src_w && target_h >= src_h {
                    self.img
                } else {
                    self.img.resize(width, target_h, image::imageops::FilterType::Lanczos3)
                }
            }
            SizeMode::Up => {
                if width <= src_w && target_h <= src_h {
                    self.img
                } else {
                    self.img.resize(width, target_h, image::imageops::FilterType::Lanczos3)
                }
            }
            // "cover": scale up to fill the target box (never leaving a
            // letterbox), then crop down to the exact dimensions.
            SizeMode::Both => {
                let scale = (width as f32 / src_w.max(1) as f32).max(target_h as f32 / src_h.max(1) as f32);
                let cover_w = ((src_w as f32 * scale).ceil() as u32).max(width);
                let cover_h = ((src_h as f32 * scale).ceil() as u32).max(target_h);
                let covered = self.img.resize_exact(cover_w, cover_h, image::imageops::FilterType::Lanczos3);
                let (left, top) = crop_window(&covered, width, target_h, crop_mode.unwrap_or(CropMode::Centre));
                covered.crop_imm(left, top, width, target_h)
            }
        };
        Self { img: resized, n_pages: self.n_pages, page_height: self.page_height }
    }

    pub fn crop(mut self, left: u32, top: u32, w: u32, h: u32) -> Self {
        self.img = self.img.crop_imm(left, top, w, h);
        self
    }

    pub fn rotate(mut self, degrees: u16) -> Self {
        self.img = match degrees % 360 {
            90 => self.img.rotate90(),
            180 => self.img.rotate180(),
            270 => self.img.rotate270(),
            _ => self.img,
        };
        self
    }

    pub fn flip(mut self, dir: FlipDir) -> Self {
        self.img = match dir {
            FlipDir::Horizontal => self.img.fliph(),
            FlipDir::Vertical => self.img.flipv(),
            FlipDir::Both => self.img.fliph().flipv(),
        };
        self
    }

    pub fn sharpen(mut self, sigma: f32) -> Self {
        if sigma > 0.0 {
            self.img = self.img.unsharpen(sigma, 1);
        }
        self
    }

    pub fn blur(mut self, sigma: f32) -> Self {
        if sigma > 0.0 {
            self.img = self.img.blur(sigma);
        }
        self
    }

    /// Linear pixel transform `out = a*in + b`, used for contrast/brightness.
    pub fn linear(mut self, a: f32, b: f32) -> Self {
        let mut buf = self.img.to_rgba8();
        for px in buf.pixels_mut() {
            for c in 0..3 {
                let v = px.0[c] as f32 * a + b;
                px.0[c] = v.clamp(0.0, 255.0) as u8;
            }
        }
        self.img = DynamicImage::ImageRgba8(buf);
        self
    }

    pub fn gamma(mut self, g: f32) -> Self {
        let inv = 1.0 / g;
        let mut buf = self.img.to_rgba8();
        for px in buf.pixels_mut() {
            for c in 0..3 {
                let v = (px.0[c] as f32 / 255.0).powf(inv) * 255.0;
                px.0[c] = v.clamp(0.0, 255.0) as u8;
            }
        }
        self.img = DynamicImage::ImageRgba8(buf);
        self
    }

    /// Saturation adjustment via an L*C*h round trip (spec.md Stage 9):
    /// convert to Lab, scale the chroma component, convert back to sRGB.
    pub fn saturate(mut self, factor: f32) -> Self {
        let mut buf = self.img.to_rgba8();
        for px in buf.pixels_mut() {
            let (r, g, b) = (px.0[0], px.0[1], px.0[2]);
            let (l, a, bb) = srgb_to_lab(r, g, b);
            let (new_a, new_bb) = (a * factor, bb * factor);
            let (nr, ng, nb) = lab_to_srgb(l, new_a, new_bb);
            px.0[0] = nr;
            px.0[1] = ng;
            px.0[2] = nb;
        }
        self.img = DynamicImage::ImageRgba8(buf);
        self
    }

    pub fn flatten(mut self, rgb: Rgb) -> Self {
        if !self.has_alpha() {
            return self;
        }
        let (w, h) = (self.img.width(), self.img.height());
        let mut out = RgbaImage::new(w, h);
        let src = self.img.to_rgba8();
        for (dst, srcpx) in out.pixels_mut().zip(src.pixels()) {
            let a = srcpx.0[3] as f32 / 255.0;
            let r = srcpx.0[0] as f32 * a + rgb.0 as f32 * (1.0 - a);
            let g = srcpx.0[1] as f32 * a + rgb.1 as f32 * (1.0 - a);
            let b = srcpx.0[2] as f32 * a + rgb.2 as f32 * (1.0 - a);
            *dst = image::Rgba([r as u8, g as u8, b as u8, 255]);
        }
        self.img = DynamicImage::ImageRgba8(out);
        self
    }

    /// Embed the current image onto a canvas of size `(canvas_w, canvas_h)`
    /// at `(x, y)`, padded with `rgb`.
    pub fn embed(self, x: i64, y: i64, canvas_w: u32, canvas_h: u32, rgb: Rgb) -> Self {
        let mut canvas = RgbaImage::from_pixel(canvas_w, canvas_h, image::Rgba([rgb.0, rgb.1, rgb.2, 255]));
        let src = self.img.to_rgba8();
        image::imageops::overlay(&mut canvas, &src, x, y);
        Self { img: DynamicImage::ImageRgba8(canvas), n_pages: self.n_pages, page_height: self.page_height }
    }

    /// Find the bounding box to trim uniform-colour borders, using
    /// `threshold` (1..100) as the per-channel tolerance. Returns
    /// `(left, top, width, height)`; a zero-sized box means "no trim".
    pub fn find_trim(&self, threshold: u8) -> (u32, u32, u32, u32) {
        let buf = self.img.to_rgba8();
        let (w, h) = (buf.width(), buf.height());
        if w == 0 || h == 0 {
            return (0, 0, 0, 0);
        }
        let bg = buf.get_pixel(0, 0).0;
        let tol = threshold as i32;
        let close = |p: &image::Rgba<u8>| -> bool {
            (0..3).all(|c| (p.0[c] as i32 - bg[c] as i32).abs() <= tol)
        };

        let mut min_x = w;
        let mut min_y = h;
        let mut max_x = 0u32;
        let mut max_y = 0u32;
        let mut any = false;
        for y in 0..h {
            for x in 0..w {
                if !close(buf.get_pixel(x, y)) {
                    any = true;
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);
                }
            }
        }
        if !any {
            return (0, 0, 0, 0);
        }
        (min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, PipelineError> {
        use image::codecs::jpeg::JpegEncoder;
        use image::{ExtendedColorType, ImageEncoder};
        let mut out = Vec::new();
        let rgb = self.img.to_rgb8();
        let (w, h) = rgb.dimensions();
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
            .write_image(rgb.as_raw(), w, h, ExtendedColorType::Rgb8)
            .map_err(|e| PipelineError::OperationFailed(e.to_string()))?;
        Ok(out)
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, PipelineError> {
        let mut out = Vec::new();
        self.img
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .map_err(|e| PipelineError::OperationFailed(e.to_string()))?;
        Ok(out)
    }

    pub fn encode_webp(&self, quality: u8) -> Result<Vec<u8>, PipelineError> {
        let rgba = self.img.to_rgba8();
        let (w, h) = rgba.dimensions();
        let encoder = webp::Encoder::from_rgba(rgba.as_raw(), w, h);
        let encoded = encoder.encode(quality.clamp(1, 100) as f32);
        Ok(encoded.to_vec())
    }

    pub fn encode_avif(&self, quality: u8) -> Result<Vec<u8>, PipelineError> {
        use image::codecs::avif::AvifEncoder;
        use image::{ExtendedColorType, ImageEncoder};
        let mut out = Vec::new();
        let rgba = self.img.to_rgba8();
        let (w, h) = rgba.dimensions();
        AvifEncoder::new_with_speed_quality(&mut out, 4, quality.clamp(1, 100))
            .write_image(rgba.as_raw(), w, h, ExtendedColorType::Rgba8)
            .map_err(|e| PipelineError::OperationFailed(e.to_string()))?;
        Ok(out)
    }

    /// Encode as GIF. Re-validates the `page-height` invariant first
    /// (spec.md Stage 11): if it doesn't evenly divide the image height,
    /// the animation is invalidated and a single static frame is produced.
    pub fn encode_gif(&mut self) -> Result<Vec<u8>, PipelineError> {
        use image::codecs::gif::GifEncoder;
        use image::Delay;

        let height = self.img.height();
        let valid = match self.page_height {
            Some(ph) if ph > 0 && ph <= height && height % ph == 0 => true,
            _ => false,
        };
        if !valid {
            self.page_height = Some(height);
            self.n_pages = Some(1);
        }

        let page_h = self.page_height.unwrap_or(height);
        let n_pages = self.n_pages.unwrap_or(1);
        let width = self.img.width();
        let full = self.img.to_rgba8();

        let mut out = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut out);
            for i in 0..n_pages {
                let sub = image::imageops::crop_imm(&full, 0, i * page_h, width, page_h).to_image();
                let frame = image::Frame::from_parts(sub, 0, 0, Delay::from_numer_denom_ms(100, 1));
                encoder
                    .encode_frame(frame)
                    .map_err(|e| PipelineError::OperationFailed(e.to_string()))?;
            }
        }
        Ok(out)
    }
}

fn stack_vertical(frames: &[RgbaImage], width: u32, page_height: u32) -> RgbaImage {
    let mut out = RgbaImage::new(width, page_height * frames.len() as u32);
    for (i, frame) in frames.iter().enumerate() {
        image::imageops::overlay(&mut out, frame, 0, (i as u32 * page_height) as i64);
    }
    out
}

/// Choose the top-left corner of a `target_w`x`target_h` crop window inside
/// an already-cover-scaled image (spec.md §4.4 "cover" fit). `Centre` takes
/// the middle of the overflow on each axis. `Entropy`/`Attention` both
/// approximate libvips' content-aware crop with the same lightweight
/// variance-maximising search — this core has no saliency model, so the two
/// gravities are treated identically (see DESIGN.md).
fn crop_window(img: &DynamicImage, target_w: u32, target_h: u32, mode: CropMode) -> (u32, u32) {
    let (w, h) = (img.width(), img.height());
    let slack_x = w.saturating_sub(target_w);
    let slack_y = h.saturating_sub(target_h);
    if mode == CropMode::Centre || (slack_x == 0 && slack_y == 0) {
        return (slack_x / 2, slack_y / 2);
    }

    // Coarse luma buffer for a cheap variance score; downsampled so the
    // search stays O(1) regardless of the source resolution.
    let probe = img.thumbnail(128, 128).to_luma8();
    let pw = probe.width() as f32 / w.max(1) as f32;
    let ph = probe.height() as f32 / h.max(1) as f32;
    let probe_tw = ((target_w as f32 * pw).round() as u32).max(1).min(probe.width());
    let probe_th = ((target_h as f32 * ph).round() as u32).max(1).min(probe.height());
    let probe_slack_x = probe.width().saturating_sub(probe_tw);
    let probe_slack_y = probe.height().saturating_sub(probe_th);

    let candidates = [0.0_f32, 0.25, 0.5, 0.75, 1.0];
    let mut best = (slack_x / 2, slack_y / 2);
    let mut best_score = -1.0_f32;
    for &fx in &candidates {
        for &fy in &candidates {
            if slack_x == 0 && fx != 0.0 {
                continue;
            }
            if slack_y == 0 && fy != 0.0 {
                continue;
            }
            let px = (probe_slack_x as f32 * fx).round() as u32;
            let py = (probe_slack_y as f32 * fy).round() as u32;
            let window = image::imageops::crop_imm(&probe, px, py, probe_tw, probe_th).to_image();
            let score = luma_variance(&window);
            if score > best_score {
                best_score = score;
                best = (
                    ((slack_x as f32) * fx).round() as u32,
                    ((slack_y as f32) * fy).round() as u32,
                );
            }
        }
    }
    best
}

fn luma_variance(buf: &image::GrayImage) -> f32 {
    let n = buf.len() as f32;
    if n == 0.0 {
        return 0.0;
    }
    let mean = buf.iter().map(|&p| p as f32).sum::<f32>() / n;
    buf.iter().map(|&p| (p as f32 - mean).powi(2)).sum::<f32>() / n
}

/// Reassemble a set of equally-sized frames into one vertically stacked
/// handle, setting `page-height` explicitly (spec.md Stage 8, the
/// animated-cover exception).
pub fn arrayjoin_vertical(frames: Vec<ImageHandle>) -> Result<ImageHandle, PipelineError> {
    if frames.is_empty() {
        return Err(PipelineError::OperationFailed("arrayjoin_vertical: no frames".into()));
    }
    let width = frames[0].width();
    let page_height = frames[0].height();
    let bufs: Vec<RgbaImage> = frames.into_iter().map(|f| f.img.to_rgba8()).collect();
    let stacked = stack_vertical(&bufs, width, page_height);
    let n = bufs.len() as u32;
    Ok(ImageHandle::from_stack(DynamicImage::ImageRgba8(stacked), n, page_height))
}

fn is_gif(bytes: &[u8]) -> bool {
    bytes.len() >= 6 && &bytes[0..3] == b"GIF"
}

fn gif_frame_count(bytes: &[u8]) -> Result<u32, PipelineError> {
    let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(|e| PipelineError::OperationFailed(e.to_string()))?;
    let count = decoder
        .into_frames()
        .count();
    Ok(count as u32)
}

fn srgb_to_linear(c: u8) -> f32 {
    let c = c as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> u8 {
    let c = c.clamp(0.0, 1.0);
    let v = if c <= 0.0031308 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// sRGB -> CIE L*a*b* (D65 reference white).
fn srgb_to_lab(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let (rl, gl, bl) = (srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b));
    let x = rl * 0.4124564 + gl * 0.3575761 + bl * 0.1804375;
    let y = rl * 0.2126729 + gl * 0.7151522 + bl * 0.0721750;
    let z = rl * 0.0193339 + gl * 0.1191920 + bl * 0.9503041;

    let (xn, yn, zn) = (0.95047_f32, 1.0_f32, 1.08883_f32);
    let f = |t: f32| -> f32 {
        if t > 0.008856 {
            t.powf(1.0 / 3.0)
        } else {
            7.787 * t + 16.0 / 116.0
        }
    };
    let (fx, fy, fz) = (f(x / xn), f(y / yn), f(z / zn));
    let l = 116.0 * fy - 16.0;
    let a = 500.0 * (fx - fy);
    let bb = 200.0 * (fy - fz);
    (l, a, bb)
}

/// CIE L*a*b* -> sRGB.
fn lab_to_srgb(l: f32, a: f32, b: f32) -> (u8, u8, u8) {
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;

    let finv = |t: f32| -> f32 {
        let t3 = t * t * t;
        if t3 > 0.008856 {
            t3
        } else {
            (t - 16.0 / 116.0) / 7.787
        }
    };
    let (xn, yn, zn) = (0.95047_f32, 1.0_f32, 1.08883_f32);
    let (x, y, z) = (finv(fx) * xn, finv(fy) * yn, finv(fz) * zn);

    let rl = x * 3.2404542 + y * -1.5371385 + z * -0.4985314;
    let gl = x * -0.9692660 + y * 1.8760108 + z * 0.0415560;
    let bl = x * 0.0556434 + y * -0.2040259 + z * 1.0572252;

    (linear_to_srgb(rl), linear_to_srgb(gl), linear_to_srgb(bl))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_gif(frame_count: u32, w: u32, h: u32) -> Vec<u8> {
        use image::codecs::gif::GifEncoder;
        use image::{Delay, Frame, Rgba, RgbaImage};
        let mut out = Vec::new();
        {
            let mut enc = GifEncoder::new(&mut out);
            for i in 0..frame_count {
                let shade = (255 / frame_count.max(1) * i) as u8;
                let buf = RgbaImage::from_pixel(w, h, Rgba([shade, shade, shade, 255]));
                let frame = Frame::from_parts(buf, 0, 0, Delay::from_numer_denom_ms(100, 1));
                enc.encode_frame(frame).unwrap();
            }
        }
        out
    }

    #[test]
    fn decode_reads_n_pages_from_first_frame_probe() {
        let gif = make_gif(3, 8, 8);
        let h = ImageHandle::decode(&gif).unwrap();
        assert_eq!(h.get_n_pages(), Some(3));
        assert_eq!(h.height(), 8);
    }

    #[test]
    fn decode_all_stacks_frames_and_sets_page_height() {
        let gif = make_gif(4, 8, 6);
        let h = ImageHandle::decode_all(&gif).unwrap();
        assert_eq!(h.get_n_pages(), Some(4));
        assert_eq!(h.get_page_height(), Some(6));
        assert_eq!(h.height(), 24);
        assert_eq!(h.height() % h.get_page_height().unwrap(), 0);
    }

    #[test]
    fn decode_n_clamps_frame_count() {
        let gif = make_gif(5, 4, 4);
        let h = ImageHandle::decode_n(&gif, 2).unwrap();
        assert_eq!(h.get_n_pages(), Some(2));
        assert_eq!(h.height(), 8);
    }

    #[test]
    fn find_trim_detects_uniform_border() {
        let mut buf = RgbaImage::from_pixel(10, 10, image::Rgba([255, 255, 255, 255]));
        for y in 3..7 {
            for x in 3..7 {
                buf.put_pixel(x, y, image::Rgba([0, 0, 0, 255]));
            }
        }
        let h = ImageHandle::from_static(DynamicImage::ImageRgba8(buf));
        let (l, t, w, ht) = h.find_trim(10);
        assert_eq!((l, t, w, ht), (3, 3, 4, 4));
    }

    #[test]
    fn lab_round_trip_preserves_colour_closely() {
        let (l, a, b) = srgb_to_lab(128, 64, 200);
        let (r, g, bb) = lab_to_srgb(l, a, b);
        assert!((r as i32 - 128).abs() <= 2);
        assert!((g as i32 - 64).abs() <= 2);
        assert!((bb as i32 - 200).abs() <= 2);
    }

    #[test]
    fn gif_encode_resets_invalid_page_height() {
        let gif = make_gif(3, 4, 4);
        let mut h = ImageHandle::decode_all(&gif).unwrap();
        h.set_page_height(999); // invalid: doesn't divide height
        let encoded = h.encode_gif().unwrap();
        assert!(!encoded.is_empty());
        assert_eq!(h.get_n_pages(), Some(1));
    }

    #[test]
    fn cover_thumbnail_fills_exact_target_with_no_letterbox() {
        let buf = RgbaImage::from_pixel(400, 100, image::Rgba([10, 20, 30, 255]));
        let h = ImageHandle::from_static(DynamicImage::ImageRgba8(buf));
        let out = h.thumbnail(100, Some(100), SizeMode::Both, Some(CropMode::Centre));
        assert_eq!((out.width(), out.height()), (100, 100));
    }

    #[test]
    fn centre_crop_window_centres_the_overflow() {
        let buf = RgbaImage::from_pixel(200, 100, image::Rgba([0, 0, 0, 255]));
        let img = DynamicImage::ImageRgba8(buf);
        let (left, top) = crop_window(&img, 100, 100, CropMode::Centre);
        assert_eq!((left, top), (50, 0));
    }
}
