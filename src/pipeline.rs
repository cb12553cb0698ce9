//! The transform pipeline (spec.md §4.4): a fixed-ordered stage machine
//! from probe through encode, handling both still and animated images.
//! Grounded in the shape of the original `transform.rs` (`decode_image` /
//! `resize_image` / `encode_image` as three separate, composable steps)
//! generalised into the full eleven-stage machine the spec describes.

use crate::error::PipelineError;
use crate::image_handle::{arrayjoin_vertical, CropMode, ImageHandle, SizeMode};
use crate::negotiate::{negotiate_animated_format, negotiate_format};
use crate::params::{FitMode, Gravity, OutputFormat, TransformParams};

/// Per-request animation budget, derived from server config (spec.md §4.4
/// Stage 2, §6 `ZIMGX_TRANSFORM_{MAX_FRAMES,MAX_ANIMATED_PIXELS}`).
#[derive(Debug, Clone, Copy)]
pub struct AnimConfig {
    pub max_frames: u32,
    pub max_animated_pixels: u64,
}

impl Default for AnimConfig {
    fn default() -> Self {
        Self { max_frames: 64, max_animated_pixels: 50_000_000 }
    }
}

/// Output of a full pipeline run: encoded bytes plus the format actually
/// used to produce them (after negotiation/degradation).
pub struct PipelineOutput {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
}

fn gravity_to_crop_mode(g: Gravity) -> CropMode {
    match g {
        Gravity::Smart => CropMode::Entropy,
        Gravity::Attention => CropMode::Attention,
        // Compass-point gravities fall back to centre: the thumbnail
        // primitive has no directional crop mode (spec.md §9 Open Question b).
        _ => CropMode::Centre,
    }
}

fn fit_to_size_mode(fit: FitMode) -> SizeMode {
    match fit {
        FitMode::Contain | FitMode::Pad | FitMode::Inside => SizeMode::Down,
        FitMode::Fill => SizeMode::Force,
        FitMode::Outside => SizeMode::Up,
        FitMode::Cover => SizeMode::Both,
    }
}

/// Run the full pipeline against raw source bytes.
///
/// `accept` is the client's `Accept` header (already negotiated is not
/// allowed here: negotiation happens inside, per stage 3, because the
/// animated-vs-still decision depends on probing the source first).
pub fn run(
    bytes: &[u8],
    params: &TransformParams,
    accept: Option<&str>,
    anim_cfg: AnimConfig,
) -> Result<PipelineOutput, PipelineError> {
    // Stage 1: Probe.
    let probe = ImageHandle::decode(bytes)?;
    let n_pages = probe.get_n_pages().unwrap_or(1);
    let page_height = probe.get_page_height().unwrap_or(probe.height());
    let frame_w = probe.width();
    let is_animated = n_pages > 1;

    // Stage 2: Budget.
    let total_pixels = frame_w as u64 * page_height as u64 * n_pages as u64;
    let over_budget = is_animated && total_pixels > anim_cfg.max_animated_pixels;
    let effective_pages = if is_animated && !over_budget {
        n_pages.min(anim_cfg.max_frames)
    } else {
        n_pages
    };

    // Stage 3: Decide.
    let source_has_alpha = probe.has_alpha();
    let still_format = negotiate_format(accept, source_has_alpha, params.format);
    let wants_animated_output = is_animated
        && !over_budget
        && params.anim != crate::params::AnimMode::Static
        && params.frame.is_none();
    let animated_format = if wants_animated_output {
        negotiate_animated_format(accept, params.format)
    } else {
        None
    };
    let mut animated_output = animated_format.is_some();

    // Stage 4: Reload.
    let mut current = if animated_output {
        drop(probe);
        if effective_pages < n_pages {
            ImageHandle::decode_n(bytes, effective_pages)?
        } else {
            ImageHandle::decode_all(bytes)?
        }
    } else {
        probe
    };

    // Stage 5: Extract frame.
    if let Some(frame) = params.frame {
        if is_animated {
            let probe_page_height = current.get_page_height().unwrap_or(current.height());
            if current.height() <= probe_page_height {
                // The probe buffer holds only the first frame (its reported
                // n-pages comes from the container, not the loaded buffer) —
                // load every frame so the requested index is available.
                current = ImageHandle::decode_all(bytes)?;
            }
            let ph = current.get_page_height().unwrap_or(current.height());
            let total_frames = current.get_n_pages().unwrap_or(1);
            let clamped = frame.min(total_frames.saturating_sub(1));
            let w = current.width();
            current = current.crop(0, clamped * ph, w, ph);
            // Treated as static from here on: clear the stale stacked-frame
            // metadata so later stages (and a possible GIF re-encode) don't
            // read past the single extracted frame.
            current.set_n_pages(1);
            current.set_page_height(current.height());
            animated_output = false;
        }
    }

    // Stage 6: Trim (static paths only).
    if !animated_output {
        if let Some(threshold) = params.trim {
            let (l, t, w, h) = current.find_trim(threshold);
            if w > 0 && h > 0 {
                current = current.crop(l, t, w, h);
            }
        }
    }

    // Stage 7: Rotate / flip.
    if params.rotate != 0 {
        current = current.rotate(params.rotate);
    }
    if let Some(dir) = params.flip {
        current = current.flip(dir);
    }

    // Stage 8: Resize.
    let src_w = current.width();
    let src_h = if animated_output {
        current.get_page_height().unwrap_or(current.height())
    } else {
        current.height()
    };
    let (eff_w, eff_h) = params.effective_dimensions(src_w, src_h);

    if eff_w.is_some() || eff_h.is_some() {
        let effective_fit = if params.fit == FitMode::Pad { FitMode::Contain } else { params.fit };
        let size_mode = fit_to_size_mode(effective_fit);
        let crop_mode = gravity_to_crop_mode(params.gravity);
        let ew = eff_w.unwrap_or(src_w);
        let eh = eff_h.unwrap_or(src_h);

        if animated_output && effective_fit == FitMode::Cover && params.width.is_some() && params.height.is_some() {
            current = resize_animated_cover(current, ew, eh)?;
        } else if animated_output {
            // Resize the whole stacked buffer in one call; height scales
            // along with width so the per-frame aspect ratio is preserved,
            // then the page-height invariant is restored explicitly below.
            let pages = current.get_n_pages().unwrap_or(1);
            let target_stack_h = eh.saturating_mul(pages).max(pages);
            current = current.thumbnail(ew, Some(target_stack_h), size_mode, Some(crop_mode));
            let resized_h = current.height();
            current.set_page_height(resized_h / pages.max(1));
        } else {
            current = current.thumbnail(ew, Some(eh), size_mode, Some(crop_mode));
        }

        if params.fit == FitMode::Pad && !animated_output {
            let bg = params.background.unwrap_or(crate::params::Rgb(255, 255, 255));
            let (cur_w, cur_h) = (current.width(), current.height());
            let x = ((ew as i64 - cur_w as i64) / 2).max(0);
            let y = ((eh as i64 - cur_h as i64) / 2).max(0);
            current = current.embed(x, y, ew, eh, bg);
        }
    } else if params.fit != FitMode::Contain {
        return Err(PipelineError::NoResizeDimensions);
    }

    // Stage 9: Effects.
    if let Some(sigma) = params.sharpen {
        current = current.sharpen(sigma);
    }
    if let Some(sigma) = params.blur {
        current = current.blur(sigma);
    }
    if params.brightness.is_some() || params.contrast.is_some() {
        let a = params.contrast.unwrap_or(1.0);
        let b = (params.brightness.unwrap_or(1.0) - 1.0) * 128.0;
        current = current.linear(a, b);
    }
    if let Some(g) = params.gamma {
        current = current.gamma(g);
    }
    if let Some(s) = params.saturation {
        current = current.saturate(s);
    }

    // Stage 10: Background.
    if let Some(bg) = params.background {
        if params.fit != FitMode::Pad && current.has_alpha() {
            current = current.flatten(bg);
        }
    }

    // Stage 11: Encode.
    let output_format = animated_format.unwrap_or(still_format);
    let bytes_out = match output_format {
        OutputFormat::Jpeg | OutputFormat::Auto => current.encode_jpeg(params.quality)?,
        OutputFormat::Png => current.encode_png()?,
        OutputFormat::Webp => current.encode_webp(params.quality)?,
        OutputFormat::Avif => current.encode_avif(params.quality)?,
        OutputFormat::Gif => current.encode_gif()?,
    };

    Ok(PipelineOutput { bytes: bytes_out, format: output_format })
}

/// The animated-cover exception (spec.md §4.4 Stage 8): a single-call
/// crop-during-resize operates over the concatenated frame buffer and
/// corrupts frame boundaries, so cover-fit with both axes given is done in
/// two steps instead.
fn resize_animated_cover(handle: ImageHandle, eff_w: u32, eff_h: u32) -> Result<ImageHandle, PipelineError> {
    let pages = handle.get_n_pages().unwrap_or(1).max(1);
    let page_h = handle.get_page_height().unwrap_or(handle.height() / pages);
    let src_w = handle.width();

    let scale = (eff_w as f32 / src_w.max(1) as f32).max(eff_h as f32 / page_h.max(1) as f32);
    let new_w = (src_w as f32 * scale).ceil().max(1.0) as u32;
    let new_page_h = (page_h as f32 * scale).ceil().max(1.0) as u32;
    let new_stack_h = new_page_h * pages;

    let mut resized = handle.thumbnail(new_w, Some(new_stack_h), SizeMode::Force, None);
    resized.set_page_height(new_page_h);
    resized.set_n_pages(pages);

    let crop_left = new_w.saturating_sub(eff_w) / 2;
    let crop_top = new_page_h.saturating_sub(eff_h) / 2;

    let mut result = if crop_top == 0 {
        // Horizontal-only crop: safe to do over the whole stack in one call.
        resized.crop(crop_left, 0, eff_w.min(new_w), new_stack_h)
    } else {
        // Vertical crop needed: crop each frame individually, then
        // reassemble, to avoid crossing frame boundaries.
        let full = resized.inner().clone();
        let mut frames = Vec::with_capacity(pages as usize);
        for i in 0..pages {
            let top = i * new_page_h + crop_top;
            let cropped = ImageHandle::from_dynamic(full.clone())
                .crop(crop_left, top, eff_w.min(new_w), eff_h.min(new_page_h));
            frames.push(cropped);
        }
        arrayjoin_vertical(frames)?
    };

    result.set_page_height(eff_h);
    result.set_n_pages(pages);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::TransformParams;

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

    fn make_png(w: u32, h: u32) -> Vec<u8> {
        let img = image::DynamicImage::new_rgba8(w, h);
        let mut out = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png).unwrap();
        out
    }

    #[test]
    fn animated_gif_resizes_and_reencodes_as_gif() {
        let gif = make_gif(12, 128, 128);
        let params = TransformParams::parse("w=64,f=gif").unwrap();
        let out = run(&gif, &params, Some("image/gif"), AnimConfig::default()).unwrap();
        assert_eq!(out.format, OutputFormat::Gif);
        assert!(!out.bytes.is_empty());
    }

    #[test]
    fn anim_static_degrades_to_single_frame() {
        let gif = make_gif(12, 128, 128);
        let params = TransformParams::parse("anim=static,f=png").unwrap();
        let out = run(&gif, &params, None, AnimConfig::default()).unwrap();
        assert_eq!(out.format, OutputFormat::Png);
    }

    #[test]
    fn frame_extraction_returns_static_image() {
        let gif = make_gif(12, 16, 16);
        let params = TransformParams::parse("frame=1,f=png").unwrap();
        let out = run(&gif, &params, None, AnimConfig::default()).unwrap();
        assert_eq!(out.format, OutputFormat::Png);
    }

    #[test]
    fn over_budget_animation_degrades_to_static() {
        let gif = make_gif(12, 128, 128);
        let params = TransformParams::default();
        let cfg = AnimConfig { max_frames: 64, max_animated_pixels: 1000 };
        let out = run(&gif, &params, Some("image/gif"), cfg).unwrap();
        // Still encodes successfully; format falls back to the still negotiator.
        assert_ne!(out.format, OutputFormat::Gif);
    }

    #[test]
    fn still_image_cover_fit_crops_to_exact_size() {
        let png = make_png(800, 600);
        let params = TransformParams::parse("w=400,h=400,fit=cover").unwrap();
        let out = run(&png, &params, None, AnimConfig::default()).unwrap();
        assert!(!out.bytes.is_empty());
    }

    #[test]
    fn no_dimensions_with_non_contain_fit_errors() {
        let png = make_png(100, 100);
        let params = TransformParams::parse("fit=cover").unwrap();
        let err = run(&png, &params, None, AnimConfig::default()).unwrap_err();
        assert_eq!(err, PipelineError::NoResizeDimensions);
    }
}
