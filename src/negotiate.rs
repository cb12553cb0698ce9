//! Content negotiation (spec.md §4.1): two pure functions choosing an output
//! format from the client's `Accept` header, source alpha, animation state,
//! and an explicit override. Grounded in the same "explicit string match,
//! never an ordinal" parsing style as `params.rs` / the original
//! `transform/params.rs`.

use crate::params::OutputFormat;

#[derive(Debug, Clone, Copy, Default)]
struct Capabilities {
    avif: bool,
    webp: bool,
    jpeg: bool,
    png: bool,
    gif: bool,
}

/// Parse an `Accept` header into a capability set. Recognises `*/*`,
/// `image/*`, and `image/{avif,webp,jpeg,jpg,png,gif}`; trims whitespace;
/// silently ignores unknown media types. `q=0` explicitly disables a format;
/// a `q=` that fails to parse defaults to `q=1` (accepted).
fn parse_accept(accept: &str) -> Capabilities {
    let mut caps = Capabilities::default();
    if accept.trim().is_empty() {
        return caps;
    }
    for range in accept.split(',') {
        let range = range.trim();
        if range.is_empty() {
            continue;
        }
        let mut parts = range.split(';');
        let media = parts.next().unwrap_or("").trim();

        let mut q = 1.0f32;
        for param in parts {
            let param = param.trim();
            if let Some(v) = param.strip_prefix("q=") {
                q = v.trim().parse().unwrap_or(1.0);
            }
        }
        let enabled = q != 0.0;

        match media {
            "*/*" | "image/*" => {
                caps.avif |= enabled;
                caps.webp |= enabled;
                caps.jpeg |= enabled;
                caps.png |= enabled;
                caps.gif |= enabled;
                if !enabled {
                    caps.avif = false;
                    caps.webp = false;
                    caps.jpeg = false;
                    caps.png = false;
                    caps.gif = false;
                }
            }
            "image/avif" => caps.avif = enabled,
            "image/webp" => caps.webp = enabled,
            "image/jpeg" | "image/jpg" => caps.jpeg = enabled,
            "image/png" => caps.png = enabled,
            "image/gif" => caps.gif = enabled,
            _ => {}
        }
    }
    caps
}

/// Choose an output format for a still (non-animated-output) image.
///
/// 1. An explicit non-auto `requested` format always wins.
/// 2. Otherwise rank by capability: without alpha, avif > webp > jpeg > png;
///    with alpha, avif > webp > png > jpeg.
/// 3. If nothing is accepted (empty/null header, or everything disabled via
///    `q=0`), fall back to jpeg.
pub fn negotiate_format(accept: Option<&str>, source_has_alpha: bool, requested: OutputFormat) -> OutputFormat {
    if requested != OutputFormat::Auto {
        return requested;
    }

    let caps = match accept {
        Some(a) => parse_accept(a),
        None => Capabilities::default(),
    };

    let order: &[(bool, OutputFormat)] = if source_has_alpha {
        &[
            (caps.avif, OutputFormat::Avif),
            (caps.webp, OutputFormat::Webp),
            (caps.png, OutputFormat::Png),
            (caps.jpeg, OutputFormat::Jpeg),
        ]
    } else {
        &[
            (caps.avif, OutputFormat::Avif),
            (caps.webp, OutputFormat::Webp),
            (caps.jpeg, OutputFormat::Jpeg),
            (caps.png, OutputFormat::Png),
        ]
    };

    order
        .iter()
        .find(|(accepted, _)| *accepted)
        .map(|(_, fmt)| *fmt)
        .unwrap_or(OutputFormat::Jpeg)
}

/// Choose an output format for animated output, or `None` if the caller
/// should degrade to a static encode (spec.md §4.1, used by pipeline §4.4
/// Stage 3).
///
/// 1. An explicit `requested` format that supports animation wins; an
///    explicit format that does not support animation returns `None` so the
///    caller degrades to static.
/// 2. Otherwise prefer webp over gif from the accepted set; else `None`.
pub fn negotiate_animated_format(accept: Option<&str>, requested: OutputFormat) -> Option<OutputFormat> {
    if requested != OutputFormat::Auto {
        return if requested.supports_animation() {
            Some(requested)
        } else {
            None
        };
    }

    let caps = match accept {
        Some(a) => parse_accept(a),
        None => Capabilities::default(),
    };

    if caps.webp {
        Some(OutputFormat::Webp)
    } else if caps.gif {
        Some(OutputFormat::Gif)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_request_always_wins() {
        assert_eq!(
            negotiate_format(Some("image/png"), false, OutputFormat::Jpeg),
            OutputFormat::Jpeg
        );
    }

    #[test]
    fn prefers_avif_then_webp_no_alpha() {
        assert_eq!(
            negotiate_format(Some("image/avif,image/webp,image/jpeg"), false, OutputFormat::Auto),
            OutputFormat::Avif
        );
    }

    #[test]
    fn alpha_prefers_png_over_jpeg() {
        assert_eq!(
            negotiate_format(Some("image/png,image/jpeg"), true, OutputFormat::Auto),
            OutputFormat::Png
        );
    }

    #[test]
    fn empty_accept_falls_back_to_jpeg() {
        assert_eq!(negotiate_format(Some(""), false, OutputFormat::Auto), OutputFormat::Jpeg);
        assert_eq!(negotiate_format(None, false, OutputFormat::Auto), OutputFormat::Jpeg);
    }

    #[test]
    fn q_zero_disables_format() {
        assert_eq!(
            negotiate_format(Some("image/avif;q=0,image/webp"), false, OutputFormat::Auto),
            OutputFormat::Webp
        );
    }

    #[test]
    fn animated_prefers_webp_over_gif() {
        assert_eq!(
            negotiate_animated_format(Some("image/webp,image/gif"), OutputFormat::Auto),
            Some(OutputFormat::Webp)
        );
    }

    #[test]
    fn animated_explicit_non_animated_format_degrades() {
        assert_eq!(
            negotiate_animated_format(Some("image/webp"), OutputFormat::Png),
            None
        );
    }

    #[test]
    fn wildcard_accept_matches_everything() {
        assert_eq!(negotiate_format(Some("*/*"), false, OutputFormat::Auto), OutputFormat::Avif);
    }
}
