use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use fontdue::layout::{
    CoordinateSystem, HorizontalAlign, Layout, LayoutSettings, TextStyle, VerticalAlign, WrapStyle,
};
use fontdue::{Font, FontSettings};
use serde_json::json;
use tiny_skia::{Color, Pixmap};

use crate::color_name::Rgb;
use crate::error_codes::{CodedError, FONT_LOAD_FAILED, RENDER_FAILED, UNSUPPORTED_GLYPH};

#[derive(Debug, Clone)]
pub struct GlyphBitmap {
    pub width: usize,
    pub height: usize,
    pub bitmap: Vec<u8>,
}

/// Draws centered countdown labels onto solid backgrounds.
pub struct TextPainter {
    font: Font,
    font_size: f32,
    glyph_cache: HashMap<fontdue::layout::GlyphRasterConfig, GlyphBitmap>,
}

impl TextPainter {
    pub fn from_path(font_path: &Path, font_size: f32) -> Result<Self> {
        let font_bytes = std::fs::read(font_path).map_err(|error| {
            anyhow!(CodedError::clip(
                FONT_LOAD_FAILED,
                format!("failed to read font file {}: {error}", font_path.display()),
            )
            .with_details(json!({ "path": font_path.display().to_string() })))
        })?;
        Self::from_bytes(font_bytes, font_size)
            .with_context(|| format!("while loading font {}", font_path.display()))
    }

    pub fn from_bytes(font_bytes: Vec<u8>, font_size: f32) -> Result<Self> {
        let font = Font::from_bytes(font_bytes, FontSettings::default()).map_err(|error| {
            anyhow!(CodedError::clip(
                FONT_LOAD_FAILED,
                format!("failed to parse font: {error}"),
            ))
        })?;
        Ok(Self {
            font,
            font_size,
            glyph_cache: HashMap::new(),
        })
    }

    pub fn font_size(&self) -> f32 {
        self.font_size
    }

    pub fn ensure_supported_codepoints(&self, text: &str) -> Result<()> {
        for ch in text.chars() {
            if matches!(ch, '\n' | '\r' | '\t' | ' ') {
                continue;
            }
            if self.font.lookup_glyph_index(ch) == 0 {
                return Err(anyhow!(CodedError::clip(
                    UNSUPPORTED_GLYPH,
                    format!(
                        "font has no glyph for U+{:04X} ({})",
                        ch as u32,
                        ch.escape_default()
                    ),
                )
                .with_details(json!({ "text": text }))));
            }
        }
        Ok(())
    }

    /// RGBA frame with `text` centered on `background`.
    pub fn render_card(
        &mut self,
        width: u32,
        height: u32,
        background: Rgb,
        text: &str,
        color: Rgb,
    ) -> Result<Vec<u8>> {
        self.ensure_supported_codepoints(text)?;

        let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
            anyhow!(CodedError::render(
                RENDER_FAILED,
                format!("failed to allocate frame {width}x{height}"),
            ))
        })?;
        pixmap.fill(Color::from_rgba8(background.0, background.1, background.2, 255));

        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings {
            x: 0.0,
            y: 0.0,
            max_width: Some(width as f32),
            max_height: Some(height as f32),
            horizontal_align: HorizontalAlign::Center,
            vertical_align: VerticalAlign::Middle,
            line_height: 1.0,
            wrap_style: WrapStyle::Word,
            wrap_hard_breaks: true,
        });
        layout.append(&[&self.font], &TextStyle::new(text, self.font_size, 0));

        let frame = pixmap.data_mut();
        for glyph in layout.glyphs() {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let font = &self.font;
            let glyph_bitmap = self.glyph_cache.entry(glyph.key).or_insert_with(|| {
                let (_, bitmap) = font.rasterize_config(glyph.key);
                GlyphBitmap {
                    width: glyph.width,
                    height: glyph.height,
                    bitmap,
                }
            });

            stamp_mask(
                frame,
                width,
                height,
                (glyph.x.round() as i32, glyph.y.round() as i32),
                glyph_bitmap,
                color,
            );
        }

        Ok(pixmap.take())
    }
}

/// Stamps a coverage mask onto an opaque RGBA frame, clipped to the frame.
pub fn stamp_mask(
    frame: &mut [u8],
    frame_width: u32,
    frame_height: u32,
    origin: (i32, i32),
    glyph: &GlyphBitmap,
    color: Rgb,
) {
    let (left, top) = origin;
    let cols = clip_span(left, glyph.width, frame_width);
    let stride = frame_width as usize * 4;

    for row in clip_span(top, glyph.height, frame_height) {
        let coverage_row = &glyph.bitmap[row * glyph.width..(row + 1) * glyph.width];
        let y = (top + row as i32) as usize;
        for col in cols.clone() {
            let coverage = coverage_row[col];
            if coverage == 0 {
                continue;
            }
            let offset = y * stride + (left + col as i32) as usize * 4;
            tint(&mut frame[offset..offset + 4], color, coverage);
        }
    }
}

/// Mask indices of a `len`-wide run starting at `start` that fall in `0..limit`.
fn clip_span(start: i32, len: usize, limit: u32) -> Range<usize> {
    let len = len as i64;
    let first = (-i64::from(start)).clamp(0, len);
    let last = (i64::from(limit) - i64::from(start)).clamp(first, len);
    first as usize..last as usize
}

/// Moves an opaque pixel toward `color` by `coverage / 255`.
pub fn tint(pixel: &mut [u8], color: Rgb, coverage: u8) {
    let cover = u16::from(coverage);
    let keep = 255 - cover;
    for (channel, target) in pixel.iter_mut().zip([color.0, color.1, color.2]) {
        *channel = ((u16::from(target) * cover + u16::from(*channel) * keep + 127) / 255) as u8;
    }
    pixel[3] = 255;
}

#[cfg(test)]
mod tests {
    use super::{clip_span, stamp_mask, tint, GlyphBitmap, TextPainter};
    use crate::color_name::Rgb;
    use crate::error_codes::{find_coded_error, CodedErrorKind};

    #[test]
    fn full_coverage_replaces_destination() {
        let mut pixel = [0, 0, 0, 255];
        tint(&mut pixel, Rgb(255, 0, 0), 255);
        assert_eq!(pixel, [255, 0, 0, 255]);
    }

    #[test]
    fn half_coverage_mixes_channels() {
        let mut pixel = [0, 0, 0, 255];
        tint(&mut pixel, Rgb(255, 255, 255), 128);
        assert_eq!(pixel, [128, 128, 128, 255]);
    }

    #[test]
    fn spans_clip_on_both_edges() {
        assert_eq!(clip_span(1, 2, 2), 0..1);
        assert_eq!(clip_span(-1, 3, 2), 1..3);
        assert_eq!(clip_span(5, 3, 2), 0..0);
        assert_eq!(clip_span(-9, 3, 2), 3..3);
    }

    #[test]
    fn glyph_outside_frame_is_clipped() {
        let mut frame = vec![0_u8; 2 * 2 * 4];
        let glyph = GlyphBitmap {
            width: 2,
            height: 2,
            bitmap: vec![255; 4],
        };
        stamp_mask(&mut frame, 2, 2, (1, 1), &glyph, Rgb(255, 255, 255));
        assert_eq!(&frame[12..16], &[255, 255, 255, 255]);
        assert_eq!(&frame[0..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn garbage_font_bytes_are_clip_errors() {
        let error = TextPainter::from_bytes(vec![0, 1, 2, 3], 32.0)
            .err()
            .expect("garbage must not parse");
        let coded = find_coded_error(&error).expect("coded error");
        assert_eq!(coded.kind, CodedErrorKind::ClipConstruction);
        assert_eq!(coded.code, "FONT_LOAD_FAILED");
    }

    #[test]
    fn missing_font_file_is_a_clip_error() {
        let error = TextPainter::from_path(std::path::Path::new("/nonexistent/font.ttf"), 32.0)
            .err()
            .expect("missing file must fail");
        let coded = find_coded_error(&error).expect("coded error");
        assert_eq!(coded.kind, CodedErrorKind::ClipConstruction);
    }
}
