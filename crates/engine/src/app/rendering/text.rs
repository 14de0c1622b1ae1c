//! Canvas text. Characters come from an optional TrueType/OpenType face
//! loaded at startup. Anything the face lacks, or every character when no
//! face is loaded, draws from the embedded Unifont bitmaps (8x16 halfwidth,
//! 16x16 fullwidth), which cover the Basic Multilingual Plane including CJK.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rusttype::{point, Font, Scale, ScaledGlyph};
use thiserror::Error;
use tracing::{info, warn};
use unifont::Glyph as BitmapGlyph;

use super::renderer::{blend_pixel_clipped, write_pixel_rgba_clipped};

pub const FONT_ENV_VAR: &str = "GALLERY_FONT";
const FONT_DIR: &str = "fonts";
const FONT_EXTENSIONS: [&str; 3] = ["ttf", "otf", "ttc"];

pub(crate) const LINE_HEIGHT: i32 = 16;
pub(crate) const LINE_ADVANCE: i32 = LINE_HEIGHT + 2;
const MISSING_ADVANCE: i32 = 8;
const FALLBACK_CHAR: char = '?';

#[derive(Debug, Error)]
pub(crate) enum FontError {
    #[error("failed to read font {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("font {path} is not a usable TrueType/OpenType file")]
    Parse { path: PathBuf },
}

/// `GALLERY_FONT` when set and non-empty, otherwise the first font file in
/// `<assets>/fonts/` by name.
pub fn resolve_font_path(asset_dir: &Path) -> Option<PathBuf> {
    match env::var(FONT_ENV_VAR) {
        Ok(value) if !value.trim().is_empty() => return Some(PathBuf::from(value.trim())),
        Ok(_) | Err(env::VarError::NotPresent) => {}
        Err(error) => warn!(var = FONT_ENV_VAR, error = %error, "font_env_invalid"),
    }
    font_in_dir(&asset_dir.join(FONT_DIR))
}

fn font_in_dir(dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut fonts: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_font_extension(path))
        .collect();
    fonts.sort();
    fonts.into_iter().next()
}

fn has_font_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            FONT_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

struct OutlineFace {
    font: Font<'static>,
    scale: Scale,
    ascent: f32,
}

enum GlyphSource {
    Outline(ScaledGlyph<'static>),
    Bitmap(&'static BitmapGlyph),
    Missing,
}

pub(crate) struct TextPainter {
    face: Option<OutlineFace>,
}

impl TextPainter {
    pub(crate) fn builtin() -> Self {
        Self { face: None }
    }

    pub(crate) fn from_font_bytes(bytes: Vec<u8>) -> Option<Self> {
        let font = Font::try_from_vec(bytes)?;
        let scale = Scale::uniform(LINE_HEIGHT as f32);
        let ascent = font.v_metrics(scale).ascent;
        Some(Self {
            face: Some(OutlineFace {
                font,
                scale,
                ascent,
            }),
        })
    }

    pub(crate) fn load(path: &Path) -> Result<Self, FontError> {
        let bytes = fs::read(path).map_err(|source| FontError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_font_bytes(bytes).ok_or_else(|| FontError::Parse {
            path: path.to_path_buf(),
        })
    }

    /// A font that fails to load is logged and the bitmaps are used instead.
    pub(crate) fn from_config(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            info!("text_font_builtin");
            return Self::builtin();
        };
        match Self::load(path) {
            Ok(painter) => {
                info!(path = %path.display(), "text_font_loaded");
                painter
            }
            Err(error) => {
                warn!(error = %error, "text_font_load_failed");
                Self::builtin()
            }
        }
    }

    #[cfg(test)]
    fn has_outline_face(&self) -> bool {
        self.face.is_some()
    }

    fn glyph(&self, ch: char) -> GlyphSource {
        if let Some(face) = &self.face {
            let glyph = face.font.glyph(ch);
            if glyph.id().0 != 0 {
                return GlyphSource::Outline(glyph.scaled(face.scale));
            }
        }
        match unifont::get_glyph(ch).or_else(|| unifont::get_glyph(FALLBACK_CHAR)) {
            Some(glyph) => GlyphSource::Bitmap(glyph),
            None => GlyphSource::Missing,
        }
    }

    pub(crate) fn advance(&self, ch: char) -> i32 {
        match self.glyph(ch) {
            GlyphSource::Outline(glyph) => glyph.h_metrics().advance_width.ceil() as i32,
            GlyphSource::Bitmap(glyph) => glyph.get_width() as i32,
            GlyphSource::Missing => MISSING_ADVANCE,
        }
    }

    pub(crate) fn width(&self, text: &str) -> i32 {
        text.chars().map(|ch| self.advance(ch)).sum()
    }

    /// Draws one line with its top edge at `y`. Pixels outside the frame are
    /// skipped.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn draw(
        &self,
        frame: &mut [u8],
        width: u32,
        height: u32,
        x: i32,
        y: i32,
        text: &str,
        color: [u8; 4],
    ) {
        if width == 0 || height == 0 {
            return;
        }
        let ascent = self.face.as_ref().map_or(0.0, |face| face.ascent);
        let mut pen_x = x;
        for ch in text.chars() {
            match self.glyph(ch) {
                GlyphSource::Outline(glyph) => {
                    let advance = glyph.h_metrics().advance_width.ceil() as i32;
                    let positioned = glyph.positioned(point(pen_x as f32, y as f32 + ascent));
                    if let Some(bounds) = positioned.pixel_bounding_box() {
                        positioned.draw(|gx, gy, coverage| {
                            let alpha = (coverage * 255.0).round().clamp(0.0, 255.0) as u8;
                            let px = bounds.min.x + gx as i32;
                            let py = bounds.min.y + gy as i32;
                            plot(frame, width, px, py, color, alpha);
                        });
                    }
                    pen_x += advance;
                }
                GlyphSource::Bitmap(glyph) => {
                    draw_bitmap_glyph(frame, width, pen_x, y, glyph, color);
                    pen_x += glyph.get_width() as i32;
                }
                GlyphSource::Missing => pen_x += MISSING_ADVANCE,
            }
        }
    }

    /// Greedy wrap on pixel width. Breaks at the last space when the line has
    /// one, otherwise mid-word. Explicit newlines always break.
    pub(crate) fn wrap(&self, text: &str, max_width: i32) -> Vec<String> {
        let max_width = max_width.max(1);
        let mut lines = Vec::new();
        for paragraph in text.split('\n') {
            let first_line = lines.len();
            let mut current: Vec<char> = Vec::new();
            for ch in paragraph.chars() {
                current.push(ch);
                while current.len() > 1 && self.chars_width(&current) > max_width {
                    let split_at = current
                        .iter()
                        .rposition(|c| *c == ' ')
                        .filter(|index| *index > 0)
                        .unwrap_or(current.len() - 1);
                    let rest = current.split_off(split_at);
                    lines.push(current.iter().collect::<String>().trim_end().to_string());
                    current = rest.into_iter().skip_while(|c| *c == ' ').collect();
                }
            }
            if !current.is_empty() || lines.len() == first_line {
                lines.push(current.into_iter().collect());
            }
        }
        lines
    }

    /// Longest suffix of `text` that fits in `max_width`.
    pub(crate) fn tail_fitting<'a>(&self, text: &'a str, max_width: i32) -> &'a str {
        let mut used = 0;
        let mut start = text.len();
        for (index, ch) in text.char_indices().rev() {
            used += self.advance(ch);
            if used > max_width {
                break;
            }
            start = index;
        }
        &text[start..]
    }

    fn chars_width(&self, chars: &[char]) -> i32 {
        chars.iter().map(|ch| self.advance(*ch)).sum()
    }
}

fn draw_bitmap_glyph(
    frame: &mut [u8],
    width: u32,
    x: i32,
    y: i32,
    glyph: &BitmapGlyph,
    color: [u8; 4],
) {
    for row in 0..LINE_HEIGHT as usize {
        for col in 0..glyph.get_width() {
            if glyph.get_pixel(col, row) {
                write_pixel_rgba_clipped(
                    frame,
                    width as usize,
                    x + col as i32,
                    y + row as i32,
                    color,
                );
            }
        }
    }
}

fn plot(frame: &mut [u8], width: u32, x: i32, y: i32, color: [u8; 4], alpha: u8) {
    match alpha {
        0 => {}
        255 => write_pixel_rgba_clipped(frame, width as usize, x, y, color),
        _ => blend_pixel_clipped(
            frame,
            width as usize,
            x,
            y,
            [color[0], color[1], color[2]],
            alpha,
        ),
    }
}
