use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};

use crate::error::Result;

pub mod charts;
pub mod views;

const FONT_FAMILY: &str = "sans-serif";

const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

static FONT_REGISTERED: OnceLock<bool> = OnceLock::new();

fn register_first_font(configured: Option<&Path>) -> bool {
    *FONT_REGISTERED.get_or_init(|| {
        let candidates = configured
            .map(Path::to_path_buf)
            .into_iter()
            .chain(std::env::var_os("CYTOFLOW_FONT").map(PathBuf::from))
            .chain(SYSTEM_FONTS.iter().map(PathBuf::from));
        for path in candidates {
            let Ok(bytes) = fs::read(&path) else {
                continue;
            };
            let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
            match plotters::style::register_font(FONT_FAMILY, FontStyle::Normal, bytes) {
                Ok(()) => {
                    tracing::debug!(font = %path.display(), "registered plot font");
                    return true;
                }
                Err(_) => {
                    tracing::warn!(font = %path.display(), "not a usable TrueType font");
                }
            }
        }
        tracing::warn!("no TrueType font found; plots are rendered without text");
        false
    })
}

/// Explicit plotting state shared by every renderer of one run. Each
/// renderer opens its own canvas from here and presents it before returning.
#[derive(Debug, Clone)]
pub struct PlotContext {
    pub dpi: u32,
    pub marker_size: f64,
    pub marker_alpha: f64,
    text: bool,
}

impl PlotContext {
    pub fn new(dpi: u32, marker_size: f64, marker_alpha: f64, font: Option<&Path>) -> Self {
        Self {
            text: register_first_font(font),
            ..Self::textless(dpi, marker_size, marker_alpha)
        }
    }

    /// Context that never draws text, used where no font is wanted.
    pub fn textless(dpi: u32, marker_size: f64, marker_alpha: f64) -> Self {
        Self {
            dpi,
            marker_size,
            marker_alpha,
            text: false,
        }
    }

    pub fn has_text(&self) -> bool {
        self.text
    }

    /// Canvas of `w` x `h` inches.
    pub fn size(&self, w: f64, h: f64) -> (u32, u32) {
        let px = |inches: f64| ((inches * self.dpi as f64).round() as u32).max(64);
        (px(w), px(h))
    }

    /// Pixel radius for `marker_size`, read as a marker area in points squared.
    pub fn marker_radius(&self) -> i32 {
        let diameter_pt = self.marker_size.sqrt();
        let radius_px = diameter_pt * self.dpi as f64 / 72.0 / 2.0;
        (radius_px.round() as i32).max(1)
    }

    pub fn font(&self, size: f64) -> FontDesc<'static> {
        FontDesc::new(FontFamily::SansSerif, size * self.dpi as f64 / 100.0, FontStyle::Normal)
    }

    pub fn open_canvas<'a>(
        &self,
        path: &'a Path,
        size: (u32, u32),
    ) -> Result<DrawingArea<BitMapBackend<'a>, Shift>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let root = BitMapBackend::new(path, size).into_drawing_area();
        root.fill(&WHITE)?;
        Ok(root)
    }
}

/// How values are placed on an axis. Log axes plot `log10(v)` and drop `v <= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Linear,
    Log,
}

impl Scale {
    pub fn map(self, v: f64) -> Option<f64> {
        match self {
            Scale::Linear => v.is_finite().then_some(v),
            Scale::Log => (v.is_finite() && v > 0.0).then(|| v.log10()),
        }
    }

    pub fn tick_label(self, v: f64) -> String {
        match self {
            Scale::Linear => format_linear(v),
            Scale::Log => format_linear(10f64.powf(v)),
        }
    }
}

fn format_linear(v: f64) -> String {
    let a = v.abs();
    if a != 0.0 && (a >= 1e5 || a < 1e-2) {
        format!("{:.1e}", v)
    } else if a >= 100.0 {
        format!("{:.0}", v)
    } else {
        format!("{:.2}", v)
    }
}

/// Padded `(min, max)` of the finite values; `None` when there are none.
pub fn bounds(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for v in values.into_iter().filter(|v| v.is_finite()) {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if lo > hi {
        return None;
    }
    if hi - lo < 1e-12 {
        return Some((lo - 0.5, hi + 0.5));
    }
    let pad = (hi - lo) * 0.05;
    Some((lo - pad, hi + pad))
}

/// File-system-safe version of a channel name.
pub fn file_stem(channel: &str) -> String {
    channel
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/src_inline/render/mod.rs"]
mod tests;
