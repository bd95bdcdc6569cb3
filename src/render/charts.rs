use std::path::Path;

use plotters::coord::Shift;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;

use crate::error::Result;
use crate::model::experiment::Category;
use crate::render::{PlotContext, Scale, bounds};

pub type Chart<'a, 'b> = ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;
pub type Area<'b> = DrawingArea<BitMapBackend<'b>, Shift>;

pub const HISTOGRAM_BINS: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct AxisSpec<'a> {
    pub name: &'a str,
    pub scale: Scale,
}

/// Points of one colour group, already mapped onto the axis scales.
#[derive(Debug, Clone)]
pub struct Series {
    pub label: String,
    pub points: Vec<(f64, f64)>,
}

/// Maps `(xs, ys)` onto the axes; events that cannot be placed are dropped.
pub fn single_series(label: &str, xs: &[f64], ys: &[f64], x: AxisSpec, y: AxisSpec) -> Series {
    Series {
        label: label.to_string(),
        points: xs
            .iter()
            .zip(ys)
            .filter_map(|(&a, &b)| Some((x.scale.map(a)?, y.scale.map(b)?)))
            .collect(),
    }
}

/// One series per level of `groups`, in level order. Unassigned events are skipped.
pub fn grouped_series(
    groups: &Category,
    xs: &[f64],
    ys: &[f64],
    x: AxisSpec,
    y: AxisSpec,
) -> Vec<Series> {
    let mut out: Vec<Series> = groups
        .levels
        .iter()
        .map(|l| Series {
            label: l.clone(),
            points: Vec::new(),
        })
        .collect();
    for ((code, &a), &b) in groups.codes.iter().zip(xs).zip(ys) {
        let Some(code) = code else {
            continue;
        };
        if let (Some(px), Some(py)) = (x.scale.map(a), y.scale.map(b)) {
            out[*code as usize].points.push((px, py));
        }
    }
    out
}

/// Plotted data range in mapped coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub x: (f64, f64),
    pub y: (f64, f64),
}

pub struct ScatterSpec<'a> {
    pub title: &'a str,
    pub x: AxisSpec<'a>,
    pub y: AxisSpec<'a>,
    pub series: Vec<Series>,
    /// Mapped coordinates that must stay inside the plotted range.
    pub keep_x: Vec<f64>,
    pub keep_y: Vec<f64>,
}

/// Draws a scatter chart into its own PNG. `overlay` runs after the points
/// and before the legend.
pub fn render_scatter<F>(ctx: &PlotContext, path: &Path, spec: &ScatterSpec, overlay: F) -> Result<()>
where
    F: FnOnce(&mut Chart<'_, '_>, &PlotContext, Frame) -> Result<()>,
{
    let root = ctx.open_canvas(path, ctx.size(6.4, 4.8))?;
    let (x0, x1) = bounds(
        spec.series
            .iter()
            .flat_map(|s| s.points.iter().map(|p| p.0))
            .chain(spec.keep_x.iter().copied()),
    )
    .unwrap_or((0.0, 1.0));
    let (y0, y1) = bounds(
        spec.series
            .iter()
            .flat_map(|s| s.points.iter().map(|p| p.1))
            .chain(spec.keep_y.iter().copied()),
    )
    .unwrap_or((0.0, 1.0));

    let mut builder = ChartBuilder::on(&root);
    builder.margin(12);
    if ctx.has_text() {
        builder
            .caption(spec.title, ctx.font(16.0))
            .x_label_area_size(ctx.size(0.5, 0.5).0)
            .y_label_area_size(ctx.size(0.8, 0.8).0);
    }
    let mut chart = builder.build_cartesian_2d(x0..x1, y0..y1)?;

    if ctx.has_text() {
        let xfmt = |v: &f64| spec.x.scale.tick_label(*v);
        let yfmt = |v: &f64| spec.y.scale.tick_label(*v);
        chart
            .configure_mesh()
            .x_desc(spec.x.name)
            .y_desc(spec.y.name)
            .x_label_formatter(&xfmt)
            .y_label_formatter(&yfmt)
            .label_style(ctx.font(10.0))
            .axis_desc_style(ctx.font(12.0))
            .draw()?;
    }

    let radius = ctx.marker_radius();
    let legend = ctx.has_text() && spec.series.len() > 1;
    for (i, series) in spec.series.iter().enumerate() {
        let color = Palette99::pick(i).mix(ctx.marker_alpha);
        let drawn = chart.draw_series(
            series
                .points
                .iter()
                .map(|&p| Circle::new(p, radius, color.filled())),
        )?;
        if legend {
            drawn
                .label(series.label.clone())
                .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
        }
    }

    let frame = Frame {
        x: (x0, x1),
        y: (y0, y1),
    };
    overlay(&mut chart, ctx, frame)?;

    if legend {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .label_font(ctx.font(10.0))
            .draw()?;
    }

    drop(chart);
    root.present()?;
    Ok(())
}

/// Counts of `values` in `bins` equal-width bins over `[lo, hi)`; the last
/// bin is closed. Values outside the range are ignored.
pub fn bin_counts(values: &[f64], lo: f64, hi: f64, bins: usize) -> Vec<usize> {
    let mut counts = vec![0usize; bins];
    if bins == 0 || !(hi > lo) {
        return counts;
    }
    let width = (hi - lo) / bins as f64;
    for &v in values {
        if !(v >= lo && v <= hi) {
            continue;
        }
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
}

pub struct HistogramPanel<'a> {
    pub caption: String,
    pub axis: AxisSpec<'a>,
    /// Values already mapped onto `axis.scale`.
    pub values: Vec<f64>,
    pub range: (f64, f64),
    /// Mapped positions of vertical marker lines.
    pub markers: Vec<f64>,
    pub color: RGBColor,
}

/// Draws one histogram into `area`.
pub fn draw_histogram(area: &Area<'_>, ctx: &PlotContext, panel: &HistogramPanel) -> Result<()> {
    let (lo, hi) = panel.range;
    let counts = bin_counts(&panel.values, lo, hi, HISTOGRAM_BINS);
    let peak = counts.iter().copied().max().unwrap_or(0).max(1) as f64;
    let width = (hi - lo) / HISTOGRAM_BINS as f64;

    let mut builder = ChartBuilder::on(area);
    builder.margin(8);
    if ctx.has_text() {
        builder
            .caption(&panel.caption, ctx.font(12.0))
            .x_label_area_size(ctx.size(0.4, 0.4).0)
            .y_label_area_size(ctx.size(0.7, 0.7).0);
    }
    let mut chart = builder.build_cartesian_2d(lo..hi, 0.0..peak * 1.05)?;

    if ctx.has_text() {
        let xfmt = |v: &f64| panel.axis.scale.tick_label(*v);
        chart
            .configure_mesh()
            .x_desc(panel.axis.name)
            .y_desc("events")
            .x_label_formatter(&xfmt)
            .label_style(ctx.font(9.0))
            .axis_desc_style(ctx.font(10.0))
            .draw()?;
    }

    let fill = panel.color.mix(0.6).filled();
    chart.draw_series(counts.iter().enumerate().filter(|(_, c)| **c > 0).map(|(i, &c)| {
        let x0 = lo + i as f64 * width;
        Rectangle::new([(x0, 0.0), (x0 + width, c as f64)], fill)
    }))?;

    for &m in &panel.markers {
        if m >= lo && m <= hi {
            chart.draw_series(LineSeries::new(
                vec![(m, 0.0), (m, peak * 1.05)],
                RED.stroke_width(2),
            ))?;
        }
    }
    Ok(())
}

/// Range covering every value and marker of several panels, so facets share an axis.
pub fn shared_range(panels: &[Vec<f64>], markers: &[f64]) -> (f64, f64) {
    bounds(
        panels
            .iter()
            .flat_map(|p| p.iter().copied())
            .chain(markers.iter().copied()),
    )
    .unwrap_or((0.0, 1.0))
}

#[cfg(test)]
#[path = "../../tests/src_inline/render/charts.rs"]
mod tests;
