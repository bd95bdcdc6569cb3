use std::path::{Path, PathBuf};

use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::error::Result;
use crate::model::autofluorescence::AutofluorescenceEstimate;
use crate::model::bleedthrough::{BleedthroughEstimate, SpilloverPanel};
use crate::model::experiment::{Category, Experiment};
use crate::model::gates::{QuadOp, QuadrantStats, ThresholdOp};
use crate::model::population::GaussianMixtureOp;
use crate::render::charts::{
    Area, AxisSpec, HistogramPanel, ScatterSpec, draw_histogram, grouped_series, render_scatter,
    shared_range, single_series,
};
use crate::render::{PlotContext, Scale, bounds, file_stem};

/// Morphology scatter of the imported events, linear x against log y.
pub fn morphology_scatter(
    ctx: &PlotContext,
    path: &Path,
    experiment: &Experiment,
    xchannel: &str,
    ychannel: &str,
) -> Result<()> {
    let x = AxisSpec {
        name: xchannel,
        scale: Scale::Linear,
    };
    let y = AxisSpec {
        name: ychannel,
        scale: Scale::Log,
    };
    let title = format!("{} vs {}", xchannel, ychannel);
    let spec = ScatterSpec {
        title: &title,
        x,
        y,
        series: vec![single_series(
            "events",
            experiment.channel(xchannel)?,
            experiment.channel(ychannel)?,
            x,
            y,
        )],
        keep_x: Vec::new(),
        keep_y: Vec::new(),
    };
    render_scatter(ctx, path, &spec, |_, _, _| Ok(()))
}

/// Same axes as the morphology scatter, coloured by bulk-population membership.
pub fn population_scatter(
    ctx: &PlotContext,
    path: &Path,
    experiment: &Experiment,
    op: &GaussianMixtureOp,
) -> Result<()> {
    let bulk = op.bulk_column();
    let flags = experiment.flag(&bulk)?;
    let membership = Category {
        levels: vec!["False".to_string(), "True".to_string()],
        codes: flags.iter().map(|&f| Some(f as u32)).collect(),
    };
    let x = AxisSpec {
        name: &op.xchannel,
        scale: Scale::Linear,
    };
    let y = AxisSpec {
        name: &op.ychannel,
        scale: Scale::Log,
    };
    let title = format!("{} ({})", op.name, bulk);
    let spec = ScatterSpec {
        title: &title,
        x,
        y,
        series: grouped_series(
            &membership,
            experiment.channel(&op.xchannel)?,
            experiment.channel(&op.ychannel)?,
            x,
            y,
        ),
        keep_x: Vec::new(),
        keep_y: Vec::new(),
    };
    render_scatter(ctx, path, &spec, |_, _, _| Ok(()))
}

/// One log-scaled histogram per channel, one facet row per condition value.
/// Returns the written paths in channel order.
pub fn condition_histograms(
    ctx: &PlotContext,
    dir: &Path,
    experiment: &Experiment,
) -> Result<Vec<PathBuf>> {
    let conditions = experiment.conditions();
    let mut written = Vec::with_capacity(experiment.channels().len());
    for channel in experiment.channels() {
        let values = experiment.channel(channel)?;
        let mut facets: Vec<Vec<f64>> = vec![Vec::new(); conditions.levels.len()];
        for (code, &v) in conditions.codes.iter().zip(values) {
            if let (Some(code), Some(m)) = (code, Scale::Log.map(v)) {
                facets[*code as usize].push(m);
            }
        }
        let range = shared_range(&facets, &[]);
        let path = dir.join(format!("{}.png", file_stem(channel)));
        let rows = facets.len().max(1);
        let root = ctx.open_canvas(&path, ctx.size(6.4, 1.6 * rows as f64 + 0.8))?;
        let areas = root.split_evenly((rows, 1));
        for (i, (area, facet)) in areas.iter().zip(facets).enumerate() {
            let panel = HistogramPanel {
                caption: format!(
                    "{} = {}",
                    experiment.condition_name(),
                    conditions.levels[i]
                ),
                axis: AxisSpec {
                    name: channel,
                    scale: Scale::Log,
                },
                values: facet,
                range,
                markers: Vec::new(),
                color: palette_rgb(i),
            };
            draw_histogram(area, ctx, &panel)?;
        }
        root.present()?;
        written.push(path.clone());
    }
    Ok(written)
}

/// Blank-control distributions with the estimated background marked.
pub fn autofluorescence_view(
    ctx: &PlotContext,
    path: &Path,
    estimate: &AutofluorescenceEstimate,
) -> Result<()> {
    let rows = estimate.op.backgrounds.len().max(1);
    let root = ctx.open_canvas(path, ctx.size(6.4, 2.0 * rows as f64))?;
    let areas = root.split_evenly((rows, 1));
    for ((area, (channel, background)), values) in areas
        .iter()
        .zip(&estimate.op.backgrounds)
        .zip(&estimate.blank_values)
    {
        let markers = vec![*background];
        let values = trim_tails(values);
        let panel = HistogramPanel {
            caption: format!("{} (median {:.2})", channel, background),
            axis: AxisSpec {
                name: channel,
                scale: Scale::Linear,
            },
            range: shared_range(std::slice::from_ref(&values), &markers),
            values,
            markers,
            color: BLUE,
        };
        draw_histogram(area, ctx, &panel)?;
    }
    root.present()?;
    Ok(())
}

fn palette_rgb(i: usize) -> RGBColor {
    let (r, g, b) = Palette99::pick(i).rgb();
    RGBColor(r, g, b)
}

/// Drops the lowest and highest 0.5% of the finite values.
fn trim_tails(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    let cut = sorted.len() / 200;
    sorted[cut..sorted.len() - cut].to_vec()
}

/// Grid of single-colour control scatters: row = control channel, column =
/// receiving channel, with the fitted spillover line.
pub fn bleedthrough_view(
    ctx: &PlotContext,
    path: &Path,
    estimate: &BleedthroughEstimate,
) -> Result<()> {
    let channels = &estimate.op.channels;
    let n = channels.len().max(1);
    let root = ctx.open_canvas(path, ctx.size(2.6 * n as f64, 2.4 * n as f64))?;
    let areas = root.split_evenly((n, n));
    for (idx, area) in areas.iter().enumerate() {
        let (i, j) = (idx / n, idx % n);
        if i == j {
            if ctx.has_text() {
                let style = ctx
                    .font(12.0)
                    .color(&BLACK)
                    .pos(Pos::new(HPos::Center, VPos::Center));
                let (w, h) = area.dim_in_pixel();
                area.draw(&Text::new(
                    channels[i].clone(),
                    ((w / 2) as i32, (h / 2) as i32),
                    style,
                ))?;
            }
            continue;
        }
        let Some(panel) = estimate
            .panels
            .iter()
            .find(|p| p.from == channels[i] && p.to == channels[j])
        else {
            continue;
        };
        draw_spillover_panel(area, ctx, panel)?;
    }
    root.present()?;
    Ok(())
}

fn draw_spillover_panel(area: &Area<'_>, ctx: &PlotContext, panel: &SpilloverPanel) -> Result<()> {
    let (x0, x1) = bounds(panel.from_values.iter().copied()).unwrap_or((0.0, 1.0));
    let (y0, y1) = bounds(
        panel
            .to_values
            .iter()
            .copied()
            .chain([panel.slope * x0, panel.slope * x1]),
    )
    .unwrap_or((0.0, 1.0));

    let mut builder = ChartBuilder::on(area);
    builder.margin(6);
    if ctx.has_text() {
        builder
            .caption(
                format!("{} -> {}: {:.4}", panel.from, panel.to, panel.slope),
                ctx.font(9.0),
            )
            .x_label_area_size(ctx.size(0.3, 0.3).0)
            .y_label_area_size(ctx.size(0.5, 0.5).0);
    }
    let mut chart = builder.build_cartesian_2d(x0..x1, y0..y1)?;
    if ctx.has_text() {
        let fmt = |v: &f64| Scale::Linear.tick_label(*v);
        chart
            .configure_mesh()
            .x_labels(4)
            .y_labels(4)
            .x_label_formatter(&fmt)
            .y_label_formatter(&fmt)
            .label_style(ctx.font(7.0))
            .draw()?;
    }
    let radius = ctx.marker_radius();
    let color = BLUE.mix(ctx.marker_alpha);
    chart.draw_series(
        panel
            .from_values
            .iter()
            .zip(&panel.to_values)
            .map(|(&x, &y)| Circle::new((x, y), radius, color.filled())),
    )?;
    chart.draw_series(LineSeries::new(
        vec![(x0, panel.slope * x0), (x1, panel.slope * x1)],
        RED.stroke_width(2),
    ))?;
    Ok(())
}

/// Log histogram of the gated channel with the cutoff marked.
pub fn threshold_view(
    ctx: &PlotContext,
    path: &Path,
    experiment: &Experiment,
    op: &ThresholdOp,
) -> Result<()> {
    let values: Vec<f64> = experiment
        .channel(&op.channel)?
        .iter()
        .filter_map(|&v| Scale::Log.map(v))
        .collect();
    let markers: Vec<f64> = Scale::Log.map(op.threshold).into_iter().collect();
    let range = shared_range(std::slice::from_ref(&values), &markers);
    let root = ctx.open_canvas(path, ctx.size(6.4, 4.8))?;
    let panel = HistogramPanel {
        caption: format!("{}: {} >= {}", op.name, op.channel, op.threshold),
        axis: AxisSpec {
            name: &op.channel,
            scale: Scale::Log,
        },
        values,
        range,
        markers,
        color: BLUE,
    };
    draw_histogram(&root, ctx, &panel)?;
    root.present()?;
    Ok(())
}

/// Log-log scatter coloured by condition with the gate boundaries and the
/// per-quadrant percentages in the corners.
pub fn quadrant_view(
    ctx: &PlotContext,
    path: &Path,
    experiment: &Experiment,
    op: &QuadOp,
    stats: &QuadrantStats,
) -> Result<()> {
    let x = AxisSpec {
        name: &op.xchannel,
        scale: Scale::Log,
    };
    let y = AxisSpec {
        name: &op.ychannel,
        scale: Scale::Log,
    };
    let xline = Scale::Log.map(op.xthreshold);
    let yline = Scale::Log.map(op.ythreshold);
    let spec = ScatterSpec {
        title: &op.name,
        x,
        y,
        series: grouped_series(
            experiment.conditions(),
            experiment.channel(&op.xchannel)?,
            experiment.channel(&op.ychannel)?,
            x,
            y,
        ),
        keep_x: xline.into_iter().collect(),
        keep_y: yline.into_iter().collect(),
    };

    render_scatter(ctx, path, &spec, |chart, ctx, frame| {
        let line = BLACK.stroke_width(1);
        if let Some(xl) = xline {
            chart.draw_series(LineSeries::new(vec![(xl, frame.y.0), (xl, frame.y.1)], line))?;
        }
        if let Some(yl) = yline {
            chart.draw_series(LineSeries::new(vec![(frame.x.0, yl), (frame.x.1, yl)], line))?;
        }
        if !ctx.has_text() {
            return Ok(());
        }
        let dx = (frame.x.1 - frame.x.0) * 0.02;
        let dy = (frame.y.1 - frame.y.0) * 0.02;
        let corners = [
            ((frame.x.0 + dx, frame.y.1 - dy), Pos::new(HPos::Left, VPos::Top)),
            ((frame.x.1 - dx, frame.y.1 - dy), Pos::new(HPos::Right, VPos::Top)),
            ((frame.x.0 + dx, frame.y.0 + dy), Pos::new(HPos::Left, VPos::Bottom)),
            ((frame.x.1 - dx, frame.y.0 + dy), Pos::new(HPos::Right, VPos::Bottom)),
        ];
        for (row, (at, pos)) in stats.rows.iter().zip(corners) {
            let style = ctx.font(11.0).color(&RED).pos(pos);
            chart.draw_series(std::iter::once(Text::new(
                format!("{}: {}%", row.quadrant, row.percent),
                at,
                style,
            )))?;
        }
        Ok(())
    })
}

#[cfg(test)]
#[path = "../../tests/src_inline/render/views.rs"]
mod tests;
