use super::*;
use crate::fixtures::make_temp_dir;

#[test]
fn test_scale_map_drops_non_positive_on_log() {
    assert_eq!(Scale::Log.map(100.0), Some(2.0));
    assert_eq!(Scale::Log.map(0.0), None);
    assert_eq!(Scale::Log.map(-3.0), None);
    assert_eq!(Scale::Linear.map(-3.0), Some(-3.0));
    assert_eq!(Scale::Linear.map(f64::NAN), None);
}

#[test]
fn test_tick_labels() {
    assert_eq!(Scale::Log.tick_label(3.0), "1000");
    assert_eq!(Scale::Linear.tick_label(2.5), "2.50");
    assert_eq!(Scale::Linear.tick_label(250_000.0), "2.5e5");
    assert_eq!(Scale::Linear.tick_label(0.0), "0.00");
}

#[test]
fn test_bounds_pads_and_handles_degenerate() {
    assert_eq!(bounds([0.0, 10.0]), Some((-0.5, 10.5)));
    assert_eq!(bounds([4.0, 4.0]), Some((3.5, 4.5)));
    assert_eq!(bounds([f64::NAN]), None);
    assert_eq!(bounds(Vec::<f64>::new()), None);
}

#[test]
fn test_file_stem_replaces_separators() {
    assert_eq!(file_stem("PE-Tx-Red-YG-A"), "PE-Tx-Red-YG-A");
    assert_eq!(file_stem("CD4/CD8"), "CD4_CD8");
    assert_eq!(file_stem("a\\b"), "a_b");
}

#[test]
fn test_plot_context_sizes() {
    let ctx = PlotContext::textless(100, 0.5, 0.7);
    assert!(!ctx.has_text());
    assert_eq!(ctx.size(6.4, 4.8), (640, 480));
    assert_eq!(ctx.size(0.1, 0.1), (64, 64));
    assert_eq!(ctx.marker_radius(), 1);
    let big = PlotContext::textless(300, 36.0, 0.7);
    // 6 pt diameter at 300 dpi is 25 px, radius 12.5 rounds to 13.
    assert_eq!(big.marker_radius(), 13);
    assert_eq!(big.marker_alpha, 0.7);
}

#[test]
fn test_open_canvas_creates_parent_directories() {
    let dir = make_temp_dir("render_canvas");
    let path = dir.join("nested").join("deeper").join("blank.png");
    let ctx = PlotContext::textless(20, 0.5, 0.7);
    let root = ctx.open_canvas(&path, (64, 64)).unwrap();
    root.present().unwrap();
    drop(root);
    assert!(path.is_file());
}
