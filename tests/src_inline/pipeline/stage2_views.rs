use super::*;
use crate::fixtures::{make_temp_dir, stage_env, two_tube_params};
use crate::pipeline::stage1_import::run_stage1;

#[test]
fn test_writes_scatter_and_histograms() {
    let dir = make_temp_dir("stage2_views");
    let params = two_tube_params(&dir);
    let env = stage_env(&params);
    let ex = run_stage1(&params).unwrap();

    let out = run_stage2(&env, &ex, &params.morphology_channels).unwrap();
    assert!(out.scatterplot.is_file());
    assert_eq!(out.histograms.len(), ex.channels().len());
    assert_eq!(out.written[0], PathBuf::from("scatterplot.png"));
    assert_eq!(out.written[3], PathBuf::from("histograms/FITC-A.png"));
    assert_eq!(out.written.len(), 1 + ex.channels().len());
}
