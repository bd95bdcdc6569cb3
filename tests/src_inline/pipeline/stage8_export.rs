use std::sync::Arc;

use super::*;
use crate::fixtures::{make_temp_dir, read_csv, stage_env, two_tube_params};
use crate::model::gates::ThresholdOp;
use crate::pipeline::stage1_import::run_stage1;
use crate::pipeline::stage3_population::run_stage3;

#[test]
fn test_exports_matrix_and_summary() {
    let dir = make_temp_dir("stage8_export");
    let mut params = two_tube_params(&dir);
    params.seed = 7;
    let env = stage_env(&params);
    let ex = run_stage1(&params).unwrap();
    let population = run_stage3(&env, &ex, &params).unwrap();
    let gate = ThresholdOp {
        name: "T".to_string(),
        channel: "FITC-A".to_string(),
        threshold: 500.0,
    };
    let gated = population.experiment.apply(Arc::new(gate.clone())).unwrap();
    let counts = gate.counts(&gated).unwrap();

    let summary = run_stage8(
        &env,
        &Stage8Input {
            params: &params,
            experiment: &gated,
            population: &population.op,
            autofluorescence: None,
            bleedthrough: None,
            threshold: Some(ThresholdSummary::new(&gate, counts)),
            quad: None,
            outputs: vec![population.plot.clone()],
        },
    )
    .unwrap();

    assert_eq!(summary.tool, env!("CARGO_PKG_NAME"));
    assert_eq!(summary.seed, 7);
    assert_eq!(summary.n_events, 800);
    assert_eq!(summary.tubes.len(), 2);
    assert_eq!(summary.tubes[0].condition_value, "0.0");
    assert_eq!(summary.tubes[0].events, 400);
    assert_eq!(summary.population.bulk_column, "CellBulk_2");
    assert_eq!(
        summary.threshold_gate.as_ref().map(|t| t.counts),
        Some(counts)
    );
    assert_eq!(
        summary.outputs,
        vec![
            PathBuf::from("gaussian_plot.png"),
            PathBuf::from("cell_matrix.csv"),
            PathBuf::from("run_summary.json"),
        ]
    );

    let (header, rows) = read_csv(&env.path("cell_matrix.csv"));
    assert_eq!(header.len(), 5 + 1 + 3 + 1);
    assert_eq!(header.last().map(String::as_str), Some("T"));
    assert_eq!(rows.len(), 800);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(env.path("run_summary.json")).unwrap())
            .unwrap();
    assert_eq!(json["experiment_name"], "dox");
    assert_eq!(json["channels"][2], "FITC-A");
}
