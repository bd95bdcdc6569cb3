use super::*;
use crate::config::QuadGateSpec;
use crate::error::PipelineError;
use crate::fixtures::{make_temp_dir, read_csv, stage_env, two_tube_params};
use crate::model::experiment::Category;
use crate::pipeline::stage1_import::run_stage1;

fn spec() -> QuadGateSpec {
    QuadGateSpec {
        gate_name: "Q".to_string(),
        xchannel: "FITC-A".to_string(),
        xthreshold: 500.0,
        ychannel: "PE-Tx-Red-YG-A".to_string(),
        ythreshold: 300.0,
    }
}

#[test]
fn test_quadrant_statistics_cover_all_events() {
    let dir = make_temp_dir("stage7_quad");
    let params = two_tube_params(&dir);
    let env = stage_env(&params);
    let ex = run_stage1(&params).unwrap();

    let out = run_stage7(&env, &ex, Stage::Run(&spec())).unwrap();
    let summary = out.summary.unwrap();
    assert_eq!(summary.statistics.total, 800);
    let percent: f64 = summary.statistics.rows.iter().map(|r| r.percent).sum();
    assert!((percent - 100.0).abs() <= 0.02);
    assert_eq!(
        out.written,
        vec![
            PathBuf::from("quadrant_gate/scatterplot.png"),
            PathBuf::from("quadrant_gate/quadrant_statistics.csv"),
        ]
    );

    let (_, rows) = read_csv(&env.path("quadrant_gate/quadrant_statistics.csv"));
    for (row, stat) in rows.iter().zip(&summary.statistics.rows) {
        assert_eq!(row[2], stat.cells.to_string());
    }
    assert_eq!(out.experiment.category("Q").unwrap().counts().iter().sum::<usize>(), 800);
}

#[test]
fn test_empty_experiment_is_an_empty_gate() {
    let dir = make_temp_dir("stage7_empty");
    let params = two_tube_params(&dir);
    let env = stage_env(&params);
    let ex = Experiment::new(
        vec!["FITC-A".to_string(), "PE-Tx-Red-YG-A".to_string()],
        vec![Vec::new(), Vec::new()],
        "Dox".to_string(),
        Category {
            levels: Vec::new(),
            codes: Vec::new(),
        },
        Vec::new(),
    )
    .unwrap();
    let err = run_stage7(&env, &ex, Stage::Run(&spec())).unwrap_err();
    assert!(matches!(err, PipelineError::EmptyGate { ref gate } if gate == "Q"));
    assert!(!env.path("quadrant_gate/quadrant_statistics.csv").exists());
}
