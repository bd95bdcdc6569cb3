use super::*;
use crate::fixtures::{make_temp_dir, write_fcs};

fn tube(file: PathBuf, value: &str) -> Tube {
    Tube {
        file,
        condition_value: value.to_string(),
    }
}

#[test]
fn test_load_experiment_concatenates_tubes_in_order() {
    let dir = make_temp_dir("input_load");
    let a = dir.join("a.fcs");
    let b = dir.join("b.fcs");
    write_fcs(&a, &["FSC-A", "FITC-A"], &[vec![1.0, 2.0], vec![10.0, 20.0]]);
    write_fcs(
        &b,
        &["FSC-A", "FITC-A"],
        &[vec![3.0, 4.0, 5.0], vec![30.0, 40.0, 50.0]],
    );

    let ex = load_experiment(&[tube(a, "0.0"), tube(b, "1.0")], "Dox").unwrap();
    assert_eq!(ex.n_events(), 5);
    assert_eq!(ex.tube_sizes(), &[2, 3]);
    assert_eq!(ex.channel("FSC-A").unwrap(), &[1.0, 2.0, 3.0, 4.0, 5.0]);
    assert_eq!(ex.condition_name(), "Dox");
    let values: Vec<Option<&str>> = (0..5).map(|e| ex.conditions().value(e)).collect();
    assert_eq!(
        values,
        vec![Some("0.0"), Some("0.0"), Some("1.0"), Some("1.0"), Some("1.0")]
    );
}

#[test]
fn test_condition_values_stay_strings_and_share_levels() {
    let dir = make_temp_dir("input_levels");
    let a = dir.join("a.fcs");
    let b = dir.join("b.fcs");
    let c = dir.join("c.fcs");
    for path in [&a, &b, &c] {
        write_fcs(path, &["FSC-A"], &[vec![1.0]]);
    }
    let ex = load_experiment(
        &[tube(a, "1.0"), tube(b, "01"), tube(c, "1.0")],
        "Dox",
    )
    .unwrap();
    assert_eq!(ex.conditions().levels, vec!["1.0", "01"]);
    assert_eq!(ex.conditions().counts(), vec![2, 1]);
}

#[test]
fn test_extra_channels_are_dropped_missing_channels_fail() {
    let dir = make_temp_dir("input_channels");
    let a = dir.join("a.fcs");
    let b = dir.join("b.fcs");
    let c = dir.join("c.fcs");
    write_fcs(&a, &["FSC-A", "FITC-A"], &[vec![1.0], vec![2.0]]);
    write_fcs(
        &b,
        &["FITC-A", "FSC-A", "APC-A"],
        &[vec![20.0], vec![10.0], vec![99.0]],
    );
    write_fcs(&c, &["FSC-A"], &[vec![1.0]]);

    let ex = load_experiment(&[tube(a.clone(), "x"), tube(b, "y")], "C").unwrap();
    assert_eq!(ex.channels(), &["FSC-A", "FITC-A"]);
    assert_eq!(ex.channel("FSC-A").unwrap(), &[1.0, 10.0]);
    assert_eq!(ex.channel("FITC-A").unwrap(), &[2.0, 20.0]);

    let err = load_experiment(&[tube(a, "x"), tube(c, "y")], "C").unwrap_err();
    assert!(matches!(err, PipelineError::DataImport { .. }));
}

#[test]
fn test_empty_tube_list_is_rejected() {
    assert!(matches!(
        load_experiment(&[], "Dox"),
        Err(PipelineError::InvalidParams(_))
    ));
}

#[test]
fn test_read_control_uses_experiment_channels() {
    let dir = make_temp_dir("input_control");
    let a = dir.join("a.fcs");
    let blank = dir.join("blank.fcs");
    write_fcs(&a, &["FSC-A", "FITC-A"], &[vec![1.0], vec![2.0]]);
    write_fcs(
        &blank,
        &["FITC-A", "FSC-A"],
        &[vec![5.0, 6.0], vec![7.0, 8.0]],
    );
    let ex = load_experiment(&[tube(a, "0")], "Dox").unwrap();
    let control = read_control(&blank, &ex).unwrap();
    assert_eq!(control.channels(), ex.channels());
    assert_eq!(control.channel("FITC-A").unwrap(), &[5.0, 6.0]);
    assert_eq!(control.conditions().value(0), None);
    assert_eq!(control.n_events(), 2);
}

#[test]
fn test_tube_from_spec() {
    let spec = TubeSpec {
        file: PathBuf::from("x.fcs"),
        condition_value: "2.5".to_string(),
    };
    assert_eq!(
        Tube::from(&spec),
        tube(PathBuf::from("x.fcs"), "2.5")
    );
}
