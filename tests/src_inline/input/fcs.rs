use super::*;
use crate::fixtures::{Encoding, FcsWriter, make_temp_dir, write_fcs, write_file};

#[test]
fn test_parse_text_segment_handles_escaped_delimiter() {
    let text = b"/$P1N/FSC-A/$FIL/a//b.fcs/$mode/L/";
    let keywords = parse_text_segment(text).unwrap();
    assert_eq!(keywords.get("$P1N").map(String::as_str), Some("FSC-A"));
    assert_eq!(keywords.get("$FIL").map(String::as_str), Some("a/b.fcs"));
    assert_eq!(keywords.get("$MODE").map(String::as_str), Some("L"));
}

#[test]
fn test_parse_text_segment_drops_unpaired_keyword() {
    let keywords = parse_text_segment(b"|$PAR|2|$DANGLING|").unwrap();
    assert_eq!(keywords.len(), 1);
    assert!(parse_text_segment(b"").is_err());
}

#[test]
fn test_read_float_little_endian() {
    let dir = make_temp_dir("fcs_float");
    let path = dir.join("a.fcs");
    write_fcs(
        &path,
        &["FSC-A", "FITC-A"],
        &[vec![1.0, 2.5, 3.0], vec![-4.0, 5.0, 600.0]],
    );
    let file = read_fcs(&path).unwrap();
    assert_eq!(file.meta.version, "FCS3.1");
    assert_eq!(file.meta.n_events, 3);
    assert_eq!(file.meta.datatype, DataType::Float);
    assert_eq!(file.meta.byte_order, ByteOrder::Little);
    assert_eq!(file.meta.channel_names(), vec!["FSC-A", "FITC-A"]);
    assert_eq!(file.columns[0], vec![1.0, 2.5, 3.0]);
    assert_eq!(file.columns[1], vec![-4.0, 5.0, 600.0]);
}

#[test]
fn test_read_double_big_endian() {
    let dir = make_temp_dir("fcs_double");
    let path = dir.join("b.fcs");
    let writer = FcsWriter {
        version: "FCS3.0",
        encoding: Encoding::F64Big,
        ..FcsWriter::default()
    };
    writer.write(&path, &["SSC-A"], &[vec![0.125, 1e6]]);
    let file = read_fcs(&path).unwrap();
    assert_eq!(file.meta.datatype, DataType::Double);
    assert_eq!(file.meta.byte_order, ByteOrder::Big);
    assert_eq!(file.columns[0], vec![0.125, 1e6]);
}

#[test]
fn test_read_integer_masks_to_range() {
    let dir = make_temp_dir("fcs_int");
    let path = dir.join("c.fcs");
    let writer = FcsWriter {
        encoding: Encoding::UInt(16, 1024),
        ..FcsWriter::default()
    };
    // 1030 & (1024 - 1) == 6
    writer.write(&path, &["FL1"], &[vec![5.0, 1023.0, 1030.0]]);
    let file = read_fcs(&path).unwrap();
    assert_eq!(file.meta.datatype, DataType::Integer);
    assert_eq!(file.columns[0], vec![5.0, 1023.0, 6.0]);
}

#[test]
fn test_data_offsets_from_text_when_header_is_zero() {
    let dir = make_temp_dir("fcs_offsets");
    let path = dir.join("d.fcs");
    let writer = FcsWriter {
        data_offsets_in_text: true,
        ..FcsWriter::default()
    };
    writer.write(&path, &["FSC-A"], &[vec![7.0, 8.0]]);
    let file = read_fcs(&path).unwrap();
    assert_eq!(file.columns[0], vec![7.0, 8.0]);
}

#[test]
fn test_read_gzip_compressed() {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let dir = make_temp_dir("fcs_gz");
    let path = dir.join("e.fcs.gz");
    let raw = FcsWriter::default().encode(&["FSC-A"], &[vec![1.0, 2.0]]);
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&raw).unwrap();
    write_file(&path, &enc.finish().unwrap());

    let file = read_fcs(&path).unwrap();
    assert_eq!(file.columns[0], vec![1.0, 2.0]);
}

#[test]
fn test_metadata_exposes_keywords_and_labels() {
    let dir = make_temp_dir("fcs_meta");
    let path = dir.join("f.fcs");
    let writer = FcsWriter {
        extra: vec![
            ("$CYT".to_string(), "LSRII".to_string()),
            ("$P1S".to_string(), "GFP".to_string()),
        ],
        ..FcsWriter::default()
    };
    writer.write(&path, &["FITC-A"], &[vec![1.0]]);
    let meta = read_fcs_metadata(&path).unwrap();
    assert_eq!(meta.keyword("$cyt"), Some("LSRII"));
    assert_eq!(meta.channels[0].label.as_deref(), Some("GFP"));
    assert_eq!(meta.channels[0].bits, 32);
    assert_eq!(meta.channels[0].range, Some(262_144.0));
}

#[test]
fn test_zero_event_file_has_empty_columns() {
    let dir = make_temp_dir("fcs_empty");
    let path = dir.join("g.fcs");
    write_fcs(&path, &["FSC-A", "SSC-A"], &[vec![], vec![]]);
    let file = read_fcs(&path).unwrap();
    assert_eq!(file.meta.n_events, 0);
    assert!(file.columns.iter().all(Vec::is_empty));
}

#[test]
fn test_rejects_non_fcs_and_truncated_files() {
    let dir = make_temp_dir("fcs_bad");
    let junk = dir.join("junk.fcs");
    write_file(&junk, b"this is definitely not a flow cytometry standard file at all");
    assert!(matches!(
        read_fcs(&junk),
        Err(PipelineError::DataImport { .. })
    ));

    let truncated = dir.join("short.fcs");
    let mut raw = FcsWriter::default().encode(&["FSC-A"], &[vec![1.0, 2.0, 3.0]]);
    raw.truncate(raw.len() - 4);
    write_file(&truncated, &raw);
    let err = read_fcs(&truncated).unwrap_err();
    assert!(err.to_string().contains("truncated"));

    assert!(read_fcs(&dir.join("missing.fcs")).is_err());
}

#[test]
fn test_rejects_duplicate_channel_names() {
    let dir = make_temp_dir("fcs_dup");
    let path = dir.join("dup.fcs");
    write_fcs(&path, &["FSC-A", "FSC-A"], &[vec![1.0], vec![2.0]]);
    let err = read_fcs(&path).unwrap_err();
    assert!(err.to_string().contains("duplicate channel"));
}

#[test]
fn test_oversized_event_count_is_an_import_error() {
    let dir = make_temp_dir("fcs_tot");
    let columns = [vec![1.0, 2.0], vec![3.0, 4.0]];

    // 8 bytes per event times 2^61 events overflows usize.
    let overflow = dir.join("overflow.fcs");
    FcsWriter {
        extra: vec![("$TOT".to_string(), "2305843009213693952".to_string())],
        ..FcsWriter::default()
    }
    .write(&overflow, &["FSC-A", "SSC-A"], &columns);
    let err = read_fcs(&overflow).unwrap_err();
    assert!(matches!(err, PipelineError::DataImport { .. }));
    assert!(err.to_string().contains("overflows"));

    let huge = dir.join("huge.fcs");
    FcsWriter {
        extra: vec![("$TOT".to_string(), "1000000000000".to_string())],
        ..FcsWriter::default()
    }
    .write(&huge, &["FSC-A", "SSC-A"], &columns);
    let err = read_fcs(&huge).unwrap_err();
    assert!(matches!(err, PipelineError::DataImport { .. }));
    assert!(err.to_string().contains("truncated"));

    let meta = read_fcs_metadata(&huge).unwrap();
    assert_eq!(meta.n_events, 1_000_000_000_000);
}
