use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{AutofluorescenceSpec, BleedthroughSpec, RunParams, TubeSpec};
use crate::pipeline::StageEnv;
use crate::render::PlotContext;

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub fn make_temp_dir(tag: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let id = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("cytoflow_{}_{}_{}", tag, std::process::id(), id));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, bytes).unwrap();
}

/// Encoding of the DATA segment written by [`FcsWriter`].
#[derive(Debug, Clone, Copy)]
pub enum Encoding {
    F32Little,
    F64Big,
    /// Unsigned integers of the given width, little endian, with `$PnR`.
    UInt(u32, u64),
}

pub struct FcsWriter {
    pub version: &'static str,
    pub encoding: Encoding,
    pub delimiter: u8,
    pub extra: Vec<(String, String)>,
    /// Write zero header data offsets and rely on `$BEGINDATA`/`$ENDDATA`.
    pub data_offsets_in_text: bool,
}

impl Default for FcsWriter {
    fn default() -> Self {
        Self {
            version: "FCS3.1",
            encoding: Encoding::F32Little,
            delimiter: b'|',
            extra: Vec::new(),
            data_offsets_in_text: false,
        }
    }
}

impl FcsWriter {
    pub fn encode(&self, channels: &[&str], columns: &[Vec<f64>]) -> Vec<u8> {
        assert_eq!(channels.len(), columns.len());
        let n_events = columns.first().map(|c| c.len()).unwrap_or(0);

        let mut data = Vec::new();
        for e in 0..n_events {
            for col in columns {
                let v = col[e];
                match self.encoding {
                    Encoding::F32Little => data.extend_from_slice(&(v as f32).to_le_bytes()),
                    Encoding::F64Big => data.extend_from_slice(&v.to_be_bytes()),
                    Encoding::UInt(bits, _) => {
                        let raw = v as u64;
                        let bytes = raw.to_le_bytes();
                        data.extend_from_slice(&bytes[..bits as usize / 8]);
                    }
                }
            }
        }

        let (datatype, byteord, bits, range) = match self.encoding {
            Encoding::F32Little => ("F", "1,2,3,4", 32, 262_144u64),
            Encoding::F64Big => ("D", "4,3,2,1", 64, 262_144u64),
            Encoding::UInt(bits, range) => ("I", "1,2,3,4", bits, range),
        };

        let mut pairs: Vec<(String, String)> = vec![
            ("$BYTEORD".into(), byteord.into()),
            ("$DATATYPE".into(), datatype.into()),
            ("$MODE".into(), "L".into()),
            ("$NEXTDATA".into(), "0".into()),
            ("$PAR".into(), channels.len().to_string()),
            ("$TOT".into(), n_events.to_string()),
        ];
        for (i, name) in channels.iter().enumerate() {
            let p = i + 1;
            pairs.push((format!("$P{}N", p), name.to_string()));
            pairs.push((format!("$P{}B", p), bits.to_string()));
            pairs.push((format!("$P{}E", p), "0,0".into()));
            pairs.push((format!("$P{}R", p), range.to_string()));
        }
        pairs.extend(self.extra.iter().cloned());

        let text_start = 58usize;
        let render = |pairs: &[(String, String)]| {
            let d = self.delimiter as char;
            let doubled = format!("{d}{d}");
            let mut text = String::new();
            text.push(d);
            for (k, v) in pairs {
                text.push_str(&k.replace(d, &doubled));
                text.push(d);
                text.push_str(&v.replace(d, &doubled));
                text.push(d);
            }
            text.into_bytes()
        };

        let text = if self.data_offsets_in_text {
            // Offsets are padded to a fixed width so the TEXT length does not
            // depend on their values.
            let mut with_offsets = pairs.clone();
            with_offsets.push(("$BEGINDATA".into(), format!("{:010}", 0)));
            with_offsets.push(("$ENDDATA".into(), format!("{:010}", 0)));
            let len = render(&with_offsets).len();
            let data_start = text_start + len;
            let data_end = (data_start + data.len()).saturating_sub(1);
            let n = with_offsets.len();
            with_offsets[n - 2].1 = format!("{:010}", data_start);
            with_offsets[n - 1].1 = format!("{:010}", data_end);
            render(&with_offsets)
        } else {
            render(&pairs)
        };

        let text_end = text_start + text.len() - 1;
        let data_start = text_end + 1;
        let data_end = if data.is_empty() { data_start } else { data_start + data.len() - 1 };
        let (hs, he) = if self.data_offsets_in_text {
            (0, 0)
        } else {
            (data_start, data_end)
        };

        let mut out = Vec::new();
        out.extend_from_slice(self.version.as_bytes());
        out.extend_from_slice(b"    ");
        for offset in [text_start, text_end, hs, he, 0, 0] {
            out.extend_from_slice(format!("{:>8}", offset).as_bytes());
        }
        assert_eq!(out.len(), 58);
        out.extend_from_slice(&text);
        out.extend_from_slice(&data);
        if data.is_empty() {
            out.push(b' ');
        }
        out
    }

    pub fn write(&self, path: &Path, channels: &[&str], columns: &[Vec<f64>]) {
        write_file(path, &self.encode(channels, columns));
    }
}

pub fn write_fcs(path: &Path, channels: &[&str], columns: &[Vec<f64>]) {
    FcsWriter::default().write(path, channels, columns);
}

pub const CHANNELS: [&str; 5] = ["FSC-A", "SSC-A", "FITC-A", "PE-Tx-Red-YG-A", "Pacific Blue-A"];

fn normal(rng: &mut StdRng, mean: f64, sd: f64) -> f64 {
    let u1: f64 = rng.random_range(f64::EPSILON..1.0);
    let u2: f64 = rng.random();
    mean + sd * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Synthetic cytometry tube: 80% cells (large FSC, SSC around 10^4), 20%
/// debris (small FSC, SSC around 10^2.5). Fluorescence is lognormal with the
/// given median per fluorescence channel.
pub fn synthetic_tube(n: usize, seed: u64, fluor_medians: [f64; 3]) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut columns = vec![Vec::with_capacity(n); CHANNELS.len()];
    for i in 0..n {
        let cell = i % 5 != 0;
        let (fsc, log_ssc) = if cell {
            (normal(&mut rng, 80_000.0, 8_000.0), normal(&mut rng, 4.0, 0.1))
        } else {
            (normal(&mut rng, 15_000.0, 3_000.0), normal(&mut rng, 2.5, 0.15))
        };
        columns[0].push(fsc);
        columns[1].push(10f64.powf(log_ssc));
        for (c, median) in fluor_medians.iter().enumerate() {
            let v = median * normal(&mut rng, 0.0, 0.3).exp();
            columns[2 + c].push(v);
        }
    }
    columns
}

pub fn write_synthetic_tube(path: &Path, n: usize, seed: u64, fluor_medians: [f64; 3]) {
    write_fcs(path, &CHANNELS, &synthetic_tube(n, seed, fluor_medians));
}

/// Two-tube "Dox" experiment with no optional stages configured.
pub fn two_tube_params(dir: &Path) -> RunParams {
    let low = dir.join("dox_0.fcs");
    let high = dir.join("dox_1.fcs");
    write_synthetic_tube(&low, 400, 11, [200.0, 150.0, 100.0]);
    write_synthetic_tube(&high, 400, 12, [2_000.0, 600.0, 100.0]);
    RunParams {
        experiment_name: "dox".to_string(),
        tubes: vec![
            TubeSpec {
                file: low,
                condition_value: "0.0".to_string(),
            },
            TubeSpec {
                file: high,
                condition_value: "1.0".to_string(),
            },
        ],
        condition_name: "Dox".to_string(),
        autofluorescence: None,
        bleedthrough: None,
        threshold_gate: None,
        quad_gate: None,
        output_to_registry: None,
        output_directory: dir.join("out"),
        marker_size: 0.5,
        marker_alpha: 0.7,
        seed: 0,
        morphology_channels: ["FSC-A".to_string(), "SSC-A".to_string()],
        population_sigma: 2.0,
        dpi: 40,
        font: None,
    }
}

/// Adds a blank control and FITC/PE single-colour controls to `params`.
pub fn add_controls(params: &mut RunParams, dir: &Path) {
    let blank = dir.join("blank.fcs");
    let fitc = dir.join("fitc_control.fcs");
    let pe = dir.join("pe_control.fcs");
    write_synthetic_tube(&blank, 300, 31, [50.0, 50.0, 50.0]);
    write_synthetic_tube(&fitc, 300, 32, [5_000.0, 450.0, 50.0]);
    write_synthetic_tube(&pe, 300, 33, [80.0, 3_000.0, 50.0]);
    params.autofluorescence = Some(AutofluorescenceSpec {
        blank_file: blank,
        channels: vec!["FITC-A".to_string(), "PE-Tx-Red-YG-A".to_string()],
    });
    params.bleedthrough = Some(vec![
        BleedthroughSpec {
            channel: "FITC-A".to_string(),
            control_file: fitc,
        },
        BleedthroughSpec {
            channel: "PE-Tx-Red-YG-A".to_string(),
            control_file: pe,
        },
    ]);
}

/// Stage environment writing under the experiment directory of `params`,
/// without text so no font is needed.
pub fn stage_env(params: &RunParams) -> StageEnv {
    StageEnv {
        plot: PlotContext::textless(params.dpi, params.marker_size, params.marker_alpha),
        out_dir: params.experiment_dir(),
    }
}

pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let header = reader
        .headers()
        .unwrap()
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    (header, rows)
}
