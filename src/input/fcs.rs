use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::ops::Deref;
use std::path::Path;

use flate2::read::GzDecoder;
use memmap2::Mmap;

use crate::error::{PipelineError, Result};

const HEADER_LEN: usize = 58;

#[derive(Debug, Clone, PartialEq)]
pub struct FcsChannel {
    /// `$PnN`, the short name used everywhere downstream.
    pub name: String,
    /// `$PnS`, free-text stain/marker label.
    pub label: Option<String>,
    pub bits: u32,
    pub range: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct FcsMetadata {
    pub version: String,
    pub keywords: BTreeMap<String, String>,
    pub channels: Vec<FcsChannel>,
    pub n_events: usize,
    pub datatype: DataType,
    pub byte_order: ByteOrder,
    data_start: usize,
    data_end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Float,
    Double,
    Integer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// A decoded list-mode FCS file. `columns[c][e]` is event `e` of channel `c`.
#[derive(Debug, Clone)]
pub struct FcsFile {
    pub meta: FcsMetadata,
    pub columns: Vec<Vec<f64>>,
}

impl FcsMetadata {
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    pub fn keyword(&self, key: &str) -> Option<&str> {
        self.keywords
            .get(&key.to_ascii_uppercase())
            .map(String::as_str)
    }
}

enum FcsBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for FcsBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FcsBytes::Mapped(m) => &m[..],
            FcsBytes::Owned(v) => v.as_slice(),
        }
    }
}

fn open_bytes(path: &Path) -> Result<FcsBytes> {
    let file = File::open(path)
        .map_err(|e| PipelineError::import(path, format!("cannot open: {e}")))?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        let mut decoder = GzDecoder::new(file);
        let mut buf = Vec::new();
        decoder
            .read_to_end(&mut buf)
            .map_err(|e| PipelineError::import(path, format!("gzip decode failed: {e}")))?;
        Ok(FcsBytes::Owned(buf))
    } else {
        let len = file.metadata()?.len();
        if len == 0 {
            return Err(PipelineError::import(path, "file is empty"));
        }
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(FcsBytes::Mapped(mmap))
    }
}

/// Reads HEADER and TEXT only.
pub fn read_fcs_metadata(path: &Path) -> Result<FcsMetadata> {
    let bytes = open_bytes(path)?;
    parse_metadata(&bytes).map_err(|msg| PipelineError::import(path, msg))
}

pub fn read_fcs(path: &Path) -> Result<FcsFile> {
    let bytes = open_bytes(path)?;
    let meta = parse_metadata(&bytes).map_err(|msg| PipelineError::import(path, msg))?;
    let columns = decode_events(&bytes, &meta).map_err(|msg| PipelineError::import(path, msg))?;
    Ok(FcsFile { meta, columns })
}

fn parse_metadata(bytes: &[u8]) -> std::result::Result<FcsMetadata, String> {
    if bytes.len() < HEADER_LEN {
        return Err("file too small for an FCS header".to_string());
    }
    let version = std::str::from_utf8(&bytes[0..6])
        .map_err(|_| "invalid FCS magic".to_string())?
        .to_string();
    if !matches!(version.as_str(), "FCS2.0" | "FCS3.0" | "FCS3.1") {
        return Err(format!("unsupported FCS version {:?}", version));
    }

    let text_start = header_offset(bytes, 10)?;
    let text_end = header_offset(bytes, 18)?;
    let header_data_start = header_offset(bytes, 26)?;
    let header_data_end = header_offset(bytes, 34)?;

    if text_start < HEADER_LEN || text_end <= text_start || text_end >= bytes.len() {
        return Err(format!(
            "TEXT segment offsets out of range: {}..={}",
            text_start, text_end
        ));
    }
    let keywords = parse_text_segment(&bytes[text_start..=text_end])?;

    let (data_start, data_end) = if header_data_start == 0 && header_data_end == 0 {
        (
            required_usize(&keywords, "$BEGINDATA")?,
            required_usize(&keywords, "$ENDDATA")?,
        )
    } else {
        (header_data_start, header_data_end)
    };

    if let Some(mode) = keywords.get("$MODE") {
        if !mode.eq_ignore_ascii_case("L") {
            return Err(format!("only list-mode data is supported, $MODE={}", mode));
        }
    }

    let datatype = match keywords.get("$DATATYPE").map(|s| s.to_ascii_uppercase()) {
        Some(t) if t == "F" => DataType::Float,
        Some(t) if t == "D" => DataType::Double,
        Some(t) if t == "I" => DataType::Integer,
        Some(t) => return Err(format!("unsupported $DATATYPE {}", t)),
        None => return Err("missing $DATATYPE".to_string()),
    };

    let byte_order = match keywords.get("$BYTEORD") {
        Some(order) if order.trim().starts_with('1') => ByteOrder::Little,
        Some(_) => ByteOrder::Big,
        None => return Err("missing $BYTEORD".to_string()),
    };

    let n_par = required_usize(&keywords, "$PAR")?;
    let n_events = required_usize(&keywords, "$TOT")?;
    if n_par == 0 {
        return Err("$PAR is zero".to_string());
    }

    let mut channels = Vec::with_capacity(n_par);
    for p in 1..=n_par {
        let name = keywords
            .get(&format!("$P{}N", p))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("missing $P{}N", p))?;
        if channels.iter().any(|c: &FcsChannel| c.name == name) {
            return Err(format!("duplicate channel name {}", name));
        }
        let bits = keywords
            .get(&format!("$P{}B", p))
            .and_then(|s| s.trim().parse::<u32>().ok())
            .ok_or_else(|| format!("missing or invalid $P{}B", p))?;
        let expected_bits = match datatype {
            DataType::Float => Some(32),
            DataType::Double => Some(64),
            DataType::Integer => None,
        };
        if let Some(expected) = expected_bits {
            if bits != expected {
                return Err(format!(
                    "$P{}B={} does not match $DATATYPE width {}",
                    p, bits, expected
                ));
            }
        } else if !matches!(bits, 8 | 16 | 32 | 64) {
            return Err(format!("unsupported integer width $P{}B={}", p, bits));
        }
        let range = keywords
            .get(&format!("$P{}R", p))
            .and_then(|s| s.trim().parse::<f64>().ok());
        let label = keywords
            .get(&format!("$P{}S", p))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        channels.push(FcsChannel {
            name,
            label,
            bits,
            range,
        });
    }

    Ok(FcsMetadata {
        version,
        keywords,
        channels,
        n_events,
        datatype,
        byte_order,
        data_start,
        data_end,
    })
}

fn header_offset(bytes: &[u8], at: usize) -> std::result::Result<usize, String> {
    let field = std::str::from_utf8(&bytes[at..at + 8])
        .map_err(|_| format!("non-ASCII header field at byte {}", at))?
        .trim();
    if field.is_empty() {
        return Ok(0);
    }
    field
        .parse::<usize>()
        .map_err(|_| format!("invalid header offset {:?} at byte {}", field, at))
}

fn required_usize(
    keywords: &BTreeMap<String, String>,
    key: &str,
) -> std::result::Result<usize, String> {
    keywords
        .get(key)
        .and_then(|s| s.trim().parse::<usize>().ok())
        .ok_or_else(|| format!("missing or invalid {}", key))
}

/// Splits a TEXT segment into keyword/value pairs. A doubled delimiter is a
/// literal delimiter character. Keys are upper-cased.
pub fn parse_text_segment(text: &[u8]) -> std::result::Result<BTreeMap<String, String>, String> {
    let Some((&delim, body)) = text.split_first() else {
        return Err("TEXT segment is empty".to_string());
    };

    let mut tokens: Vec<String> = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    let mut i = 0usize;
    while i < body.len() {
        let b = body[i];
        if b == delim {
            if body.get(i + 1) == Some(&delim) {
                current.push(delim);
                i += 2;
                continue;
            }
            tokens.push(String::from_utf8_lossy(&current).into_owned());
            current.clear();
        } else {
            current.push(b);
        }
        i += 1;
    }
    if !current.is_empty() {
        tokens.push(String::from_utf8_lossy(&current).into_owned());
    }

    if tokens.len() % 2 != 0 {
        tracing::warn!(
            tokens = tokens.len(),
            "TEXT segment has an unpaired trailing keyword; ignoring it"
        );
        tokens.pop();
    }

    let mut keywords = BTreeMap::new();
    for pair in tokens.chunks_exact(2) {
        keywords.insert(pair[0].trim().to_ascii_uppercase(), pair[1].clone());
    }
    Ok(keywords)
}

fn decode_events(bytes: &[u8], meta: &FcsMetadata) -> std::result::Result<Vec<Vec<f64>>, String> {
    let n_par = meta.channels.len();
    if meta.n_events == 0 {
        return Ok(vec![Vec::new(); n_par]);
    }

    let event_bytes: usize = meta.channels.iter().map(|c| c.bits as usize / 8).sum();
    let needed = event_bytes.checked_mul(meta.n_events).ok_or_else(|| {
        format!("$TOT={} overflows the DATA segment size", meta.n_events)
    })?;
    if meta.data_end < meta.data_start || meta.data_start >= bytes.len() {
        return Err(format!(
            "DATA segment offsets out of range: {}..={}",
            meta.data_start, meta.data_end
        ));
    }
    let available = bytes.len() - meta.data_start;
    if available < needed {
        return Err(format!(
            "DATA segment truncated: need {} bytes for {} events, found {}",
            needed, meta.n_events, available
        ));
    }
    // Only sized after the file is known to hold every event.
    let mut columns = vec![Vec::with_capacity(meta.n_events); n_par];
    let data = &bytes[meta.data_start..meta.data_start + needed];

    let masks: Vec<Option<u64>> = meta
        .channels
        .iter()
        .map(|c| integer_mask(c.range))
        .collect();

    let mut offset = 0usize;
    for _ in 0..meta.n_events {
        for (p, channel) in meta.channels.iter().enumerate() {
            let width = channel.bits as usize / 8;
            let raw = &data[offset..offset + width];
            offset += width;
            let value = match meta.datatype {
                DataType::Float => f32::from_bits(read_uint(raw, meta.byte_order) as u32) as f64,
                DataType::Double => f64::from_bits(read_uint(raw, meta.byte_order)),
                DataType::Integer => {
                    let mut v = read_uint(raw, meta.byte_order);
                    if let Some(mask) = masks[p] {
                        v &= mask;
                    }
                    v as f64
                }
            };
            columns[p].push(value);
        }
    }
    Ok(columns)
}

fn read_uint(raw: &[u8], order: ByteOrder) -> u64 {
    let mut v = 0u64;
    match order {
        ByteOrder::Little => {
            for &b in raw.iter().rev() {
                v = (v << 8) | b as u64;
            }
        }
        ByteOrder::Big => {
            for &b in raw {
                v = (v << 8) | b as u64;
            }
        }
    }
    v
}

// $PnR that is an exact power of two masks off unused high bits.
fn integer_mask(range: Option<f64>) -> Option<u64> {
    let range = range?;
    if !(range >= 1.0 && range <= u64::MAX as f64) || range.fract() != 0.0 {
        return None;
    }
    let r = range as u64;
    if r.is_power_of_two() { Some(r - 1) } else { None }
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/fcs.rs"]
mod tests;
