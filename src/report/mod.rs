pub mod summary;
pub mod tables;

/// Shortest decimal form that parses back to the same `f64`.
pub fn format_value(v: f64) -> String {
    if v.is_finite() {
        format!("{}", v)
    } else if v.is_nan() {
        "NaN".to_string()
    } else if v > 0.0 {
        "inf".to_string()
    } else {
        "-inf".to_string()
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/report/mod.rs"]
mod tests;
