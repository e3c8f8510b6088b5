use crate::dense::Mat;
use pretty_dtoa::{dtoa, FmtFloatConfig};

const FLOAT_CONFIG: FmtFloatConfig = FmtFloatConfig::default()
    .add_point_zero(false)
    .max_significant_digits(9);

pub fn format_f64(f: f64) -> String {
    dtoa(f, FLOAT_CONFIG)
}

pub fn format_f64_vec(v: &[f64]) -> String {
    let a: Vec<String> = v.iter().map(|f| dtoa(*f, FLOAT_CONFIG)).collect();
    format!("[{}]", a.join(", "))
}

/// One bracketed row per line.
pub fn format_f64_mat(m: &Mat<f64>) -> String {
    let rows: Vec<String> = (0..m.rows()).map(|r| format_f64_vec(m.row(r))).collect();
    format!("[{}]", rows.join(",\n "))
}
