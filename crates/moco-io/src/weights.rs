use anyhow::{bail, Context, Result};
use moco_recon::temporal::TemporalWeights;
use std::fmt::Write as _;
use std::path::Path;

/// Read temporal interpolation weights: one row per projection, one column
/// per phase, separated by whitespace or commas.
pub fn read_weights_file<P: AsRef<Path>>(path: P) -> Result<TemporalWeights> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read temporal weights {}", path.display()))?;

    let mut rows: Vec<Vec<f32>> = Vec::new();
    for (line_no, line) in crate::data_lines(&text) {
        let row = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|field| !field.is_empty())
            .map(|field| {
                field
                    .parse::<f32>()
                    .with_context(|| format!("Invalid weight {:?} on line {}", field, line_no))
            })
            .collect::<Result<Vec<_>>>()?;
        if let Some(first) = rows.first() {
            if row.len() != first.len() {
                bail!(
                    "Line {} has {} weights, expected {} like the first row",
                    line_no,
                    row.len(),
                    first.len()
                );
            }
        }
        rows.push(row);
    }
    if rows.is_empty() {
        bail!("Temporal weights {} contain no rows", path.display());
    }
    tracing::info!(
        "Read {}x{} temporal weights from {}",
        rows.len(),
        rows[0].len(),
        path.display()
    );

    TemporalWeights::from_rows(&rows).context("Invalid temporal weights")
}

/// Write one whitespace-separated row per projection.
pub fn write_weights_file<P: AsRef<Path>>(path: P, weights: &TemporalWeights) -> Result<()> {
    let path = path.as_ref();
    let mut text = String::new();
    for row in weights.matrix().row_iter() {
        let fields: Vec<String> = row.iter().map(|w| w.to_string()).collect();
        writeln!(text, "{}", fields.join(" "))?;
    }
    std::fs::write(path, text).with_context(|| format!("Failed to write temporal weights {}", path.display()))
}
