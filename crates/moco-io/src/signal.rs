use anyhow::{bail, Context, Result};
use moco_recon::temporal::PhaseSignal;
use std::fmt::Write as _;
use std::path::Path;

/// Read a respiratory phase signal: one value per projection, in cycle units.
///
/// Values outside `[0, 1)` are kept as read; they are wrapped when used.
pub fn read_signal_file<P: AsRef<Path>>(path: P) -> Result<PhaseSignal> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read phase signal {}", path.display()))?;

    let mut values = Vec::new();
    for (line_no, line) in crate::data_lines(&text) {
        let value: f64 = line
            .parse()
            .with_context(|| format!("Invalid phase value {:?} on line {}", line, line_no))?;
        values.push(value);
    }
    if values.is_empty() {
        bail!("Phase signal {} contains no values", path.display());
    }
    tracing::info!("Read {} phase values from {}", values.len(), path.display());

    PhaseSignal::new(values).context("Invalid phase signal")
}

/// Write one phase value per line.
pub fn write_signal_file<P: AsRef<Path>>(path: P, signal: &PhaseSignal) -> Result<()> {
    let path = path.as_ref();
    let mut text = String::new();
    for value in signal.values() {
        writeln!(text, "{}", value)?;
    }
    std::fs::write(path, text).with_context(|| format!("Failed to write phase signal {}", path.display()))
}
