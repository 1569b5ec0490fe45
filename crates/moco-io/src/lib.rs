//! Text readers for the per-projection inputs of the 4D drivers.
//!
//! Both formats are plain text with one projection per line. Blank lines
//! and lines starting with `#` are ignored.

pub mod signal;
pub mod weights;

pub use signal::{read_signal_file, write_signal_file};
pub use weights::{read_weights_file, write_weights_file};

/// Non-empty, non-comment lines with their 1-based line numbers.
pub(crate) fn data_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}
