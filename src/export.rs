// AngleControlPanel
// Author: J Taylor
// Supplied without warranty.
// Use at your own risk.


// src/export.rs
//
// CSV export of the buffered samples and file naming for plot snapshots.

use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::buffer::Sample;

pub const CSV_HEADER: &str = "Time (s),Angle (deg)";

pub fn write_csv<W: Write>(out: &mut W, samples: &[Sample]) -> io::Result<()> {
    writeln!(out, "{}", CSV_HEADER)?;
    for s in samples {
        writeln!(out, "{:.3},{}", s.timestamp, s.value)?;
    }
    out.flush()
}

pub fn export_csv(path: &Path, samples: &[Sample]) -> io::Result<()> {
    let mut out = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    write_csv(&mut out, samples)?;
    log::info!("CSV exported to {} ({} samples)", path.display(), samples.len());
    Ok(())
}

/// `<dir>/<stem>_<YYYYmmdd_HHMMSS>.<ext>`, creating `dir` if needed.
pub fn timestamped_path(dir: &Path, stem: &str, ext: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    Ok(dir.join(format!("{}_{}.{}", stem, timestamp, ext)))
}
