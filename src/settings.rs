// AngleControlPanel
// Author: J Taylor
// Supplied without warranty.
// Use at your own risk.


// src/settings.rs
//
// Settings file: <Documents>/AngleControlPanel/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chart::AxisPolicy;
use crate::command::{AnglePolicy, LineEnding, LoopMode, PidGains};
use crate::ingest::IngestMode;
use crate::session::Handshake;

pub const MIN_CAPACITY: usize = 1;
pub const MAX_CAPACITY: usize = 10_000;
pub const MIN_RENDER_INTERVAL_MS: u64 = 15;
pub const MAX_RENDER_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub port_name: String,
    pub buffer_capacity: usize,
    pub render_interval_ms: u64,
    pub ingest_mode: IngestMode,
    pub angle_policy: AnglePolicy,
    pub axis_policy: AxisPolicy,
    pub line_ending: LineEnding,
    pub loop_mode: LoopMode,
    pub gains: PidGains,
    /// Sent once after connecting, e.g. "1\n" to start streaming.
    pub start_command: Option<String>,
    pub start_delay_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            buffer_capacity: 100,
            render_interval_ms: 100,
            ingest_mode: IngestMode::Background,
            angle_policy: AnglePolicy::FullTurn,
            axis_policy: AxisPolicy::default(),
            line_ending: LineEnding::Newline,
            loop_mode: LoopMode::Open,
            gains: PidGains::default(),
            start_command: None,
            start_delay_ms: 2000,
        }
    }
}

impl AppSettings {
    /// Folder for settings, plots and exports: Documents, then Desktop,
    /// then the current directory.
    pub fn app_dir() -> PathBuf {
        let base = dirs::document_dir()
            .or_else(dirs::desktop_dir)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        base.join("AngleControlPanel")
    }

    pub fn default_path() -> PathBuf {
        Self::app_dir().join("settings.json")
    }

    /// Missing file means defaults.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let mut s = String::new();
        fs::File::open(path)?.read_to_string(&mut s)?;
        let cfg: AppSettings = serde_json::from_str(&s)?;
        Ok(cfg.normalized())
    }

    /// Write through a temp file so a crash never leaves half a file behind.
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(self)?;

        fs::write(&tmp, json.as_bytes())?;
        if path.exists() {
            let _ = fs::remove_file(path);
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn normalized(mut self) -> Self {
        self.buffer_capacity = self.buffer_capacity.clamp(MIN_CAPACITY, MAX_CAPACITY);
        self.render_interval_ms = self
            .render_interval_ms
            .clamp(MIN_RENDER_INTERVAL_MS, MAX_RENDER_INTERVAL_MS);
        if !self.gains.kp.is_finite() || !self.gains.ki.is_finite() || !self.gains.kd.is_finite() {
            self.gains = PidGains::default();
        }
        let axis = self.axis_policy.sanitized();
        if axis != self.axis_policy {
            log::warn!("Ignoring unusable axis policy {:?}", self.axis_policy);
            self.axis_policy = axis;
        }
        self
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }

    pub fn handshake(&self) -> Option<Handshake> {
        self.start_command
            .as_ref()
            .filter(|c| !c.is_empty())
            .map(|c| Handshake {
                payload: c.as_bytes().to_vec(),
                delay: Duration::from_millis(self.start_delay_ms),
            })
    }
}
