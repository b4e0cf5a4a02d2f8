// AngleControlPanel
// Author: J Taylor
// Supplied without warranty.
// Use at your own risk.


// src/lib.rs
//
// Serial telemetry pipeline and command path for a single-axis angle
// controller. The iced front end lives in main.rs.

pub mod buffer;
pub mod chart;
pub mod command;
pub mod export;
pub mod ingest;
pub mod session;
pub mod settings;
pub mod telemetry;
pub mod transport;
