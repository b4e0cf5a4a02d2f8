// AngleControlPanel
// Author: J Taylor
// Supplied without warranty.
// Use at your own risk.


// src/chart.rs
//
// Strip chart of the buffered angle. The same drawing code feeds the live
// iced widget and the PNG snapshot.

use plotters::prelude::*;
use plotters::style::ShapeStyle;
use plotters_iced::Chart;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::buffer::Sample;

/// X span used until there are two samples to measure.
pub const DEFAULT_WINDOW_SECS: f64 = 10.0;
pub const FULL_TURN: (f64, f64) = (0.0, 360.0);
/// Largest axis bound or margin accepted from the settings file.
pub const AXIS_LIMIT: f64 = 1.0e6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AxisPolicy {
    Fixed { min: f64, max: f64 },
    AutoFit { margin: f64 },
}

impl Default for AxisPolicy {
    fn default() -> Self {
        AxisPolicy::AutoFit { margin: 10.0 }
    }
}

impl AxisPolicy {
    pub const CHOICES: [AxisPolicy; 2] = [
        AxisPolicy::Fixed {
            min: FULL_TURN.0,
            max: FULL_TURN.1,
        },
        AxisPolicy::AutoFit { margin: 10.0 },
    ];

    /// The policy itself if its numbers are usable. A bad fixed range becomes
    /// 0 to 360, a bad margin becomes the default auto-fit.
    pub fn sanitized(self) -> Self {
        let sane = |v: f64| v.is_finite() && v.abs() <= AXIS_LIMIT;
        match self {
            AxisPolicy::Fixed { min, max } if sane(min) && sane(max) && max > min => self,
            AxisPolicy::Fixed { .. } => AxisPolicy::Fixed {
                min: FULL_TURN.0,
                max: FULL_TURN.1,
            },
            AxisPolicy::AutoFit { margin } if sane(margin) && margin >= 0.0 => self,
            AxisPolicy::AutoFit { .. } => AxisPolicy::default(),
        }
    }
}

impl std::fmt::Display for AxisPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AxisPolicy::Fixed { min, max } => write!(f, "Fixed {} to {}", min, max),
            AxisPolicy::AutoFit { margin } => write!(f, "Auto (±{})", margin),
        }
    }
}

pub fn x_bounds(samples: &[Sample]) -> (f64, f64) {
    match (samples.first(), samples.last()) {
        (Some(first), Some(last)) if samples.len() >= 2 => {
            let span = (last.timestamp - first.timestamp).max(1.0);
            (first.timestamp, first.timestamp + span)
        }
        (Some(only), _) => (only.timestamp, only.timestamp + DEFAULT_WINDOW_SECS),
        _ => (0.0, DEFAULT_WINDOW_SECS),
    }
}

pub fn y_bounds(policy: AxisPolicy, samples: &[Sample]) -> (f64, f64) {
    match policy.sanitized() {
        AxisPolicy::Fixed { min, max } => (min, max),
        AxisPolicy::AutoFit { margin } => {
            if samples.is_empty() {
                return FULL_TURN;
            }
            let lo = samples.iter().map(|s| s.value).fold(f64::INFINITY, f64::min);
            let hi = samples.iter().map(|s| s.value).fold(f64::NEG_INFINITY, f64::max);
            let margin = margin.max(0.5);
            let (lo, hi) = (lo - margin, hi + margin);
            // readings near f64::MAX would overflow the span
            if (hi - lo).is_finite() {
                (lo, hi)
            } else {
                FULL_TURN
            }
        }
    }
}

// ---------------- Chart ----------------

pub struct AngleChart<'a> {
    pub samples: &'a [Sample],
    pub axis: AxisPolicy,
    /// Last target sent to the board, drawn as a reference line.
    pub target: Option<f64>,
}

impl<'a> AngleChart<'a> {
    pub fn new(samples: &'a [Sample], axis: AxisPolicy, target: Option<f64>) -> Self {
        Self {
            samples,
            axis,
            target,
        }
    }

    pub fn draw<DB: DrawingBackend>(&self, mut builder: ChartBuilder<'_, '_, DB>) -> Result<(), String> {
        let (x0, x1) = x_bounds(self.samples);
        let (y0, y1) = y_bounds(self.axis, self.samples);

        let mut chart = builder
            .caption("Angle (live)", ("sans-serif", 20))
            .margin(10)
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(x0..x1, y0..y1)
            .map_err(|e| e.to_string())?;

        chart
            .configure_mesh()
            .x_desc("Time (s)")
            .y_desc("Angle (°)")
            .axis_desc_style(("sans-serif", 15))
            .draw()
            .map_err(|e| e.to_string())?;

        if !self.samples.is_empty() {
            chart
                .draw_series(LineSeries::new(
                    self.samples.iter().map(|s| (s.timestamp, s.value)),
                    ShapeStyle::from(&BLUE).stroke_width(2),
                ))
                .map_err(|e| e.to_string())?;
        }

        if let Some(target) = self.target {
            let thin_red = ShapeStyle::from(&RED).stroke_width(1);
            chart
                .draw_series(LineSeries::new(vec![(x0, target), (x1, target)], thin_red))
                .map_err(|e| e.to_string())?;
        }

        Ok(())
    }

    pub fn save_png(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let root = BitMapBackend::new(path, (800, 400)).into_drawing_area();
        root.fill(&WHITE)?;
        self.draw(ChartBuilder::on(&root))?;
        root.present()?;
        Ok(())
    }
}

impl<Message> Chart<Message> for AngleChart<'_> {
    type State = ();

    fn build_chart<DB: DrawingBackend>(
        &self,
        _state: &Self::State,
        builder: plotters_iced::ChartBuilder<DB>,
    ) {
        if let Err(e) = self.draw(builder) {
            log::warn!("Chart draw failed: {}", e);
        }
    }
}
