// AngleControlPanel
// Author: J Taylor
// Supplied without warranty.
// Use at your own risk.


// src/main.rs
//
// Control panel UI for a single-axis angle controller on a serial port:
// pick a port, connect, send a target angle (optionally with PID gains)
// and watch the reported angle on a live strip chart.
//
// Logging: env_logger, RUST_LOG overrides the default "info" filter.

use std::error::Error;
use std::time::Duration;

use iced::time;
use iced::widget::{button, column, pick_list, row, text, text_input};
use iced::window;
use iced::{Alignment, Color, Element, Length, Size, Subscription, Task};

use plotters_iced::ChartWidget;
use rfd::FileDialog;

use angle_control_panel::buffer::Sample;
use angle_control_panel::chart::{AngleChart, AxisPolicy};
use angle_control_panel::command::{AnglePolicy, CommandError, LineEnding, LoopMode, PidGains};
use angle_control_panel::export;
use angle_control_panel::ingest::{IngestEvent, IngestMode};
use angle_control_panel::session::{ConnectionState, SendError, Session};
use angle_control_panel::settings::AppSettings;
use angle_control_panel::transport::{self, PortEntry, SerialTransport, Transport};

// ---------------- UI Messages ----------------

#[derive(Debug, Clone)]
enum Message {
    Connect,
    Disconnect,
    Send,
    ResetGains,
    SavePlot,
    ClearPlot,
    ExportCsv,
    Quit,
    RefreshPorts,
    PortSelected(PortEntry),
    AngleChanged(String),
    KpChanged(String),
    KiChanged(String),
    KdChanged(String),
    LoopModeSelected(LoopMode),
    AnglePolicySelected(AnglePolicy),
    AxisPolicySelected(AxisPolicy),
    LineEndingSelected(LineEnding),
    IngestModeSelected(IngestMode),
    Tick,
    CloseRequested(window::Id),
}

// ---------------- App ----------------

struct ControlPanelApp {
    settings: AppSettings,
    session: Session,

    // available COM ports
    available_ports: Vec<PortEntry>,
    selected_port: Option<PortEntry>,

    // command inputs
    angle_input: String,
    kp_input: String,
    ki_input: String,
    kd_input: String,
    angle_invalid: bool,
    target: Option<f64>,

    // last snapshot taken on Tick; the chart draws from this
    frame: Vec<Sample>,

    last_rejected: Option<String>,

    // last error (user visible)
    error: Option<String>,
}

impl Default for ControlPanelApp {
    fn default() -> Self {
        let settings = match AppSettings::load(&AppSettings::default_path()) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Settings load: {e}");
                AppSettings::default()
            }
        };

        let session = Session::new(settings.buffer_capacity, settings.ingest_mode);
        let gains = settings.gains;

        let mut app = Self {
            settings,
            session,

            available_ports: Vec::new(),
            selected_port: None,

            angle_input: String::new(),
            kp_input: gains.kp.to_string(),
            ki_input: gains.ki.to_string(),
            kd_input: gains.kd.to_string(),
            angle_invalid: false,
            target: None,

            frame: Vec::new(),
            last_rejected: None,

            error: None,
        };

        app.refresh_ports();
        app
    }
}

impl ControlPanelApp {
    fn title(&self) -> String {
        "Position Control".to_string()
    }

    fn save_settings(&self) {
        if let Err(e) = self.settings.save(&AppSettings::default_path()) {
            log::warn!("Settings save: {e}");
        }
    }

    fn refresh_ports(&mut self) {
        self.available_ports = transport::scan_ports();
        self.selected_port = self
            .available_ports
            .iter()
            .find(|p| p.port_name.eq_ignore_ascii_case(&self.settings.port_name))
            .cloned();
    }

    fn controls_locked(&self) -> bool {
        self.session.state() != ConnectionState::Disconnected
    }

    fn connect(&mut self) {
        let Some(port) = self.selected_port.clone() else {
            self.error = Some("Select a port first.".to_string());
            return;
        };

        self.session.set_mode(self.settings.ingest_mode);

        let name = port.port_name.clone();
        let opener = move || -> Result<Box<dyn Transport>, Box<dyn Error>> {
            Ok(Box::new(SerialTransport::open(&name)?))
        };

        match self.session.connect_with(opener, self.settings.handshake()) {
            Ok(()) => {
                self.settings.port_name = port.port_name;
                self.save_settings();
            }
            Err(e) => self.error = Some(format!("Open port failed: {e}")),
        }
    }

    fn send_target(&mut self) {
        let res = self.session.send_input(
            &self.angle_input,
            [self.kp_input.as_str(), self.ki_input.as_str(), self.kd_input.as_str()],
            self.settings.angle_policy,
            self.settings.loop_mode,
            self.settings.line_ending,
        );

        self.angle_invalid = false;
        match res {
            Ok(command) => {
                self.target = Some(command.angle);
                self.error = None;
                if let Some(g) = command.gains {
                    self.settings.gains = g;
                    self.save_settings();
                }
            }
            Err(SendError::Invalid(e @ CommandError::BadGain { .. })) => {
                self.error = Some(e.to_string());
            }
            Err(SendError::Invalid(e)) => {
                log::warn!("{e}");
                self.angle_invalid = true;
            }
            Err(e) => self.error = Some(e.to_string()),
        }
    }

    fn reset_gains(&mut self) {
        let g = PidGains::default();
        self.kp_input = g.kp.to_string();
        self.ki_input = g.ki.to_string();
        self.kd_input = g.kd.to_string();
        self.settings.gains = g;
        self.save_settings();
    }

    fn save_plot(&self) -> Result<(), Box<dyn Error>> {
        let path = export::timestamped_path(&AppSettings::app_dir(), "angle_plot", "png")?;
        AngleChart::new(&self.frame, self.settings.axis_policy, self.target).save_png(&path)?;
        log::info!("Plot saved to {}", path.display());
        Ok(())
    }

    fn export_csv(&self) -> Result<(), Box<dyn Error>> {
        let dir = AppSettings::app_dir();
        std::fs::create_dir_all(&dir)?;

        if let Some(path) = FileDialog::new()
            .add_filter("CSV", &["csv"])
            .set_directory(&dir)
            .save_file()
        {
            export::export_csv(&path, &self.session.snapshot())?;
        }
        Ok(())
    }

    fn process_ingest_event(&mut self, event: IngestEvent) {
        match event {
            IngestEvent::Rejected { line, reason } => {
                self.last_rejected = Some(format!("{line:?} ({reason})"));
            }
            IngestEvent::Failed(msg) => {
                self.error = Some(format!("{msg}. Disconnected."));
            }
        }
    }

    fn shutdown(&mut self) -> Task<Message> {
        self.save_settings();
        self.session.disconnect();
        iced::exit()
    }

    fn make_status_banner(&self) -> (String, Color) {
        let gray = Color::from_rgb8(120, 120, 120);
        let green = Color::from_rgb8(0, 150, 0);
        let amber = Color::from_rgb8(200, 120, 0);

        match self.session.state() {
            ConnectionState::Disconnected => ("DISCONNECTED".to_string(), gray),
            ConnectionState::Connecting => ("CONNECTING".to_string(), amber),
            ConnectionState::Connected if self.frame.is_empty() => ("NO DATA".to_string(), amber),
            ConnectionState::Connected => ("CONNECTED".to_string(), green),
        }
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::RefreshPorts => self.refresh_ports(),

            Message::PortSelected(p) => {
                if self.controls_locked() {
                    return Task::none();
                }
                self.settings.port_name = p.port_name.clone();
                self.selected_port = Some(p);
                self.save_settings();
            }

            Message::Connect => {
                self.error = None;
                self.connect();
            }

            Message::Disconnect => {
                self.session.disconnect();
                self.save_settings();
            }

            Message::Send => self.send_target(),

            Message::ResetGains => self.reset_gains(),

            Message::SavePlot => {
                if let Err(e) = self.save_plot() {
                    self.error = Some(format!("Save plot failed: {e}"));
                }
            }

            Message::ClearPlot => {
                self.session.buffer().clear();
                self.frame.clear();
                self.last_rejected = None;
            }

            Message::ExportCsv => {
                if let Err(e) = self.export_csv() {
                    self.error = Some(format!("CSV export failed: {e}"));
                }
            }

            Message::Quit => return self.shutdown(),

            Message::CloseRequested(_) => return self.shutdown(),

            Message::AngleChanged(v) => self.angle_input = v,
            Message::KpChanged(v) => self.kp_input = v,
            Message::KiChanged(v) => self.ki_input = v,
            Message::KdChanged(v) => self.kd_input = v,

            Message::LoopModeSelected(v) => {
                self.settings.loop_mode = v;
                self.save_settings();
            }

            Message::AnglePolicySelected(v) => {
                self.settings.angle_policy = v;
                self.save_settings();
            }

            Message::AxisPolicySelected(v) => {
                self.settings.axis_policy = v;
                self.save_settings();
            }

            Message::LineEndingSelected(v) => {
                self.settings.line_ending = v;
                self.save_settings();
            }

            Message::IngestModeSelected(v) => {
                if self.controls_locked() {
                    return Task::none();
                }
                self.settings.ingest_mode = v;
                self.save_settings();
            }

            Message::Tick => {
                for event in self.session.tick() {
                    self.process_ingest_event(event);
                }
                self.frame = self.session.snapshot();
            }
        }

        Task::none()
    }

    fn view(&self) -> Element<'_, Message> {
        fn action_button<'a>(
            label: &'a str,
            enabled: bool,
            msg: Message,
        ) -> iced::widget::Button<'a, Message> {
            let mut b = button(label);
            if enabled {
                b = b.on_press(msg);
            }
            b
        }

        let red = Color::from_rgb8(200, 0, 0);

        let (banner_text, banner_color) = self.make_status_banner();
        let banner = row![
            text("■").size(28.0).color(banner_color),
            text(banner_text).size(24.0).color(banner_color),
        ]
        .spacing(10)
        .align_y(Alignment::Center);

        let locked = self.controls_locked();
        let connected = self.session.is_connected();

        let port_widget: Element<'_, Message> = if locked {
            text(
                self.selected_port
                    .as_ref()
                    .map(|p| p.display.as_str())
                    .unwrap_or(&self.settings.port_name),
            )
            .into()
        } else if self.available_ports.is_empty() {
            text("No ports available").into()
        } else {
            pick_list(
                self.available_ports.clone(),
                self.selected_port.clone(),
                Message::PortSelected,
            )
            .placeholder("Select port")
            .width(Length::Fixed(260.0))
            .into()
        };

        let ingest_widget: Element<'_, Message> = if locked {
            text(self.settings.ingest_mode.to_string()).into()
        } else {
            pick_list(
                IngestMode::ALL,
                Some(self.settings.ingest_mode),
                Message::IngestModeSelected,
            )
            .width(Length::Fixed(180.0))
            .into()
        };

        let mut angle_row = row![
            text_input("Angle (°)", &self.angle_input)
                .on_input(Message::AngleChanged)
                .on_submit(Message::Send)
                .width(Length::Fixed(140.0)),
            action_button("Send", connected, Message::Send),
        ]
        .spacing(10)
        .align_y(Alignment::Center);

        if self.angle_invalid {
            angle_row = angle_row.push(text("Invalid angle").color(red));
        }

        let gains = column![
            row![
                text("Kp:").width(Length::Fixed(30.0)),
                text_input("0.6", &self.kp_input)
                    .on_input(Message::KpChanged)
                    .width(Length::Fixed(100.0)),
            ]
            .spacing(8)
            .align_y(Alignment::Center),
            row![
                text("Ki:").width(Length::Fixed(30.0)),
                text_input("0.003", &self.ki_input)
                    .on_input(Message::KiChanged)
                    .width(Length::Fixed(100.0)),
            ]
            .spacing(8)
            .align_y(Alignment::Center),
            row![
                text("Kd:").width(Length::Fixed(30.0)),
                text_input("0.8", &self.kd_input)
                    .on_input(Message::KdChanged)
                    .width(Length::Fixed(100.0)),
            ]
            .spacing(8)
            .align_y(Alignment::Center),
            button("Reset PID").on_press(Message::ResetGains),
        ]
        .spacing(6);

        let buffer = self.session.buffer();
        let current_text = match buffer.latest() {
            Some(s) => format!("{:.1}°", s.value),
            None => "---".to_string(),
        };
        let target_text = match self.target {
            Some(t) => format!("{}°", t),
            None => "---".to_string(),
        };

        let controls = column![
            banner,
            row![text("Port:"), port_widget].spacing(10).align_y(Alignment::Center),
            row![text("Reader:"), ingest_widget].spacing(10).align_y(Alignment::Center),
            row![
                action_button("Connect", !locked, Message::Connect),
                action_button("Disconnect", locked, Message::Disconnect),
            ]
            .spacing(10),
            text("Enter an angle").size(18.0),
            angle_row,
            row![
                text("Range:"),
                pick_list(
                    AnglePolicy::ALL,
                    Some(self.settings.angle_policy),
                    Message::AnglePolicySelected
                ),
                text("End:"),
                pick_list(
                    LineEnding::ALL,
                    Some(self.settings.line_ending),
                    Message::LineEndingSelected
                ),
            ]
            .spacing(10)
            .align_y(Alignment::Center),
            row![
                pick_list(
                    LoopMode::ALL,
                    Some(self.settings.loop_mode),
                    Message::LoopModeSelected
                ),
            ],
            gains,
            row![
                text("Current:").size(18.0),
                text(current_text).size(28.0),
                text("Target:").size(18.0),
                text(target_text).size(18.0),
            ]
            .spacing(12)
            .align_y(Alignment::Center),
        ]
        .align_x(Alignment::Start)
        .spacing(12)
        .padding(10)
        .width(Length::Fixed(380.0));

        let plot: Element<'_, Message> = ChartWidget::new(AngleChart::new(
            &self.frame,
            self.settings.axis_policy,
            self.target,
        ))
        .width(Length::Fixed(620.0))
        .height(Length::Fixed(420.0))
        .into();

        let chart_panel = column![
            plot,
            row![
                text("Y axis:"),
                pick_list(
                    AxisPolicy::CHOICES,
                    Some(self.settings.axis_policy),
                    Message::AxisPolicySelected
                ),
                button("Clear").on_press(Message::ClearPlot),
                button("Save Plot").on_press(Message::SavePlot),
                button("Export CSV").on_press(Message::ExportCsv),
                button("Quit").on_press(Message::Quit),
            ]
            .spacing(10)
            .align_y(Alignment::Center),
        ]
        .spacing(10)
        .padding(10);

        let mut content = column![
            row![controls, chart_panel].spacing(10),
            text(format!("Samples: {} / {}", buffer.len(), buffer.capacity()))
                .size(13.0)
                .color(Color::from_rgb8(120, 120, 120)),
        ]
        .spacing(6);

        if let Some(rejected) = &self.last_rejected {
            content = content.push(
                text(format!("Last dropped line: {rejected}"))
                    .size(13.0)
                    .color(Color::from_rgb8(120, 120, 120)),
            );
        }

        if let Some(err) = &self.error {
            content = content.push(text(err).color(Color::from_rgb8(255, 0, 0)));
        }

        content.into()
    }

    fn subscription(&self) -> Subscription<Message> {
        let render = time::every(self.settings.render_interval()).map(|_| Message::Tick);
        let ports = time::every(Duration::from_secs(2)).map(|_| Message::RefreshPorts);
        let close = window::close_requests().map(Message::CloseRequested);

        Subscription::batch(vec![render, ports, close])
    }
}

fn main() -> iced::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    iced::application(
        ControlPanelApp::title,
        ControlPanelApp::update,
        ControlPanelApp::view,
    )
    .subscription(ControlPanelApp::subscription)
    .exit_on_close_request(false)
    .window(iced::window::Settings {
        size: Size::new(1040.0, 560.0),
        resizable: false,
        ..Default::default()
    })
    .antialiasing(true)
    .run()
}
