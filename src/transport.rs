// AngleControlPanel
// Author: J Taylor
// Supplied without warranty.
// Use at your own risk.


// src/transport.rs
//
// Serial link to the controller board. The rest of the crate only sees
// the `Transport` trait so the pipeline can run against an in-memory port.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Every firmware build talks at 9600 baud.
pub const BAUD_RATE: u32 = 9600;
/// Upper bound on a blocking read; also bounds how long a reader takes to stop.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

pub trait Transport: Read + Write + Send {
    /// Second handle on the same port, used by the background reader.
    fn try_clone_transport(&self) -> io::Result<Box<dyn Transport>>;

    /// Bytes waiting in the receive buffer.
    fn bytes_available(&mut self) -> io::Result<usize>;
}

// ---------------- Port dropdown item ----------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    pub port_name: String, // e.g. "COM7"
    pub display: String,   // e.g. "COM7: Arduino Uno"
}

impl std::fmt::Display for PortEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display)
    }
}

pub fn describe_port(p: serialport::SerialPortInfo) -> PortEntry {
    let display = match p.port_type {
        serialport::SerialPortType::UsbPort(info) => {
            let mut parts = Vec::new();
            if let Some(m) = info.manufacturer {
                parts.push(m);
            }
            if let Some(prod) = info.product {
                parts.push(prod);
            }

            if parts.is_empty() {
                format!("{}: USB Serial", p.port_name)
            } else {
                format!("{}: {}", p.port_name, parts.join(" "))
            }
        }
        serialport::SerialPortType::BluetoothPort => format!("{}: Bluetooth", p.port_name),
        serialport::SerialPortType::PciPort => format!("{}: PCI", p.port_name),
        serialport::SerialPortType::Unknown => p.port_name.clone(),
    };

    PortEntry {
        port_name: p.port_name,
        display,
    }
}

pub fn scan_ports() -> Vec<PortEntry> {
    let mut out: Vec<PortEntry> = match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(describe_port).collect(),
        Err(e) => {
            log::warn!("Port scan failed: {}", e);
            Vec::new()
        }
    };

    out.sort_by(|a, b| a.display.cmp(&b.display));
    out
}

// ---------------- serialport backend ----------------

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `port_name` at 9600 8N1 with the fixed read timeout.
    pub fn open(port_name: &str) -> Result<Self, serialport::Error> {
        let port = serialport::new(port_name, BAUD_RATE)
            .timeout(READ_TIMEOUT)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .open()?;

        log::info!("Opened {} at {} baud", port_name, BAUD_RATE);
        Ok(Self { port })
    }
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Transport for SerialTransport {
    fn try_clone_transport(&self) -> io::Result<Box<dyn Transport>> {
        let port = self.port.try_clone().map_err(io::Error::from)?;
        Ok(Box::new(SerialTransport { port }))
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::from)
    }
}

// ---------------- In-memory port for tests ----------------
