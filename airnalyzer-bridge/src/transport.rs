//! Serial transport seam.
//!
//! `TransportBackend` enumerates and opens devices, `TransportLink` reads from an
//! open one. Production uses `SerialBackend` (serialport crate); tests plug in a
//! scripted backend.

use crate::models::TransportCandidate;
use serialport::{SerialPort, SerialPortType};
use std::io::{self, BufRead, BufReader};
use std::time::{Duration, Instant};
use tracing::warn;

/// Longest line kept before it is handed on without its terminator.
pub const MAX_LINE_BYTES: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot open {device}: {source}")]
    Open {
        device: String,
        #[source]
        source: io::Error,
    },
    #[error("port enumeration failed: {0}")]
    Enumerate(#[source] io::Error),
    #[error("read error: {0}")]
    Io(#[from] io::Error),
    #[error("stream closed by device")]
    Closed,
}

pub trait TransportLink: Send {
    /// One newline-terminated line, without waiting longer than the poll timeout.
    /// `Ok(None)` means the timeout elapsed before a full line arrived.
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    /// True as soon as any byte shows up within `window`.
    fn has_data_within(&mut self, window: Duration) -> Result<bool, TransportError>;
}

pub trait TransportBackend: Send + Sync {
    fn enumerate(&self) -> Result<Vec<TransportCandidate>, TransportError>;
    fn open(&self, device: &str) -> Result<Box<dyn TransportLink>, TransportError>;
}

pub struct SerialBackend {
    baud: u32,
    poll_timeout: Duration,
}

impl SerialBackend {
    pub fn new(baud: u32, poll_timeout: Duration) -> Self {
        Self { baud, poll_timeout }
    }
}

impl TransportBackend for SerialBackend {
    fn enumerate(&self) -> Result<Vec<TransportCandidate>, TransportError> {
        let ports = serialport::available_ports()
            .map_err(|e| TransportError::Enumerate(e.into()))?;
        Ok(ports
            .into_iter()
            .map(|info| {
                let (description, hwid) = describe_port(&info.port_name, &info.port_type);
                TransportCandidate {
                    device: info.port_name,
                    description,
                    hwid,
                }
            })
            .collect())
    }

    fn open(&self, device: &str) -> Result<Box<dyn TransportLink>, TransportError> {
        let port = serialport::new(device, self.baud)
            .timeout(self.poll_timeout)
            .open()
            .map_err(|e| TransportError::Open {
                device: device.to_string(),
                source: e.into(),
            })?;
        Ok(Box::new(SerialLink::new(port, self.poll_timeout)))
    }
}

/// Human label and pyserial-style hardware id ("USB VID:PID=1A86:7523 SER=...").
fn describe_port(name: &str, port_type: &SerialPortType) -> (String, String) {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            let description = usb
                .product
                .clone()
                .or_else(|| usb.manufacturer.clone())
                .unwrap_or_else(|| name.to_string());
            let mut hwid = format!("USB VID:PID={:04X}:{:04X}", usb.vid, usb.pid);
            if let Some(serial) = &usb.serial_number {
                hwid.push_str(&format!(" SER={serial}"));
            }
            if let Some(manufacturer) = &usb.manufacturer {
                hwid.push_str(&format!(" MFR={manufacturer}"));
            }
            (description, hwid)
        }
        SerialPortType::PciPort => (name.to_string(), "PCI".into()),
        SerialPortType::BluetoothPort => (name.to_string(), "BLUETOOTH".into()),
        SerialPortType::Unknown => ("n/a".into(), "n/a".into()),
    }
}

pub struct SerialLink {
    port: BufReader<Box<dyn SerialPort>>,
    pending: Vec<u8>,
    poll_timeout: Duration,
}

impl SerialLink {
    fn new(port: Box<dyn SerialPort>, poll_timeout: Duration) -> Self {
        Self {
            port: BufReader::new(port),
            pending: Vec::new(),
            poll_timeout,
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

impl TransportLink for SerialLink {
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        // a timeout mid-line leaves the partial bytes in `pending` for the next call
        loop {
            let available = match self.port.fill_buf() {
                Ok(buf) => buf,
                Err(e) if is_timeout(&e) => return Ok(None),
                Err(e) => return Err(TransportError::Io(e)),
            };
            if available.is_empty() {
                if self.pending.is_empty() {
                    return Err(TransportError::Closed);
                }
                return Ok(Some(std::mem::take(&mut self.pending)));
            }

            let room = MAX_LINE_BYTES - self.pending.len();
            let chunk = &available[..available.len().min(room)];
            let (taken, complete) = match chunk.iter().position(|b| *b == b'\n') {
                Some(end) => (end + 1, true),
                None => (chunk.len(), false),
            };
            self.pending.extend_from_slice(&chunk[..taken]);
            self.port.consume(taken);

            if complete {
                return Ok(Some(std::mem::take(&mut self.pending)));
            }
            if self.pending.len() >= MAX_LINE_BYTES {
                warn!("no line terminator within {MAX_LINE_BYTES} bytes, emitting partial line");
                return Ok(Some(std::mem::take(&mut self.pending)));
            }
        }
    }

    fn has_data_within(&mut self, window: Duration) -> Result<bool, TransportError> {
        let deadline = Instant::now() + window;
        let result = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break Ok(false);
            }
            self.port
                .get_mut()
                .set_timeout(remaining.min(self.poll_timeout))
                .map_err(|e| TransportError::Io(e.into()))?;
            match self.port.fill_buf() {
                Ok(buf) if !buf.is_empty() => break Ok(true),
                Ok(_) => break Err(TransportError::Closed),
                Err(e) if is_timeout(&e) => continue,
                Err(e) => break Err(TransportError::Io(e)),
            }
        };
        self.port
            .get_mut()
            .set_timeout(self.poll_timeout)
            .map_err(|e| TransportError::Io(e.into()))?;
        result
    }
}
