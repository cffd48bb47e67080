use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};

pub mod error;
pub mod locator;
pub mod loradev;

pub use error::{Error, Result};
pub use locator::{DeviceLocator, Platform};
pub use loradev::{AtCommand, CommandResponse, ModemConfig, RadioParameters, RylrLoraDevice};

/// Baud rate the modem firmware ships with.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Anything the modem can be driven over.
///
/// Implemented for real serial ports, tests provide in-memory ports.
pub trait ModemPort: Read + Write {
    /// Number of bytes waiting in the input buffer.
    fn bytes_to_read(&self) -> std::result::Result<u32, serialport::Error>;
}

impl ModemPort for Box<dyn SerialPort> {
    fn bytes_to_read(&self) -> std::result::Result<u32, serialport::Error> {
        SerialPort::bytes_to_read(&**self)
    }
}

/// Serial line settings and response timing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModemSettings {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Timeout of a single blocking read
    pub read_timeout: Duration,
    /// Pause between two readiness polls
    pub poll_interval: Duration,
    /// Give up on a command if its response did not settle within this time
    pub response_timeout: Duration,
}

impl Default for ModemSettings {
    fn default() -> Self {
        ModemSettings {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            read_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(20),
            response_timeout: Duration::from_secs(5),
        }
    }
}

impl ModemSettings {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}

/// An open session with a RYLR LoRa modem.
///
/// The port is closed when the modem is dropped.
pub struct RylrModem<P = Box<dyn SerialPort>> {
    device: String,
    settings: ModemSettings,
    port: P,
}

impl RylrModem<Box<dyn SerialPort>> {
    /// Open the serial device at `device` with `settings`.
    pub fn open(device: &str, settings: ModemSettings) -> Result<Self> {
        let port = serialport::new(device, settings.baud_rate)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .flow_control(settings.flow_control)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|source| Error::Open {
                path: device.to_string(),
                source,
            })?;
        info!("opened serial port {} at {} baud", device, settings.baud_rate);
        Ok(RylrModem::with_port(device, port, settings))
    }
}

impl<P: ModemPort> RylrModem<P> {
    /// Wrap an already opened port.
    pub fn with_port(device: &str, port: P, settings: ModemSettings) -> Self {
        RylrModem {
            device: device.to_string(),
            settings,
            port,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Write directly to the modem, no line ending is appended.
    pub fn raw_write(&mut self, cmd: &str, buf: &[u8]) -> Result<()> {
        self.port
            .write_all(buf)
            .and_then(|_| self.port.flush())
            .map_err(|source| Error::Write {
                command: cmd.to_string(),
                source,
            })
    }

    /// Poll until two consecutive polls report the same non-zero count.
    fn wait_for_response(&mut self, cmd: &str) -> Result<u32> {
        let started = Instant::now();
        let mut last = 0;
        loop {
            match self.port.bytes_to_read() {
                Ok(ready) if ready > 0 && ready == last => return Ok(ready),
                Ok(ready) => last = ready,
                Err(e) => {
                    error!("Could not read response to '{}': {}", cmd, e);
                    last = 0;
                }
            }

            let waited = started.elapsed();
            if waited >= self.settings.response_timeout {
                return Err(Error::ResponseTimeout {
                    command: cmd.to_string(),
                    waited,
                });
            }
            thread::sleep(self.settings.poll_interval);
        }
    }

    /// Read until the line goes quiet. Read errors end the response early.
    ///
    /// A modem that never stops talking is cut off after `response_timeout`.
    fn drain(&mut self, ready: u32) -> Vec<u8> {
        let started = Instant::now();
        let mut response = Vec::new();
        let mut buf = vec![0u8; ready.max(1) as usize];
        loop {
            if started.elapsed() >= self.settings.response_timeout {
                warn!(
                    "{} still sending after {:?}, keeping {} bytes",
                    self.device,
                    self.settings.response_timeout,
                    response.len()
                );
                break;
            }
            match self.port.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => response.extend_from_slice(&buf[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {
                    debug!("end of response after {} bytes", response.len());
                    break;
                }
                Err(e) => {
                    error!("Could not read port {}: {}", self.device, e);
                    break;
                }
            }
        }
        response
    }
}

impl<P: ModemPort> RylrLoraDevice for RylrModem<P> {
    /// Send `cmd` terminated by CR/LF and return the modem's answer.
    fn send_command(&mut self, cmd: &str) -> Result<String> {
        let line = format!("{}\r\n", cmd);
        self.raw_write(cmd, line.as_bytes())?;
        debug!("sent {} bytes: '{}'", line.len(), cmd);

        let ready = self.wait_for_response(cmd)?;
        debug!("{} bytes ready for '{}'", ready, cmd);
        let response = self.drain(ready);
        Ok(String::from_utf8_lossy(&response).into_owned())
    }
}

impl<P> Drop for RylrModem<P> {
    fn drop(&mut self) {
        debug!("closing serial port {}", self.device);
    }
}

/// Log every serial port the system reports.
///
/// Used as a hint for the operator when the adapter could not be found.
pub fn log_available_ports() {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("Error listing serial ports: {}", e);
            return;
        }
    };
    match ports.len() {
        0 => info!("No ports found."),
        1 => info!("Found 1 port:"),
        n => info!("Found {} ports:", n),
    };
    for p in ports {
        match p.port_type {
            SerialPortType::UsbPort(usb) => info!(
                "  {} USB VID:{:04x} PID:{:04x} serial '{}' manufacturer '{}' product '{}'",
                p.port_name,
                usb.vid,
                usb.pid,
                usb.serial_number.as_deref().unwrap_or(""),
                usb.manufacturer.as_deref().unwrap_or(""),
                usb.product.as_deref().unwrap_or("")
            ),
            SerialPortType::BluetoothPort => info!("  {} Bluetooth", p.port_name),
            SerialPortType::PciPort => info!("  {} PCI", p.port_name),
            SerialPortType::Unknown => info!("  {} Unknown", p.port_name),
        }
    }
}
