//! Discovery of the OS device node behind the FTDI USB serial adapter.
//!
//! Both supported platforms scrape the text output of `lsusb`, Linux also
//! needs the kernel log to learn which tty the adapter was attached as.

use std::path::Path;
use std::process::Command;

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

/// USB listing command
pub const LSUSB: &str = "lsusb";
/// Kernel ring buffer dump command
pub const DMESG: &str = "dmesg";

/// Adapter description in the macOS `lsusb` output
pub const MACOS_FTDI_MARKER: &str = "FT232R USB UART";
/// Adapter description in the Linux `lsusb` output
pub const LINUX_FTDI_MARKER: &str = "FT232 Serial (UART)";
/// Kernel message printed once the ftdi_sio driver bound the adapter
pub const ATTACH_MARKER: &str = "FTDI USB Serial Device converter now attached";

const MACOS_DEVICE_PREFIX: &str = "/dev/cu.usbserial-";

static SERIAL_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Serial: ([a-zA-Z0-9]+)").expect("valid serial ident pattern"));

/// Host platforms the locator knows how to search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Linux,
    Unsupported(String),
}

impl Platform {
    /// Platform this binary was built for.
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` style name.
    pub fn from_os(os: &str) -> Self {
        match os {
            "macos" => Platform::MacOs,
            "linux" => Platform::Linux,
            other => Platform::Unsupported(other.to_string()),
        }
    }
}

/// What the locator needs from the host system.
pub trait HostProbe {
    /// Run `program` without arguments and return its standard output.
    fn command_output(&self, program: &str) -> Result<String>;
    /// Whether the process runs with an effective uid of 0.
    fn is_root(&self) -> bool;
    fn path_exists(&self, path: &Path) -> bool;
}

/// [`HostProbe`] backed by the real operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn command_output(&self, program: &str) -> Result<String> {
        let output = Command::new(program)
            .output()
            .map_err(|source| Error::CommandFailed {
                program: program.to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(Error::CommandStatus {
                program: program.to_string(),
                status: output.status,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    #[cfg(unix)]
    fn is_root(&self) -> bool {
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(not(unix))]
    fn is_root(&self) -> bool {
        false
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Finds the serial device path of the adapter on one platform.
#[derive(Debug)]
pub struct DeviceLocator<H = SystemProbe> {
    platform: Platform,
    host: H,
}

impl DeviceLocator<SystemProbe> {
    /// Locator for the running platform using the real system.
    pub fn for_current_platform() -> Self {
        DeviceLocator::new(Platform::current(), SystemProbe)
    }
}

impl<H: HostProbe> DeviceLocator<H> {
    pub fn new(platform: Platform, host: H) -> Self {
        DeviceLocator { platform, host }
    }

    /// Return the device path of the adapter.
    ///
    /// The returned path is never empty. On macOS it is also known to exist.
    pub fn locate(&self) -> Result<String> {
        match &self.platform {
            Platform::MacOs => self.locate_macos(),
            Platform::Linux => self.locate_linux(),
            Platform::Unsupported(os) => Err(Error::UnsupportedPlatform(os.clone())),
        }
    }

    fn locate_macos(&self) -> Result<String> {
        let listing = self.host.command_output(LSUSB)?;
        debug!("{} output: {}", LSUSB, listing);

        let ident = parse_macos_serial_ident(&listing).unwrap_or_default();
        let path = macos_device_path(&ident);
        if !self.host.path_exists(Path::new(&path)) {
            return Err(Error::PathMissing { path });
        }
        Ok(path)
    }

    fn locate_linux(&self) -> Result<String> {
        let listing = self.host.command_output(LSUSB)?;
        if !lists_linux_adapter(&listing) {
            return Err(Error::AdapterNotListed(LINUX_FTDI_MARKER.to_string()));
        }

        if !self.host.is_root() {
            return Err(Error::NotRoot);
        }

        let kernel_log = self.host.command_output(DMESG)?;
        let name = parse_attached_device(&kernel_log).ok_or(Error::AttachmentNotFound)?;
        info!("Found FTDI device at {}", name);
        Ok(linux_device_path(&name))
    }
}

/// Serial identifier of the last adapter line in a macOS `lsusb` listing.
pub fn parse_macos_serial_ident(listing: &str) -> Option<String> {
    listing
        .lines()
        .filter(|line| line.contains(MACOS_FTDI_MARKER))
        .filter_map(|line| SERIAL_IDENT.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .last()
}

pub fn macos_device_path(ident: &str) -> String {
    format!("{}{}", MACOS_DEVICE_PREFIX, ident)
}

/// Whether a Linux `lsusb` listing shows the adapter.
pub fn lists_linux_adapter(listing: &str) -> bool {
    listing.lines().any(|line| line.contains(LINUX_FTDI_MARKER))
}

/// Kernel device name from the last attachment line of a `dmesg` dump.
///
/// Lines where nothing follows the marker are skipped.
pub fn parse_attached_device(kernel_log: &str) -> Option<String> {
    kernel_log
        .lines()
        .filter_map(|line| {
            line.find(ATTACH_MARKER)
                .map(|at| &line[at + ATTACH_MARKER.len()..])
        })
        .filter_map(|rest| rest.split_whitespace().last())
        .inspect(|name| debug!("Found FTDI device at {}", name))
        .map(str::to_string)
        .last()
}

pub fn linux_device_path(name: &str) -> String {
    format!("/dev/{}", name)
}
