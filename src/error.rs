use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Everything that can go wrong while locating or configuring the modem.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot connect to usb ftdi on platform '{0}'")]
    UnsupportedPlatform(String),

    #[error("can't run {program} command")]
    CommandFailed {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}")]
    CommandStatus { program: String, status: ExitStatus },

    #[error("couldn't find {0}")]
    AdapterNotListed(String),

    #[error("couldn't find FTDI device in kernel log")]
    AttachmentNotFound,

    #[error("serial path '{path}' does not exist")]
    PathMissing { path: String },

    #[error("you must run this program as root")]
    NotRoot,

    #[error("failed to open serial path '{path}'")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("failed to send '{command}'")]
    Write {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("no response to '{command}' within {waited:?}")]
    ResponseTimeout { command: String, waited: Duration },
}

pub type Result<T> = std::result::Result<T, Error>;
