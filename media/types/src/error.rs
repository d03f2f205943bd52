/*!
    Error types for the slowmo crates.
*/

use thiserror::Error;

/**
    Error type for the slowmo crates.

    Setup failures (`SourceIo`, `DeviceConfig`, `Muxer` while creating the
    output) abort a run. Per-frame failures (`InvalidData`,
    `UnsupportedFormat` from a single conversion) are logged and skipped by
    the drivers.
*/
#[derive(Debug, Error)]
pub enum Error {
    /// The input could not be opened or read.
    #[error("source I/O error: {message}")]
    SourceIo { message: String },
    /// A conversion was given an unexpected plane count or layout.
    #[error("unsupported format: {message}")]
    UnsupportedFormat { message: String },
    /// Malformed data (short planes, wrong buffer length, bad dimensions).
    #[error("invalid data: {message}")]
    InvalidData { message: String },
    /// A decode or encode device failed to configure or start.
    #[error("device configuration error: {message}")]
    DeviceConfig { message: String },
    /// A running decode or encode device failed.
    #[error("device error: {message}")]
    Device { message: String },
    /// Container write or track failure.
    #[error("muxer error: {message}")]
    Muxer { message: String },
    /// The frame queue was closed before the frame could be pushed.
    #[error("frame queue closed")]
    QueueClosed,
    /// The encode worker thread panicked or could not be spawned.
    #[error("worker error: {message}")]
    Worker { message: String },
    /// Plain I/O error (output directory, file creation).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /**
        Create a source I/O error with the given message.
    */
    pub fn source_io(message: impl Into<String>) -> Self {
        Self::SourceIo {
            message: message.into(),
        }
    }

    /**
        Create an unsupported format error with the given message.
    */
    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            message: message.into(),
        }
    }

    /**
        Create an invalid data error with the given message.
    */
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /**
        Create a device configuration error with the given message.
    */
    pub fn device_config(message: impl Into<String>) -> Self {
        Self::DeviceConfig {
            message: message.into(),
        }
    }

    /**
        Create a runtime device error with the given message.
    */
    pub fn device(message: impl Into<String>) -> Self {
        Self::Device {
            message: message.into(),
        }
    }

    /**
        Create a muxer error with the given message.
    */
    pub fn muxer(message: impl Into<String>) -> Self {
        Self::Muxer {
            message: message.into(),
        }
    }

    /**
        Create a worker error with the given message.
    */
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }

    /**
        Returns true if this error only affects a single frame, meaning the
        pipeline may skip the frame and keep going.
    */
    pub fn is_frame_local(&self) -> bool {
        matches!(self, Self::InvalidData { .. } | Self::UnsupportedFormat { .. })
    }
}

/**
    Result type alias for the slowmo crates.
*/
pub type Result<T> = std::result::Result<T, Error>;
