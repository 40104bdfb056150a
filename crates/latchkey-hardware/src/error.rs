//! Error types for hardware operations.
//!
//! This module defines error types specific to the endpoint's peripherals:
//! the credential reader and the actuator output.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during hardware device operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Device is not connected or has been disconnected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Invalid data received from device.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Device initialization failed.
    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    /// Device configuration error.
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    /// Card reading error.
    #[error("Card read error: {message}")]
    CardReadError { message: String },

    /// Output could not be driven to the requested level.
    #[error("Output error on {output}: {message}")]
    OutputError { output: String, message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a new initialization failed error.
    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }

    /// Create a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Create a new card read error.
    pub fn card_read(message: impl Into<String>) -> Self {
        Self::CardReadError {
            message: message.into(),
        }
    }

    /// Create a new output error.
    pub fn output(output: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OutputError {
            output: output.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_error() {
        let error = HardwareError::disconnected("MFRC522");
        assert!(matches!(error, HardwareError::Disconnected { .. }));
        assert_eq!(error.to_string(), "Device disconnected: MFRC522");
    }

    #[test]
    fn test_card_read_error() {
        let error = HardwareError::card_read("No card in field");
        assert!(matches!(error, HardwareError::CardReadError { .. }));
        assert_eq!(error.to_string(), "Card read error: No card in field");
    }

    #[test]
    fn test_output_error() {
        let error = HardwareError::output("gpio5", "permission denied");
        assert!(matches!(error, HardwareError::OutputError { .. }));
        assert_eq!(error.to_string(), "Output error on gpio5: permission denied");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error: HardwareError = io.into();
        assert!(matches!(error, HardwareError::Io(_)));
    }

    #[test]
    fn test_error_display() {
        let errors = vec![
            HardwareError::disconnected("Device1"),
            HardwareError::invalid_data("bad"),
            HardwareError::configuration("pin"),
            HardwareError::initialization_failed("export"),
        ];

        for error in errors {
            let _ = format!("{}", error);
            let _ = format!("{:?}", error);
        }
    }
}
