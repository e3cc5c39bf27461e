use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Identity errors
    #[error("Invalid device ID: {0}")]
    InvalidDeviceId(String),

    #[error("Invalid transport address: {0}")]
    InvalidAddress(String),

    // Command errors
    #[error("Invalid control command: {0}")]
    InvalidCommand(String),

    // Protocol state errors
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let error = Error::InvalidCommand("too short".to_string());
        assert_eq!(error.to_string(), "Invalid control command: too short");

        let error = Error::InvalidStateTransition {
            from: "Idle".to_string(),
            to: "Writing".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid state transition from Idle to Writing"
        );
    }
}
