use bytes::Bytes;
use cellar_core::{Error, Result, constants::MIN_COMMAND_HEX_LEN};
use std::fmt;

use crate::chunker::{parse_hex, split_frames};

/// A validated control command ready to be written to a device.
///
/// Construction performs every check that must pass before any radio
/// activity: non-empty, at least [`MIN_COMMAND_HEX_LEN`] characters, an
/// even number of characters, hex digits only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCommand {
    hex: String,
    bytes: Bytes,
}

impl ControlCommand {
    /// Validate a hex command string.
    ///
    /// # Errors
    /// Returns `Error::InvalidCommand` describing the first failed check.
    pub fn new(hex_command: impl Into<String>) -> Result<Self> {
        let hex = hex_command.into().trim().to_string();

        if hex.is_empty() {
            return Err(Error::InvalidCommand("command is empty".to_string()));
        }

        if hex.len() < MIN_COMMAND_HEX_LEN {
            return Err(Error::InvalidCommand(format!(
                "command must be at least {MIN_COMMAND_HEX_LEN} hex characters, got {}",
                hex.len()
            )));
        }

        let bytes = Bytes::from(parse_hex(&hex)?);
        Ok(Self { hex, bytes })
    }

    /// The command as received (trimmed).
    pub fn as_hex(&self) -> &str {
        &self.hex
    }

    /// Decoded command bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of decoded bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false for a validated command.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write frames in transmission order.
    pub fn frames(&self) -> Vec<Bytes> {
        split_frames(self.bytes.clone())
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

impl std::str::FromStr for ControlCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ControlCommand::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_valid_command() {
        let command = ControlCommand::new("a1b2c3d4e5f60718293a4b5c").unwrap();
        assert_eq!(command.len(), 12);
        assert_eq!(command.frames().len(), 1);
        assert_eq!(command.to_string(), "a1b2c3d4e5f60718293a4b5c");
    }

    #[test]
    fn test_command_is_trimmed() {
        let command = ControlCommand::new("  00112233445566778899\n").unwrap();
        assert_eq!(command.as_hex(), "00112233445566778899");
    }

    #[rstest]
    #[case("", "empty")]
    #[case("0011", "at least")]
    #[case("0011223344556677889", "at least")]
    #[case("00112233445566778899a", "odd")] // 21 characters
    #[case("0011223344556677889900a", "odd")] // 23 characters
    #[case("0011223344556677889g", "Invalid character")]
    fn test_invalid_command(#[case] input: &str, #[case] fragment: &str) {
        let error = ControlCommand::new(input).unwrap_err();
        assert!(matches!(error, Error::InvalidCommand(_)));
        assert!(
            error.to_string().contains(fragment),
            "{error} should mention {fragment}"
        );
    }

    #[test]
    fn test_long_command_frames() {
        let command: ControlCommand = "ff".repeat(50).parse().unwrap();
        let sizes: Vec<usize> = command.frames().iter().map(Bytes::len).collect();
        assert_eq!(sizes, vec![20, 20, 10]);
    }
}
