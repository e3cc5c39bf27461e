//! Hex command framing.
//!
//! A control command arrives from the backend as a hex string and must be
//! written to the device in frames of at most [`FRAME_SIZE`] bytes.

use bytes::Bytes;
use cellar_core::{Error, Result, constants::FRAME_SIZE};

/// Split a hex command into write frames.
///
/// Frames are emitted in order: every frame but the last holds exactly
/// [`FRAME_SIZE`] bytes, the last holds the remainder. An empty input
/// produces a single empty frame.
///
/// # Errors
/// Returns `Error::InvalidCommand` if the input has an odd number of hex
/// characters or contains a non-hex character.
///
/// # Examples
///
/// ```
/// use cellar_protocol::chunk;
///
/// let frames = chunk(&"ab".repeat(45)).unwrap();
/// let sizes: Vec<usize> = frames.iter().map(|f| f.len()).collect();
/// assert_eq!(sizes, vec![20, 20, 5]);
///
/// assert!(chunk("abc").is_err());
/// ```
pub fn chunk(hex_command: &str) -> Result<Vec<Bytes>> {
    let bytes = parse_hex(hex_command)?;
    Ok(split_frames(Bytes::from(bytes)))
}

pub(crate) fn parse_hex(hex_command: &str) -> Result<Vec<u8>> {
    if hex_command.len() % 2 != 0 {
        return Err(Error::InvalidCommand(format!(
            "odd number of hex characters ({})",
            hex_command.len()
        )));
    }

    hex::decode(hex_command).map_err(|e| Error::InvalidCommand(e.to_string()))
}

/// Split already-decoded bytes into frames without copying.
pub(crate) fn split_frames(mut payload: Bytes) -> Vec<Bytes> {
    let mut frames = Vec::with_capacity(payload.len() / FRAME_SIZE + 1);

    while payload.len() > FRAME_SIZE {
        frames.push(payload.split_to(FRAME_SIZE));
    }
    frames.push(payload);

    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, vec![0])]
    #[case(1, vec![1])]
    #[case(19, vec![19])]
    #[case(20, vec![20])]
    #[case(21, vec![20, 1])]
    #[case(40, vec![20, 20])]
    #[case(41, vec![20, 20, 1])]
    fn test_frame_sizes(#[case] byte_len: usize, #[case] expected: Vec<usize>) {
        let frames = chunk(&"0f".repeat(byte_len)).unwrap();
        let sizes: Vec<usize> = frames.iter().map(Bytes::len).collect();
        assert_eq!(sizes, expected);
    }

    #[test]
    fn test_frames_preserve_order() {
        let input: String = (0u8..45).map(|b| format!("{b:02x}")).collect();
        let frames = chunk(&input).unwrap();

        let joined: Vec<u8> = frames.iter().flat_map(|f| f.iter().copied()).collect();
        assert_eq!(joined, (0u8..45).collect::<Vec<_>>());
        assert_eq!(frames[1][0], 20);
    }

    #[test]
    fn test_accepts_mixed_case() {
        let frames = chunk("DeadBEEF").unwrap();
        assert_eq!(frames[0].as_ref(), &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[rstest]
    #[case("abc")]
    #[case("zz")]
    #[case("12 4")]
    fn test_rejects_malformed_hex(#[case] input: &str) {
        assert!(matches!(chunk(input), Err(Error::InvalidCommand(_))));
    }
}
