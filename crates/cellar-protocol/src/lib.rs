//! Wire formats of the vending-device BLE protocol.
//!
//! - [`advertisement`]: decoding of the status/registration advertisement
//! - [`remaining`]: human-readable remaining-time rendering
//! - [`chunker`]: splitting of hex control commands into write frames
//! - [`command`]: validated control commands

pub mod advertisement;
pub mod chunker;
pub mod command;
pub mod remaining;

pub use advertisement::{
    AdvertisementDecoder, DeviceAdvertisement, RegistrationRecord, Remaining, StatusRecord,
    decode,
};
pub use chunker::chunk;
pub use command::ControlCommand;
pub use remaining::format_remaining;
