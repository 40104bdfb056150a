//! Hardware device abstraction layer for the Latchkey endpoint.
//!
//! This crate provides trait-based abstractions for the two peripherals of
//! an access-control endpoint: the RFID credential reader and the door
//! output. The traits let mock implementations (for development and
//! testing) and real drivers be swapped without touching the session logic.
//!
//! # Design Philosophy
//!
//! - **Async-first**: All I/O operations use native `async fn` in traits
//!   (Rust 1.90 + Edition 2024 RPITIT).
//! - **Non-blocking polls**: reader methods return immediately so the
//!   session loop stays cooperative.
//! - **Error-aware**: All operations return `Result<T>` with detailed error
//!   information.
//!
//! # Credential Readers
//!
//! The [`CredentialReader`] trait follows the presence-then-read poll of
//! contactless front-ends:
//!
//! ```no_run
//! use latchkey_hardware::traits::CredentialReader;
//! use latchkey_hardware::error::Result;
//!
//! async fn next_uid<R: CredentialReader>(reader: &mut R) -> Result<Option<String>> {
//!     if reader.is_new_card_present().await? {
//!         let card = reader.read_card_serial().await?;
//!         return Ok(Some(card.uid_hex()));
//!     }
//!     Ok(None)
//! }
//! ```
//!
//! # Actuators
//!
//! The [`Actuator`] trait switches a binary output. [`SysfsActuator`] drives
//! a Linux GPIO line, [`MockActuator`](mock::MockActuator) records pulses.
//!
//! # Error Handling
//!
//! All operations return [`Result<T>`][error::Result] which uses the
//! [`HardwareError`] error type.
//!
//! [`CredentialReader`]: traits::CredentialReader
//! [`Actuator`]: traits::Actuator
//! [`SysfsActuator`]: gpio::SysfsActuator

pub mod console;
pub mod devices;
pub mod error;
pub mod gpio;
pub mod mock;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use devices::AnyActuator;
pub use error::{HardwareError, Result};
pub use gpio::SysfsActuator;
pub use traits::{
    Actuator, CardData, CardType, CredentialReader, MAX_UID_LENGTH, MIN_UID_LENGTH,
};
pub use types::{DeviceInfo, OutputLevel, ReaderInfo};
