//! Hardware device trait definitions.
//!
//! This module defines the contracts between the session controller and the
//! endpoint's peripherals: the credential reader that yields card UIDs and
//! the actuator that drives the door output. Mock and real implementations
//! are interchangeable behind these traits.
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro.

#![allow(async_fn_in_trait)]

use crate::error::Result;
use crate::types::{DeviceInfo, OutputLevel, ReaderInfo};
use latchkey_core::CredentialId;

/// RFID card type identification.
///
/// Derived from the SAK byte returned during anticollision. Only used for
/// logging; access decisions never depend on the card type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CardType {
    /// Mifare Mini (320 bytes).
    MifareMini,

    /// Mifare Classic 1K (1024 bytes).
    MifareClassic1K,

    /// Mifare Classic 4K (4096 bytes).
    MifareClassic4K,

    /// Mifare Ultralight or Ultralight C.
    MifareUltralight,

    /// Mifare Plus.
    MifarePlus,

    /// ISO/IEC 14443-4 compliant card (DESFire and friends).
    Iso14443_4,

    /// Unknown card type with the raw SAK byte.
    Unknown(u8),
}

impl CardType {
    /// Identify the card type from its SAK byte.
    ///
    /// # Examples
    ///
    /// ```
    /// use latchkey_hardware::traits::CardType;
    ///
    /// assert_eq!(CardType::from_sak(0x08), CardType::MifareClassic1K);
    /// assert_eq!(CardType::from_sak(0x88), CardType::MifareClassic1K);
    /// assert_eq!(CardType::from_sak(0x42), CardType::Unknown(0x42));
    /// ```
    pub fn from_sak(sak: u8) -> Self {
        // Bit 8 carries no type information.
        match sak & 0x7F {
            0x09 => Self::MifareMini,
            0x08 => Self::MifareClassic1K,
            0x18 => Self::MifareClassic4K,
            0x00 => Self::MifareUltralight,
            0x10 | 0x11 => Self::MifarePlus,
            0x20 => Self::Iso14443_4,
            other => Self::Unknown(other),
        }
    }

    /// Get a human-readable name for the card type.
    pub fn name(&self) -> &str {
        match self {
            Self::MifareMini => "Mifare Mini",
            Self::MifareClassic1K => "Mifare Classic 1K",
            Self::MifareClassic4K => "Mifare Classic 4K",
            Self::MifareUltralight => "Mifare Ultralight",
            Self::MifarePlus => "Mifare Plus",
            Self::Iso14443_4 => "ISO/IEC 14443-4",
            Self::Unknown(_) => "Unknown",
        }
    }

    /// Check if this is a known card type.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

/// Minimum UID length in bytes (single-size UID per ISO 14443).
pub const MIN_UID_LENGTH: usize = 4;

/// Maximum UID length in bytes (triple-size UID per ISO 14443).
pub const MAX_UID_LENGTH: usize = 10;

/// RFID card data.
///
/// Contains information about a card that was read by an RFID reader,
/// including the unique identifier (UID), card type, and timestamp.
#[derive(Debug, Clone)]
pub struct CardData {
    /// Card unique identifier (4-10 bytes).
    pub uid: Vec<u8>,

    /// Card type identification.
    pub card_type: CardType,

    /// Timestamp when the card was read.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl CardData {
    /// Create new card data with the current timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the UID length is not within the valid range
    /// of 4-10 bytes as specified by ISO 14443.
    ///
    /// # Examples
    ///
    /// ```
    /// use latchkey_hardware::traits::{CardData, CardType};
    ///
    /// let uid = vec![0x04, 0xA2, 0x3B, 0x9C];
    /// let card = CardData::new(uid, CardType::MifareClassic1K).unwrap();
    /// assert_eq!(card.uid_hex(), "04A23B9C");
    /// ```
    pub fn new(uid: Vec<u8>, card_type: CardType) -> Result<Self> {
        CardDataBuilder::new(uid, card_type).build()
    }

    /// Create a builder for constructing card data with optional fields.
    ///
    /// This allows setting custom timestamps for testing or replaying
    /// recorded events.
    pub fn builder(uid: Vec<u8>, card_type: CardType) -> CardDataBuilder {
        CardDataBuilder::new(uid, card_type)
    }

    /// Get the UID as a compact hexadecimal string (diagnostics only).
    pub fn uid_hex(&self) -> String {
        hex::encode_upper(&self.uid)
    }

    /// Convert the UID into the session credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the UID is not a valid credential.
    pub fn credential(&self) -> latchkey_core::Result<CredentialId> {
        CredentialId::new(self.uid.as_slice())
    }
}

/// Builder for constructing CardData with optional fields.
///
/// # Examples
///
/// ```
/// use latchkey_hardware::traits::{CardData, CardType};
/// use chrono::Utc;
///
/// let card = CardData::builder(vec![0x01, 0x02, 0x03, 0x04], CardType::MifareClassic1K)
///     .timestamp(Utc::now())
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct CardDataBuilder {
    uid: Vec<u8>,
    card_type: CardType,
    timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

impl CardDataBuilder {
    /// Create a new CardDataBuilder with required fields.
    pub fn new(uid: Vec<u8>, card_type: CardType) -> Self {
        Self {
            uid,
            card_type,
            timestamp: None,
        }
    }

    /// Set a custom timestamp for the card read event.
    ///
    /// If not set, the current time will be used when build() is called.
    pub fn timestamp(mut self, timestamp: chrono::DateTime<chrono::Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Build the CardData instance with validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the UID length is not between `MIN_UID_LENGTH`
    /// and `MAX_UID_LENGTH`.
    pub fn build(self) -> Result<CardData> {
        let uid_len = self.uid.len();
        if !(MIN_UID_LENGTH..=MAX_UID_LENGTH).contains(&uid_len) {
            return Err(crate::HardwareError::invalid_data(format!(
                "Card UID length must be between {} and {} bytes, got {}",
                MIN_UID_LENGTH, MAX_UID_LENGTH, uid_len
            )));
        }

        Ok(CardData {
            uid: self.uid,
            card_type: self.card_type,
            timestamp: self.timestamp.unwrap_or_else(chrono::Utc::now),
        })
    }
}

/// Credential reader abstraction.
///
/// Mirrors the two-step poll of contactless front-ends: first ask whether a
/// new card entered the field, then read its serial. The session controller
/// calls both from its single loop, so neither method may block waiting for
/// a card.
///
/// # Object Safety and Dynamic Dispatch
///
/// **NOTE**: This trait is NOT object-safe because `async fn` methods return
/// `impl Future`. Use generic type parameters, or an enum wrapper like
/// [`AnyActuator`](crate::devices::AnyActuator) when the concrete device is
/// chosen at runtime.
///
/// # Examples
///
/// ```no_run
/// use latchkey_hardware::traits::CredentialReader;
/// use latchkey_hardware::error::Result;
///
/// async fn poll_once<R: CredentialReader>(reader: &mut R) -> Result<Option<Vec<u8>>> {
///     if !reader.is_new_card_present().await? {
///         return Ok(None);
///     }
///     let card = reader.read_card_serial().await?;
///     Ok(Some(card.uid))
/// }
/// ```
pub trait CredentialReader: Send + Sync {
    /// Check whether a card not yet reported has entered the field.
    ///
    /// Returns immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is disconnected or a communication
    /// error occurs.
    async fn is_new_card_present(&mut self) -> Result<bool>;

    /// Read the serial (UID) of the card detected by the last presence check.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No card was detected by the preceding presence check
    /// - The card left the field before its UID could be read
    /// - The device is disconnected
    async fn read_card_serial(&mut self) -> Result<CardData>;

    /// Drop any card detected but not yet read, returning how many were
    /// discarded.
    ///
    /// Called when the reader was not being polled, so that a card held up
    /// during that time is not reported as a fresh presentation.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be reached.
    async fn discard_pending(&mut self) -> Result<usize>;

    /// Get reader information.
    ///
    /// # Errors
    ///
    /// Returns an error if a communication error occurs while querying
    /// reader information.
    async fn get_reader_info(&self) -> Result<ReaderInfo>;
}

/// Binary output abstraction (door strike, relay, status LED).
///
/// Actuators only know how to switch levels. Timing of the unlock pulse is
/// owned by the session controller.
///
/// # Examples
///
/// ```no_run
/// use latchkey_hardware::traits::Actuator;
/// use latchkey_hardware::error::Result;
/// use std::time::Duration;
///
/// async fn pulse<A: Actuator>(actuator: &mut A, hold: Duration) -> Result<()> {
///     actuator.activate().await?;
///     tokio::time::sleep(hold).await;
///     actuator.deactivate().await
/// }
/// ```
pub trait Actuator: Send + Sync {
    /// Drive the output to its active level.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be written.
    async fn activate(&mut self) -> Result<()>;

    /// Release the output to its inactive level.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be written.
    async fn deactivate(&mut self) -> Result<()>;

    /// Last level successfully written to the output.
    fn level(&self) -> OutputLevel;

    /// Get device information.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be queried.
    async fn get_info(&self) -> Result<DeviceInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0x09, CardType::MifareMini)]
    #[case(0x08, CardType::MifareClassic1K)]
    #[case(0x18, CardType::MifareClassic4K)]
    #[case(0x00, CardType::MifareUltralight)]
    #[case(0x10, CardType::MifarePlus)]
    #[case(0x11, CardType::MifarePlus)]
    #[case(0x20, CardType::Iso14443_4)]
    #[case(0x98, CardType::MifareClassic4K)]
    fn test_card_type_from_sak(#[case] sak: u8, #[case] expected: CardType) {
        assert_eq!(CardType::from_sak(sak), expected);
        assert!(expected.is_known());
    }

    #[test]
    fn test_card_type_unknown() {
        let card_type = CardType::from_sak(0x42);
        assert_eq!(card_type, CardType::Unknown(0x42));
        assert!(!card_type.is_known());
        assert_eq!(card_type.name(), "Unknown");
    }

    #[rstest]
    #[case(vec![0x01, 0x02, 0x03, 0x04])]
    #[case(vec![0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66])]
    #[case(vec![0xAA; 10])]
    fn test_card_data_valid_lengths(#[case] uid: Vec<u8>) {
        let card = CardData::new(uid.clone(), CardType::MifareClassic1K).unwrap();
        assert_eq!(card.uid, uid);
    }

    #[rstest]
    #[case(vec![])]
    #[case(vec![0x01, 0x02, 0x03])]
    #[case(vec![0xAA; 11])]
    fn test_card_data_invalid_lengths(#[case] uid: Vec<u8>) {
        let result = CardData::new(uid, CardType::MifareClassic1K);
        assert!(matches!(result, Err(crate::HardwareError::InvalidData { .. })));
    }

    #[test]
    fn test_card_data_uid_hex() {
        let card = CardData::new(vec![0x04, 0xa2, 0x3b, 0x9c], CardType::MifareUltralight).unwrap();
        assert_eq!(card.uid_hex(), "04A23B9C");
    }

    #[test]
    fn test_card_data_credential() {
        let card = CardData::new(vec![0x04, 0xA2, 0x3B, 0x9C], CardType::MifareClassic1K).unwrap();
        let credential = card.credential().unwrap();
        assert_eq!(credential.as_str(), " 04 A2 3B 9C");
        assert_eq!(credential.as_bytes(), card.uid.as_slice());
    }

    #[test]
    fn test_card_data_builder_timestamp() {
        use chrono::TimeZone;

        let recorded = chrono::Utc.with_ymd_and_hms(2025, 1, 15, 12, 30, 0).unwrap();
        let card = CardData::builder(vec![0x01, 0x02, 0x03, 0x04], CardType::MifareClassic1K)
            .timestamp(recorded)
            .build()
            .unwrap();

        assert_eq!(card.timestamp, recorded);
    }
}
