//! Mock credential reader for testing and development.
//!
//! This module provides a simulated reader that can be controlled
//! programmatically, without requiring an RFID front-end.

use crate::{
    HardwareError, Result,
    traits::{CardData, CardType, CredentialReader},
    types::ReaderInfo,
};
use tokio::sync::mpsc;

/// Mock credential reader for testing and development.
///
/// Cards presented through the paired [`MockReaderHandle`] are reported one
/// at a time by the usual two-step poll. Presentations that were never
/// polled are dropped by [`discard_pending`](CredentialReader::discard_pending).
///
/// # Examples
///
/// ```
/// use latchkey_hardware::mock::MockReader;
/// use latchkey_hardware::traits::{CardType, CredentialReader};
///
/// #[tokio::main]
/// async fn main() -> latchkey_hardware::Result<()> {
///     let (mut reader, handle) = MockReader::new();
///
///     handle.present_card(vec![0x04, 0xA2, 0x3B, 0x9C], CardType::MifareClassic1K).await?;
///
///     assert!(reader.is_new_card_present().await?);
///     let card = reader.read_card_serial().await?;
///     assert_eq!(card.uid_hex(), "04A23B9C");
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockReader {
    /// Channel receiver for reader events
    event_rx: mpsc::Receiver<ReaderEvent>,

    /// Event picked up by the last presence check
    pending: Option<ReaderEvent>,

    /// Device name
    name: String,
}

impl MockReader {
    /// Create a new mock reader with the default name.
    ///
    /// Returns a tuple of (MockReader, MockReaderHandle) where the handle
    /// is used to simulate card presentations.
    pub fn new() -> (Self, MockReaderHandle) {
        Self::with_name("Mock RFID Reader".to_string())
    }

    /// Create a new mock reader with a custom name.
    pub fn with_name(name: String) -> (Self, MockReaderHandle) {
        let (event_tx, event_rx) = mpsc::channel(32);

        let reader = Self {
            event_rx,
            pending: None,
            name: name.clone(),
        };

        let handle = MockReaderHandle { event_tx, name };

        (reader, handle)
    }
}

impl Default for MockReader {
    fn default() -> Self {
        Self::new().0
    }
}

impl CredentialReader for MockReader {
    async fn is_new_card_present(&mut self) -> Result<bool> {
        if self.pending.is_some() {
            return Ok(true);
        }

        match self.event_rx.try_recv() {
            Ok(event) => {
                self.pending = Some(event);
                Ok(true)
            }
            Err(mpsc::error::TryRecvError::Empty) => Ok(false),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(HardwareError::disconnected("reader event channel closed"))
            }
        }
    }

    async fn read_card_serial(&mut self) -> Result<CardData> {
        match self.pending.take() {
            Some(ReaderEvent::CardPresented(card)) => Ok(card),
            Some(ReaderEvent::ReadFailure(message)) => Err(HardwareError::card_read(message)),
            None => Err(HardwareError::card_read("no card in field")),
        }
    }

    async fn discard_pending(&mut self) -> Result<usize> {
        let mut discarded = usize::from(self.pending.take().is_some());
        while self.event_rx.try_recv().is_ok() {
            discarded += 1;
        }
        Ok(discarded)
    }

    async fn get_reader_info(&self) -> Result<ReaderInfo> {
        Ok(ReaderInfo::new(self.name.clone(), vec!["ISO14443A".to_string()])
            .with_max_baud_rate(106_000))
    }
}

/// Internal event type for the mock reader.
#[derive(Debug, Clone)]
enum ReaderEvent {
    CardPresented(CardData),
    ReadFailure(String),
}

/// Handle for controlling a mock reader.
///
/// Cloning the handle yields another producer for the same reader.
#[derive(Debug, Clone)]
pub struct MockReaderHandle {
    /// Channel sender for reader events
    event_tx: mpsc::Sender<ReaderEvent>,

    /// Device name
    name: String,
}

impl MockReaderHandle {
    /// Present a card to the reader.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The UID length is outside 4-10 bytes
    /// - The reader has been dropped and the channel is closed
    pub async fn present_card(&self, uid: Vec<u8>, card_type: CardType) -> Result<()> {
        let card = CardData::new(uid, card_type)?;
        self.send(ReaderEvent::CardPresented(card)).await
    }

    /// Make the next serial read fail, as when a card leaves the field
    /// between detection and read.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader has been dropped.
    pub async fn fail_next_read(&self, message: impl Into<String>) -> Result<()> {
        self.send(ReaderEvent::ReadFailure(message.into())).await
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, event: ReaderEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| HardwareError::disconnected("reader event channel closed"))
    }
}
