//! Console card feeder.
//!
//! Turns hex UID lines typed on a terminal (or piped from a script) into
//! card presentations on a [`MockReader`](crate::mock::MockReader), so the
//! endpoint can be exercised without an RFID front-end.
//!
//! Accepted line formats: `04 A2 3B 9C`, `04A23B9C`, `04:a2:3b:9c`.

use crate::{
    HardwareError, Result,
    mock::MockReaderHandle,
    traits::{CardType, MAX_UID_LENGTH, MIN_UID_LENGTH},
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Parse one console line into UID bytes.
///
/// # Errors
///
/// Returns `HardwareError::InvalidData` if the line is not hexadecimal or
/// the UID length is outside 4-10 bytes.
///
/// # Examples
///
/// ```
/// use latchkey_hardware::console::parse_uid;
///
/// assert_eq!(parse_uid("04 A2 3B 9C").unwrap(), vec![0x04, 0xA2, 0x3B, 0x9C]);
/// assert_eq!(parse_uid("04:a2:3b:9c").unwrap(), vec![0x04, 0xA2, 0x3B, 0x9C]);
/// assert!(parse_uid("zz").is_err());
/// ```
pub fn parse_uid(line: &str) -> Result<Vec<u8>> {
    let digits: String = line
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();

    let uid = hex::decode(&digits)
        .map_err(|e| HardwareError::invalid_data(format!("'{}' is not a hex UID: {e}", line.trim())))?;

    if !(MIN_UID_LENGTH..=MAX_UID_LENGTH).contains(&uid.len()) {
        return Err(HardwareError::invalid_data(format!(
            "UID must be {MIN_UID_LENGTH}-{MAX_UID_LENGTH} bytes, got {}",
            uid.len()
        )));
    }

    Ok(uid)
}

/// Present every valid UID line from `input` to the reader.
///
/// Blank lines are skipped and malformed lines are logged and skipped.
/// Returns the number of cards presented once `input` reaches EOF.
///
/// # Errors
///
/// Returns an error if reading `input` fails or the reader was dropped.
pub async fn feed_lines<R>(input: R, handle: MockReaderHandle) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut presented = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        match parse_uid(&line) {
            Ok(uid) => {
                debug!(uid = %hex::encode_upper(&uid), "Presenting card from console");
                handle.present_card(uid, CardType::MifareClassic1K).await?;
                presented += 1;
            }
            Err(e) => warn!(error = %e, "Ignoring console line"),
        }
    }

    Ok(presented)
}

/// Spawn a task feeding UIDs typed on stdin into the reader.
pub fn spawn_console_feeder(handle: MockReaderHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(reader = %handle.name(), "Type a card UID in hex and press Enter to present it");
        match feed_lines(BufReader::new(tokio::io::stdin()), handle).await {
            Ok(count) => info!(count, "Console input closed"),
            Err(e) => warn!(error = %e, "Console feeder stopped"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockReader;
    use crate::traits::CredentialReader;
    use rstest::rstest;

    #[rstest]
    #[case("04 A2 3B 9C", vec![0x04, 0xA2, 0x3B, 0x9C])]
    #[case("04A23B9C", vec![0x04, 0xA2, 0x3B, 0x9C])]
    #[case(" 04:a2:3b:9c \r", vec![0x04, 0xA2, 0x3B, 0x9C])]
    #[case("04 11 22 33 44 55 66", vec![0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66])]
    fn test_parse_uid_valid(#[case] line: &str, #[case] expected: Vec<u8>) {
        assert_eq!(parse_uid(line).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("GG HH II JJ")]
    #[case("04 A2 3")]
    #[case("04 A2 3B")]
    #[case("00 11 22 33 44 55 66 77 88 99 AA")]
    fn test_parse_uid_invalid(#[case] line: &str) {
        assert!(matches!(
            parse_uid(line),
            Err(HardwareError::InvalidData { .. })
        ));
    }

    #[tokio::test]
    async fn test_feed_lines_presents_valid_cards() {
        let (mut reader, handle) = MockReader::new();
        let input: &[u8] = b"04 A2 3B 9C\n\nnot-hex\n01020304\n";

        let presented = feed_lines(input, handle.clone()).await.unwrap();
        assert_eq!(presented, 2);

        assert!(reader.is_new_card_present().await.unwrap());
        assert_eq!(
            reader.read_card_serial().await.unwrap().uid,
            vec![0x04, 0xA2, 0x3B, 0x9C]
        );
        assert!(reader.is_new_card_present().await.unwrap());
        assert_eq!(
            reader.read_card_serial().await.unwrap().uid,
            vec![0x01, 0x02, 0x03, 0x04]
        );
        assert!(!reader.is_new_card_present().await.unwrap());
    }
}
