//! # Wire Codec
//!
//! `bincode` encoding of [`Message`] with a u32 big-endian length prefix.
//!
//! ```text
//! ┌──────────────┬───────────────────────────────┐
//! │ len: u32 BE  │ bincode(Message) (len bytes)  │
//! └──────────────┴───────────────────────────────┘
//! ```

use crate::envelope::Message;
use crate::errors::CodecError;

/// Largest accepted frame body.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Length of the frame prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Serialize a message body.
pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(message).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Deserialize a message body and check its version.
pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
    let message: Message =
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
    if message.version != Message::CURRENT_VERSION {
        return Err(CodecError::UnsupportedVersion {
            received: message.version,
            supported: Message::CURRENT_VERSION,
        });
    }
    Ok(message)
}

/// Serialize and prepend the length prefix.
pub fn encode_frame(message: &Message) -> Result<Vec<u8>, CodecError> {
    let body = encode(message)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge {
            len: body.len(),
            max: MAX_FRAME_LEN,
        });
    }
    let len = u32::try_from(body.len()).map_err(|_| CodecError::FrameTooLarge {
        len: body.len(),
        max: MAX_FRAME_LEN,
    })?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Read the body length from a frame header.
pub fn frame_len(header: [u8; FRAME_HEADER_LEN]) -> Result<usize, CodecError> {
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    Ok(len)
}

/// Decode a complete frame (prefix included).
pub fn decode_frame(frame: &[u8]) -> Result<Message, CodecError> {
    if frame.len() < FRAME_HEADER_LEN {
        return Err(CodecError::Truncated {
            expected: FRAME_HEADER_LEN,
            actual: frame.len(),
        });
    }
    let mut header = [0u8; FRAME_HEADER_LEN];
    header.copy_from_slice(&frame[..FRAME_HEADER_LEN]);
    let len = frame_len(header)?;

    let body = &frame[FRAME_HEADER_LEN..];
    if body.len() < len {
        return Err(CodecError::Truncated {
            expected: len,
            actual: body.len(),
        });
    }
    decode(&body[..len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Phase, ProcessId, Transaction, TransactionAction, Value};
    use crate::envelope::{AbstractionId, Payload, Scope};

    fn sample() -> Message {
        let tx = Transaction::transfer("A", "B", 40, "x", "y").with_id("t1");
        let value = Value::for_phase(Phase::Prepare, TransactionAction::Commit, tx);
        Message::new(Scope::system("t1-prepare"), AbstractionId::Ep(3), Payload::Write(value))
            .from(ProcessId::new("127.0.0.1", 5001, "x", 1).with_rank(2))
    }

    #[test]
    fn test_frame_preserves_message() {
        let msg = sample();
        let frame = encode_frame(&msg).unwrap();
        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.sender.map(|s| s.rank), Some(2));
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let frame = encode_frame(&sample()).unwrap();
        let err = decode_frame(&frame[..frame.len() - 1]).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { .. }));
    }

    #[test]
    fn test_oversized_header_rejected() {
        let header = u32::MAX.to_be_bytes();
        assert!(matches!(
            frame_len(header),
            Err(CodecError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut msg = sample();
        msg.version = 99;
        let body = encode(&msg).unwrap();
        let err = decode(&body).unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnsupportedVersion { received: 99, .. }
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(decode(&[0xFF, 0x01]).is_err());
    }
}
