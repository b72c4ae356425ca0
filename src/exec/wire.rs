//! Child -> supervisor status pipe protocol.
//!
//! The child writes a single [`LAUNCH_ACK`] byte once it is running, then one
//! length-prefixed frame (`u64` little-endian length, JSON document) holding
//! the work's result, then exits. A killed child never completes the frame,
//! and a truncated frame is treated as no report at all.

use crate::config::types::{Result, SupervisorError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::io::{self, ErrorKind, Read, Write};

pub const LAUNCH_ACK: u8 = 0x06;

/// Largest report frame accepted from a child.
pub const MAX_REPORT_BYTES: u64 = 64 * 1024 * 1024;

/// Result document as written by the child.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Report<T, E> {
    Value(T),
    Error(E),
    Panic(String),
}

pub fn encode_result<T: Serialize, E: Serialize>(result: std::result::Result<T, E>) -> Vec<u8> {
    let report = match result {
        Ok(value) => Report::Value(value),
        Err(error) => Report::Error(error),
    };
    match serde_json::to_vec(&report) {
        Ok(bytes) => bytes,
        Err(e) => encode_panic(&format!("work result could not be encoded: {e}")),
    }
}

pub fn encode_panic(message: &str) -> Vec<u8> {
    let report: Report<(), ()> = Report::Panic(message.to_string());
    serde_json::to_vec(&report).unwrap_or_default()
}

pub fn decode<T: DeserializeOwned, E: DeserializeOwned>(payload: &[u8]) -> Result<Report<T, E>> {
    serde_json::from_slice(payload).map_err(|e| {
        SupervisorError::Protocol(format!(
            "failed to decode {} byte work report: {e}",
            payload.len()
        ))
    })
}

pub fn write_ack<W: Write>(out: &mut W) -> io::Result<()> {
    out.write_all(&[LAUNCH_ACK])
}

/// Read the launch acknowledgement. `Ok(false)` means the pipe closed first.
pub fn read_ack<R: Read>(input: &mut R) -> io::Result<bool> {
    let mut byte = [0u8; 1];
    match input.read_exact(&mut byte) {
        Ok(()) if byte[0] == LAUNCH_ACK => Ok(true),
        Ok(()) => Err(io::Error::new(
            ErrorKind::InvalidData,
            format!("unexpected launch byte {:#04x}", byte[0]),
        )),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

pub fn write_frame<W: Write>(out: &mut W, payload: &[u8]) -> io::Result<()> {
    out.write_all(&(payload.len() as u64).to_le_bytes())?;
    out.write_all(payload)?;
    out.flush()
}

/// Read one report frame. `Ok(None)` when the writer went away before the
/// frame was complete.
pub fn read_frame<R: Read>(input: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 8];
    match input.read_exact(&mut len_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u64::from_le_bytes(len_bytes);
    if len > MAX_REPORT_BYTES {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!("report frame of {len} bytes exceeds {MAX_REPORT_BYTES} byte limit"),
        ));
    }

    let mut payload = vec![0u8; len as usize];
    match input.read_exact(&mut payload) {
        Ok(()) => Ok(Some(payload)),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "work panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;

    #[test]
    fn value_document_shape() {
        let bytes = encode_result::<u64, String>(Ok(42));
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"kind":"value","body":42}"#
        );
    }

    #[test]
    fn error_is_decoded_unchanged() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        enum MathError {
            DivisionByZero,
        }

        let bytes = encode_result::<u64, MathError>(Err(MathError::DivisionByZero));
        let report: Report<u64, MathError> = decode(&bytes).unwrap();
        assert_eq!(report, Report::Error(MathError::DivisionByZero));
    }

    #[test]
    fn unencodable_value_becomes_panic_report() {
        struct Unencodable;

        impl Serialize for Unencodable {
            fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
                Err(S::Error::custom("refusing to serialize"))
            }
        }

        let bytes = encode_result::<Unencodable, ()>(Ok(Unencodable));
        let report: Report<u64, String> = decode(&bytes).unwrap();
        match report {
            Report::Panic(message) => assert!(message.contains("refusing to serialize")),
            other => panic!("expected panic report, got {other:?}"),
        }
    }

    #[test]
    fn panic_report_decodes_for_any_result_types() {
        let bytes = encode_panic("boom");
        let report: Report<Vec<String>, i32> = decode(&bytes).unwrap();
        assert_eq!(report, Report::Panic("boom".to_string()));
    }

    #[test]
    fn truncated_document_is_protocol_error() {
        let bytes = encode_result::<u64, String>(Ok(42));
        let err = decode::<u64, String>(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, SupervisorError::Protocol(_)));
    }

    #[test]
    fn ack_then_frame_round_trip_over_a_stream() {
        let mut stream = Vec::new();
        write_ack(&mut stream).unwrap();
        write_frame(&mut stream, br#"{"kind":"value","body":1}"#).unwrap();

        let mut input = stream.as_slice();
        assert!(read_ack(&mut input).unwrap());
        let payload = read_frame(&mut input).unwrap().expect("complete frame");
        assert_eq!(decode::<u8, ()>(&payload).unwrap(), Report::Value(1));
    }

    #[test]
    fn closed_pipe_before_ack_is_not_an_error() {
        let mut input: &[u8] = &[];
        assert!(!read_ack(&mut input).unwrap());
    }

    #[test]
    fn wrong_ack_byte_is_rejected() {
        let mut input: &[u8] = &[0x00];
        assert_eq!(
            read_ack(&mut input).unwrap_err().kind(),
            ErrorKind::InvalidData
        );
    }

    #[test]
    fn truncated_frame_reads_as_no_report() {
        let mut stream = Vec::new();
        write_frame(&mut stream, b"0123456789").unwrap();
        stream.truncate(12);

        let mut input = stream.as_slice();
        assert_eq!(read_frame(&mut input).unwrap(), None);
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let bytes = (MAX_REPORT_BYTES + 1).to_le_bytes();
        let mut input = &bytes[..];
        assert_eq!(
            read_frame(&mut input).unwrap_err().kind(),
            ErrorKind::InvalidData
        );
    }

    #[test]
    fn panic_message_handles_str_and_string() {
        let payload = std::panic::catch_unwind(|| panic!("static text")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static text");

        let payload = std::panic::catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 7");
    }
}
