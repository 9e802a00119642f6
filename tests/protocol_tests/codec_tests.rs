//! Codec Tests
//!
//! Tests for RESP command encoding and reply decoding.

use std::io::Cursor;

use bytes::Bytes;

use atlas_om::protocol::{
    decode_frame, encode_command, encode_frame, read_frame, write_command, Command, CommandType,
    Frame, MAX_NESTING_DEPTH,
};
use atlas_om::OmError;

// =============================================================================
// Helper Functions
// =============================================================================

fn bulk(s: &str) -> Frame {
    Frame::Bulk(Some(Bytes::copy_from_slice(s.as_bytes())))
}

/// `levels` single-element arrays wrapped around an integer
fn nested_arrays(levels: usize) -> Vec<u8> {
    let mut bytes = b"*1\r\n".repeat(levels);
    bytes.extend_from_slice(b":7\r\n");
    bytes
}

// =============================================================================
// Command Encoding Tests
// =============================================================================

#[test]
fn test_encode_get() {
    let cmd = Command::Get {
        key: "hello".to_string(),
    };
    assert_eq!(encode_command(&cmd), b"*2\r\n$3\r\nGET\r\n$5\r\nhello\r\n".to_vec());
}

#[test]
fn test_encode_ping() {
    assert_eq!(encode_command(&Command::Ping), b"*1\r\n$4\r\nPING\r\n".to_vec());
}

#[test]
fn test_encode_hset_keeps_binary_values() {
    let cmd = Command::HSet {
        key: "dummies:a1".to_string(),
        fields: vec![
            ("name".to_string(), b"Joe".to_vec()),
            ("avatar".to_string(), vec![0x00, b'\r', b'\n', 0xff]),
        ],
    };

    let encoded = encode_command(&cmd);
    let expected: Vec<u8> = [
        &b"*6\r\n$4\r\nHSET\r\n$10\r\ndummies:a1\r\n"[..],
        &b"$4\r\nname\r\n$3\r\nJoe\r\n"[..],
        &b"$6\r\navatar\r\n$4\r\n\x00\r\n\xff\r\n"[..],
    ]
    .concat();
    assert_eq!(encoded, expected);
}

#[test]
fn test_encode_scan_arguments() {
    let cmd = Command::Scan {
        cursor: 17,
        pattern: "idx:*".to_string(),
        count: 500,
    };
    let args: Vec<String> = cmd
        .args()
        .iter()
        .map(|a| String::from_utf8_lossy(a).into_owned())
        .collect();
    assert_eq!(args, vec!["SCAN", "17", "MATCH", "idx:*", "COUNT", "500"]);
}

#[test]
fn test_command_type() {
    let cmd = Command::Expire {
        key: "k".to_string(),
        seconds: 2,
    };
    assert_eq!(cmd.command_type(), CommandType::Expire);
    assert_eq!(cmd.command_type().name(), "EXPIRE");
}

#[test]
fn test_write_command_to_stream() {
    let mut out = Vec::new();
    write_command(
        &mut out,
        &Command::SAdd {
            key: "idx:dummies:name:Joe".to_string(),
            member: "dummies:a1".to_string(),
        },
    )
    .unwrap();

    let (frame, used) = decode_frame(&out).unwrap().unwrap();
    assert_eq!(used, out.len());
    assert_eq!(
        frame,
        Frame::Array(Some(vec![
            bulk("SADD"),
            bulk("idx:dummies:name:Joe"),
            bulk("dummies:a1"),
        ]))
    );
}

// =============================================================================
// Reply Decoding Tests
// =============================================================================

#[test]
fn test_decode_scalars() {
    assert_eq!(
        decode_frame(b"+OK\r\n").unwrap(),
        Some((Frame::Simple("OK".to_string()), 5))
    );
    assert_eq!(
        decode_frame(b":-2\r\n").unwrap(),
        Some((Frame::Integer(-2), 5))
    );
    assert_eq!(
        decode_frame(b"$-1\r\n").unwrap(),
        Some((Frame::Bulk(None), 5))
    );
    assert_eq!(
        decode_frame(b"*-1\r\n").unwrap(),
        Some((Frame::Array(None), 5))
    );
}

#[test]
fn test_decode_incomplete_returns_none() {
    assert_eq!(decode_frame(b"").unwrap(), None);
    assert_eq!(decode_frame(b"$5\r\nhel").unwrap(), None);
    assert_eq!(decode_frame(b"*2\r\n$1\r\na\r\n").unwrap(), None);
}

#[test]
fn test_decode_reports_consumed_bytes() {
    let bytes = b"$3\r\nfoo\r\n+NEXT\r\n";
    let (frame, used) = decode_frame(bytes).unwrap().unwrap();
    assert_eq!(frame, bulk("foo"));
    assert_eq!(used, 9);

    let (next, _) = decode_frame(&bytes[used..]).unwrap().unwrap();
    assert_eq!(next, Frame::Simple("NEXT".to_string()));
}

#[test]
fn test_decode_rejects_unknown_marker() {
    let err = decode_frame(b"!oops\r\n").unwrap_err();
    assert!(matches!(err, OmError::Protocol(_)));
}

#[test]
fn test_decode_rejects_unterminated_bulk() {
    let err = decode_frame(b"$3\r\nfooXY").unwrap_err();
    assert!(matches!(err, OmError::Protocol(_)));
}

#[test]
fn test_encode_frame_decodes_back() {
    let frame = Frame::Array(Some(vec![
        bulk("0"),
        Frame::Array(Some(vec![bulk("dummies:a1"), bulk("dummies:a2")])),
    ]));

    let encoded = encode_frame(&frame);
    assert_eq!(decode_frame(&encoded).unwrap(), Some((frame, encoded.len())));
}

// =============================================================================
// Stream Reading Tests
// =============================================================================

#[test]
fn test_read_frames_from_stream() {
    let mut cursor = Cursor::new(b"+OK\r\n$5\r\nhello\r\n:1\r\n".to_vec());

    assert_eq!(read_frame(&mut cursor).unwrap(), Frame::Simple("OK".to_string()));
    assert_eq!(read_frame(&mut cursor).unwrap(), bulk("hello"));
    assert_eq!(read_frame(&mut cursor).unwrap(), Frame::Integer(1));
}

#[test]
fn test_read_frame_eof_is_io_error() {
    let mut cursor = Cursor::new(Vec::new());
    let err = read_frame(&mut cursor).unwrap_err();
    assert!(matches!(err, OmError::Io(_)));
    assert!(err.is_transient());
}

#[test]
fn test_read_frame_truncated_bulk() {
    let mut cursor = Cursor::new(b"$10\r\nshort\r\n".to_vec());
    assert!(read_frame(&mut cursor).is_err());
}

#[test]
fn test_nesting_depth_limit() {
    let deepest = nested_arrays(MAX_NESTING_DEPTH);
    let (_, used) = decode_frame(&deepest).unwrap().unwrap();
    assert_eq!(used, deepest.len());
    assert!(read_frame(&mut Cursor::new(deepest)).is_ok());

    let too_deep = nested_arrays(MAX_NESTING_DEPTH + 1);
    assert!(matches!(decode_frame(&too_deep).unwrap_err(), OmError::Protocol(_)));
    assert!(matches!(
        read_frame(&mut Cursor::new(too_deep)).unwrap_err(),
        OmError::Protocol(_)
    ));
}

#[test]
fn test_hostile_nesting_fails_without_overflow() {
    let hostile = nested_arrays(1_000_000);
    assert!(decode_frame(&hostile).is_err());
    assert!(read_frame(&mut Cursor::new(hostile)).is_err());
}

// =============================================================================
// Reply Conversion Tests
// =============================================================================

#[test]
fn test_error_reply_conversion() {
    let err = Frame::Error("WRONGTYPE Operation against a key".to_string())
        .into_integer()
        .unwrap_err();
    assert!(matches!(err, OmError::WrongType { .. }));

    let err = Frame::Error("ERR unknown command".to_string())
        .expect_ok()
        .unwrap_err();
    assert!(matches!(err, OmError::Protocol(_)));
}

#[test]
fn test_into_strings() {
    let frame = Frame::Array(Some(vec![bulk("a"), bulk("b")]));
    assert_eq!(frame.into_strings().unwrap(), vec!["a", "b"]);

    assert!(Frame::Array(None).into_strings().unwrap().is_empty());

    let err = Frame::Array(Some(vec![Frame::Bulk(None)]))
        .into_strings()
        .unwrap_err();
    assert!(matches!(err, OmError::Protocol(_)));
}

#[test]
fn test_into_bulk_accepts_status() {
    let payload = Frame::Simple("PONG".to_string()).into_bulk().unwrap();
    assert_eq!(payload, Some(Bytes::from_static(b"PONG")));
}
