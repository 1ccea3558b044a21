// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn roundtrip_preserves_cmds_and_data() {
    let frame = Frame::new(vec!["req".to_string(), "payload".to_string()], b"hello".to_vec());
    let mut buf = Vec::new();
    write_frame(&mut buf, &frame).await.unwrap();

    let mut cursor = std::io::Cursor::new(buf);
    let decoded = read_frame(&mut cursor).await.unwrap();
    assert_eq!(decoded, frame);
}

#[tokio::test]
async fn write_frame_uses_big_endian_length_prefixes() {
    let frame = Frame::new(vec!["ok".to_string()], Vec::new());
    let mut buf = Vec::new();
    write_frame(&mut buf, &frame).await.unwrap();

    let cmd_len = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    let data_len = u32::from_be_bytes(buf[4..8].try_into().unwrap());
    assert_eq!(data_len, 0);
    assert_eq!(buf.len(), 8 + cmd_len as usize);
}

#[tokio::test]
async fn read_frame_rejects_empty_cmds_array() {
    let mut buf = Vec::new();
    let empty: Vec<String> = Vec::new();
    let cmd_bytes = serde_json::to_vec(&empty).unwrap();
    buf.extend((cmd_bytes.len() as u32).to_be_bytes());
    buf.extend(0u32.to_be_bytes());
    buf.extend(cmd_bytes);

    let mut cursor = std::io::Cursor::new(buf);
    let err = read_frame(&mut cursor).await.unwrap_err();
    assert!(matches!(err, WireError::Frame(_)));
}

#[test]
fn err_frame_has_zero_data_len() {
    let frame = Frame::err("wrong cmd");
    assert_eq!(frame.cmds, vec!["err".to_string(), "wrong cmd".to_string()]);
    assert!(frame.data.is_empty());
}

#[test]
fn verb_reads_first_cmd_element() {
    let frame = Frame::new(vec!["reg".to_string(), "s1,s2".to_string()], Vec::new());
    assert_eq!(frame.verb(), Some("reg"));
}
