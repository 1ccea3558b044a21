// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-facing TCP frame codec: `[u32 cmdLen][u32 dataLen][cmdLen
//! bytes of a JSON array of strings][dataLen bytes of raw payload]`,
//! both lengths big-endian.

use crate::protocol::WireError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// One decoded frame: a non-empty commands array plus an opaque data
/// block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub cmds: Vec<String>,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(cmds: Vec<String>, data: Vec<u8>) -> Self {
        Self { cmds, data }
    }

    pub fn ok(args: Vec<String>) -> Self {
        let mut cmds = vec!["ok".to_string()];
        cmds.extend(args);
        Self { cmds, data: Vec::new() }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self { cmds: vec!["err".to_string(), message.into()], data: Vec::new() }
    }

    pub fn verb(&self) -> Option<&str> {
        self.cmds.first().map(String::as_str)
    }
}

pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, frame: &Frame) -> Result<(), WireError> {
    let cmd_bytes = serde_json::to_vec(&frame.cmds).map_err(WireError::Decode)?;
    if cmd_bytes.len() > u32::MAX as usize || frame.data.len() > u32::MAX as usize {
        return Err(WireError::Frame("frame section exceeds u32 length".to_string()));
    }
    w.write_u32(cmd_bytes.len() as u32).await.map_err(|e| WireError::Frame(e.to_string()))?;
    w.write_u32(frame.data.len() as u32).await.map_err(|e| WireError::Frame(e.to_string()))?;
    w.write_all(&cmd_bytes).await.map_err(|e| WireError::Frame(e.to_string()))?;
    w.write_all(&frame.data).await.map_err(|e| WireError::Frame(e.to_string()))?;
    w.flush().await.map_err(|e| WireError::Frame(e.to_string()))?;
    Ok(())
}

pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> Result<Frame, WireError> {
    let cmd_len = r.read_u32().await.map_err(|e| WireError::Frame(e.to_string()))? as usize;
    let data_len = r.read_u32().await.map_err(|e| WireError::Frame(e.to_string()))? as usize;

    let mut cmd_bytes = vec![0u8; cmd_len];
    r.read_exact(&mut cmd_bytes).await.map_err(|e| WireError::Frame(e.to_string()))?;
    let cmds: Vec<String> = serde_json::from_slice(&cmd_bytes).map_err(WireError::Decode)?;
    if cmds.is_empty() {
        return Err(WireError::Frame("frame cmds array must have at least one element".to_string()));
    }

    let mut data = vec![0u8; data_len];
    r.read_exact(&mut data).await.map_err(|e| WireError::Frame(e.to_string()))?;

    Ok(Frame { cmds, data })
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
