//! Hosted sandbox API request and response types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// CONTROL PLANE
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct NewSandbox {
    #[serde(rename = "templateID")]
    pub template_id: String,
    /// Seconds until the sandbox is reaped
    pub timeout: u64,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectSandbox {
    pub timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SandboxInfo {
    #[serde(rename = "sandboxID")]
    pub sandbox_id: String,
    #[serde(rename = "envdAccessToken", default)]
    pub envd_access_token: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub message: String,
}

// ============================================================================
// PROCESS SERVICE
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StartRequest {
    pub process: ProcessConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessConfig {
    pub cmd: String,
    pub args: Vec<String>,
    pub envs: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

impl ProcessConfig {
    /// Run `command` through a login shell.
    pub fn shell(command: &str, envs: HashMap<String, String>, cwd: Option<String>) -> Self {
        Self {
            cmd: "/bin/bash".to_string(),
            args: vec!["-l".to_string(), "-c".to_string(), command.to_string()],
            envs,
            cwd,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartResponse {
    #[serde(default)]
    pub event: Option<ProcessEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessEvent {
    #[serde(default)]
    pub data: Option<DataEvent>,
    #[serde(default)]
    pub end: Option<EndEvent>,
}

/// Output chunk; payloads are base64 encoded.
#[derive(Debug, Clone, Deserialize)]
pub struct DataEvent {
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndEvent {
    #[serde(rename = "exitCode", default)]
    pub exit_code: i32,
    #[serde(default)]
    pub error: Option<String>,
}

/// Trailer frame of a streaming response.
#[derive(Debug, Clone, Deserialize)]
pub struct EndStream {
    #[serde(default)]
    pub error: Option<EndStreamError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndStreamError {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

// ============================================================================
// ENVELOPE FRAMING
// ============================================================================

/// Flag marking the final frame of a stream.
pub const END_STREAM_FLAG: u8 = 0x02;

/// Wrap a message in a 5-byte streaming envelope (flags + big-endian length).
pub fn encode_envelope(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 5);
    frame.push(0);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Incremental decoder for enveloped frames arriving in arbitrary chunks.
#[derive(Debug, Default)]
pub struct EnvelopeDecoder {
    buffer: Vec<u8>,
}

impl EnvelopeDecoder {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Next complete frame as `(flags, payload)`.
    pub fn next_frame(&mut self) -> Option<(u8, Vec<u8>)> {
        if self.buffer.len() < 5 {
            return None;
        }
        let len = u32::from_be_bytes([
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
            self.buffer[4],
        ]) as usize;
        if self.buffer.len() < 5 + len {
            return None;
        }
        let flags = self.buffer[0];
        let payload = self.buffer[5..5 + len].to_vec();
        self.buffer.drain(..5 + len);
        Some((flags, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_split_across_chunks() {
        let frame = encode_envelope(br#"{"event":{}}"#);
        let mut decoder = EnvelopeDecoder::default();
        decoder.push(&frame[..3]);
        assert!(decoder.next_frame().is_none());
        decoder.push(&frame[3..]);
        let (flags, payload) = decoder.next_frame().unwrap();
        assert_eq!(flags, 0);
        assert_eq!(payload, br#"{"event":{}}"#.to_vec());
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_two_frames_in_one_chunk() {
        let mut bytes = encode_envelope(b"a");
        bytes.extend(encode_envelope(b"bc"));
        let mut decoder = EnvelopeDecoder::default();
        decoder.push(&bytes);
        assert_eq!(decoder.next_frame().unwrap().1, b"a".to_vec());
        assert_eq!(decoder.next_frame().unwrap().1, b"bc".to_vec());
    }

    #[test]
    fn test_end_event_parses() {
        let response: StartResponse =
            serde_json::from_str(r#"{"event":{"end":{"exitCode":3,"exited":true,"status":"exit status 3"}}}"#)
                .unwrap();
        let end = response.event.unwrap().end.unwrap();
        assert_eq!(end.exit_code, 3);
    }

    #[test]
    fn test_shell_process_config() {
        let config = ProcessConfig::shell("ls -la", HashMap::new(), None);
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["args"][2], "ls -la");
        assert!(value.get("cwd").is_none());
    }
}
