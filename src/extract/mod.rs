//! Response Extractor
//!
//! Pulls JSON-RPC messages out of a target's stdout, which may interleave
//! log lines, banners and other noise with protocol traffic.
//!
//! Detection is a prefix heuristic: a trimmed line is only considered if it
//! starts with [`ENVELOPE_PREFIX`]. Servers that pretty-print, split one
//! message across lines, or serialize `id` before `jsonrpc` are missed.

#[cfg(test)]
mod tests;

use serde_json::Value;
use tracing::debug;

use crate::mcp::JsonRpcResponse;

/// Literal opening of a JSON-RPC envelope as emitted by common serializers
pub const ENVELOPE_PREFIX: &str = r#"{"jsonrpc""#;

/// Result of scanning one stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Responses in the order they appeared
    pub responses: Vec<JsonRpcResponse>,
    /// Decoded envelopes carrying a `method` (server notifications or requests)
    pub server_messages: Vec<Value>,
    /// Candidate lines that failed to decode
    pub noise: usize,
    /// Lines that were not candidates at all
    pub ignored: usize,
}

/// Scan `raw` line by line for JSON-RPC responses
#[inline]
pub fn extract(raw: &[u8]) -> Extraction {
    let text = String::from_utf8_lossy(raw);
    let mut extraction = Extraction::default();

    for line in text.lines() {
        let line = line.trim();
        if !is_candidate(line) {
            if !line.is_empty() {
                extraction.ignored += 1;
            }
            continue;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                debug!("Discarding undecodable candidate line: {}", e);
                extraction.noise += 1;
                continue;
            }
        };

        if value.get("method").is_some() {
            extraction.server_messages.push(value);
            continue;
        }

        match serde_json::from_value::<JsonRpcResponse>(value) {
            Ok(response) => extraction.responses.push(response),
            Err(e) => {
                debug!("Candidate is JSON but not a response envelope: {}", e);
                extraction.noise += 1;
            }
        }
    }

    debug!(
        responses = extraction.responses.len(),
        server_messages = extraction.server_messages.len(),
        noise = extraction.noise,
        ignored = extraction.ignored,
        "Extracted JSON-RPC traffic"
    );
    extraction
}

/// Whether a trimmed line looks like the start of a JSON-RPC envelope
#[inline]
pub fn is_candidate(line: &str) -> bool {
    line.starts_with(ENVELOPE_PREFIX)
}
