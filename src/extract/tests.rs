use super::*;
use crate::mcp::{RequestId, error_codes};

const HANDSHAKE_REPLY: &str = r#"{"jsonrpc": "2.0", "id": 1, "result": {"protocolVersion": "2024-11-05", "capabilities": {}, "serverInfo": {"name": "crypto-trading", "version": "1.0.0"}}}"#;

#[test]
fn single_response_among_noise() {
    for noise_lines in [0usize, 1, 5, 50] {
        let mut text = String::new();
        for i in 0..noise_lines {
            text.push_str(&format!("INFO server starting step {}\n", i));
        }
        text.push_str(HANDSHAKE_REPLY);
        text.push('\n');
        text.push_str("DEBUG shutting down\n");

        let extraction = extract(text.as_bytes());
        assert_eq!(extraction.responses.len(), 1, "noise lines: {}", noise_lines);
        assert_eq!(extraction.responses[0].id, Some(RequestId::Number(1)));
        assert_eq!(extraction.ignored, noise_lines + 1);
    }
}

#[test]
fn response_position_among_noise_does_not_matter() {
    let noise = ["[warn] deprecated config", "Traceback (most recent call last):", "{not json"];
    for position in 0..=noise.len() {
        let mut lines: Vec<&str> = noise.to_vec();
        lines.insert(position, HANDSHAKE_REPLY);
        let text = lines.join("\n");

        let extraction = extract(text.as_bytes());
        assert_eq!(extraction.responses.len(), 1);
    }
}

#[test]
fn undecodable_candidate_is_noise() {
    let text = format!("{}\n{{\"jsonrpc\": \"2.0\", \"id\": 2, \"res\n", HANDSHAKE_REPLY);

    let extraction = extract(text.as_bytes());
    assert_eq!(extraction.responses.len(), 1);
    assert_eq!(extraction.noise, 1);
}

#[test]
fn preserves_stream_order() {
    let text = concat!(
        r#"{"jsonrpc":"2.0","id":3,"result":{}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":1,"result":{}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"Method not found"}}"#,
        "\n",
    );

    let ids: Vec<Option<RequestId>> = extract(text.as_bytes())
        .responses
        .into_iter()
        .map(|response| response.id)
        .collect();
    assert_eq!(
        ids,
        vec![
            Some(RequestId::Number(3)),
            Some(RequestId::Number(1)),
            Some(RequestId::Number(2)),
        ]
    );
}

#[test]
fn leading_whitespace_is_trimmed() {
    let text = format!("   {}\r\n", HANDSHAKE_REPLY);
    assert_eq!(extract(text.as_bytes()).responses.len(), 1);
}

#[test]
fn server_notifications_are_not_responses() {
    let text = concat!(
        r#"{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info"}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#,
        "\n",
    );

    let extraction = extract(text.as_bytes());
    assert_eq!(extraction.server_messages.len(), 1);
    assert_eq!(extraction.responses.len(), 1);
    assert_eq!(
        extraction.responses[0].error_code(),
        Some(error_codes::PARSE_ERROR)
    );
}

#[test]
fn pretty_printed_json_is_missed() {
    let text = "{\n  \"jsonrpc\": \"2.0\",\n  \"id\": 1,\n  \"result\": {}\n}\n";

    let extraction = extract(text.as_bytes());
    assert!(extraction.responses.is_empty());
}

#[test]
fn id_first_envelope_is_missed() {
    let text = r#"{"id": 1, "jsonrpc": "2.0", "result": {}}"#;
    assert!(!is_candidate(text));
    assert!(extract(text.as_bytes()).responses.is_empty());
}

#[test]
fn invalid_utf8_is_tolerated() {
    let mut raw = b"\xff\xfe garbage\n".to_vec();
    raw.extend_from_slice(HANDSHAKE_REPLY.as_bytes());

    assert_eq!(extract(&raw).responses.len(), 1);
}
