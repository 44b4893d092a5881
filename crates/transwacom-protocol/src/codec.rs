//! Wire format: newline-delimited JSON.
//!
//! A receive buffer accumulates bytes; the decoder repeatedly splits at
//! the first `\n`, parses the prefix, and retains the remainder.
//! Malformed lines never terminate the stream at this layer; the
//! session applies the phase-dependent policy (skip vs terminate).

use transwacom_types::Message;

use crate::error::ProtocolError;

/// Maximum accepted line length (64 KiB). Bounds the reassembly buffer
/// against a peer that never sends a newline.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Encode a message as JSON with the newline delimiter.
pub fn encode_message(msg: &Message) -> Result<Vec<u8>, ProtocolError> {
    let mut buf =
        serde_json::to_vec(msg).map_err(|e| ProtocolError::Serialization(e.to_string()))?;
    buf.push(b'\n');
    Ok(buf)
}

/// Outcome of decoding one complete line.
#[derive(Debug)]
pub enum Decoded {
    /// A well-formed message of a known type.
    Message(Message),
    /// A JSON object with an unrecognised `type` value; ignored.
    UnknownType(String),
    /// Not UTF-8, not JSON, or a known type with missing fields.
    Malformed(String),
}

/// Buffered reassembly of newline-delimited messages.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes to the reassembly buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Whether any partial line is still buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Pop the next complete line, if one is buffered.
    ///
    /// Empty lines are skipped. Errors only when the buffered partial
    /// line exceeds [`MAX_LINE_LEN`].
    pub fn next(&mut self) -> Result<Option<Decoded>, ProtocolError> {
        loop {
            let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                if self.buffer.len() > MAX_LINE_LEN {
                    return Err(ProtocolError::LineTooLong { max: MAX_LINE_LEN });
                }
                return Ok(None);
            };

            let line: Vec<u8> = self.buffer.drain(..=pos).take(pos).collect();
            if line.is_empty() {
                continue;
            }
            return Ok(Some(decode_line(&line)));
        }
    }
}

/// Decode a single line (without the trailing newline).
fn decode_line(line: &[u8]) -> Decoded {
    let text = match std::str::from_utf8(line) {
        Ok(t) => t,
        Err(e) => return Decoded::Malformed(format!("invalid UTF-8: {e}")),
    };

    // Peek at the tag first so unknown types can be ignored rather than
    // reported as malformed.
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return Decoded::Malformed(format!("invalid JSON: {e}")),
    };

    let Some(kind) = value.get("type").and_then(|t| t.as_str()) else {
        return Decoded::Malformed("missing type field".to_string());
    };
    let kind = kind.to_string();

    if !matches!(kind.as_str(), "handshake" | "auth_response" | "event" | "disconnect") {
        return Decoded::UnknownType(kind);
    }

    match serde_json::from_value::<Message>(value) {
        Ok(msg) => Decoded::Message(msg),
        Err(e) => Decoded::Malformed(format!("{kind}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transwacom_types::{DeviceDescriptor, DeviceType, InputEvent, PROTOCOL_VERSION};

    fn sample_messages() -> Vec<Message> {
        vec![
            Message::Handshake {
                host_name: "alpha".to_string(),
                host_id: "a1b2c3d4e5f60718".to_string(),
                devices: vec![DeviceDescriptor {
                    device_type: DeviceType::Wacom,
                    path: "/dev/input/event19".to_string(),
                    name: "Wacom Intuos".to_string(),
                    capabilities: vec!["pressure".to_string()],
                    vendor_id: None,
                    product_id: None,
                }],
                version: PROTOCOL_VERSION.to_string(),
            },
            Message::Event {
                device_type: DeviceType::Wacom,
                events: vec![
                    InputEvent::new("ABS_X", 500, 1.0),
                    InputEvent::new("ABS_Y", 600, 1.001),
                    InputEvent::new("SYN_REPORT", 0, 1.002),
                ],
                timestamp: 1.002,
            },
            Message::Disconnect {
                reason: "user_request".to_string(),
                timestamp: 2.0,
            },
        ]
    }

    fn decode_all(decoder: &mut LineDecoder) -> Vec<Message> {
        let mut out = Vec::new();
        while let Some(decoded) = decoder.next().unwrap() {
            if let Decoded::Message(msg) = decoded {
                out.push(msg);
            }
        }
        out
    }

    /// Feed the encoded stream in fixed-size chunks and collect messages.
    fn roundtrip_chunked(messages: &[Message], chunk: usize) -> Vec<Message> {
        let mut wire = Vec::new();
        for msg in messages {
            wire.extend_from_slice(&encode_message(msg).unwrap());
        }

        let mut decoder = LineDecoder::new();
        let mut out = Vec::new();
        for piece in wire.chunks(chunk) {
            decoder.extend(piece);
            out.extend(decode_all(&mut decoder));
        }
        out
    }

    #[test]
    fn roundtrip_whole() {
        let messages = sample_messages();
        let decoded = roundtrip_chunked(&messages, usize::MAX);
        assert_eq!(decoded, messages);
    }

    #[test]
    fn roundtrip_single_byte_chunks() {
        let messages = sample_messages();
        assert_eq!(roundtrip_chunked(&messages, 1), messages);
    }

    #[test]
    fn roundtrip_seven_byte_chunks() {
        let messages = sample_messages();
        assert_eq!(roundtrip_chunked(&messages, 7), messages);
    }

    #[test]
    fn roundtrip_all_but_last_byte() {
        let messages = sample_messages();
        let mut wire = Vec::new();
        for msg in &messages {
            wire.extend_from_slice(&encode_message(msg).unwrap());
        }

        let mut decoder = LineDecoder::new();
        decoder.extend(&wire[..wire.len() - 1]);
        let mut out = decode_all(&mut decoder);
        decoder.extend(&wire[wire.len() - 1..]);
        out.extend(decode_all(&mut decoder));
        assert_eq!(out, messages);
    }

    #[test]
    fn malformed_json_does_not_poison_stream() {
        let mut decoder = LineDecoder::new();
        decoder.extend(b"{not json}\n");
        decoder.extend(&encode_message(&sample_messages()[2]).unwrap());

        assert!(matches!(
            decoder.next().unwrap(),
            Some(Decoded::Malformed(_))
        ));
        assert!(matches!(decoder.next().unwrap(), Some(Decoded::Message(_))));
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let mut decoder = LineDecoder::new();
        decoder.extend(&[0xff, 0xfe, b'\n']);
        assert!(matches!(
            decoder.next().unwrap(),
            Some(Decoded::Malformed(_))
        ));
    }

    #[test]
    fn unknown_type_ignored() {
        let mut decoder = LineDecoder::new();
        decoder.extend(b"{\"type\":\"telemetry\",\"x\":1}\n");
        match decoder.next().unwrap() {
            Some(Decoded::UnknownType(kind)) => assert_eq!(kind, "telemetry"),
            other => panic!("expected UnknownType, got {other:?}"),
        }
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let mut decoder = LineDecoder::new();
        decoder.extend(b"{\"type\":\"auth_response\",\"accepted\":true}\n");
        assert!(matches!(
            decoder.next().unwrap(),
            Some(Decoded::Malformed(_))
        ));
    }

    #[test]
    fn empty_lines_skipped() {
        let mut decoder = LineDecoder::new();
        decoder.extend(b"\n\n");
        decoder.extend(&encode_message(&sample_messages()[2]).unwrap());
        assert!(matches!(decoder.next().unwrap(), Some(Decoded::Message(_))));
    }

    #[test]
    fn oversized_partial_line_errors() {
        let mut decoder = LineDecoder::new();
        decoder.extend(&vec![b'x'; MAX_LINE_LEN + 1]);
        assert!(matches!(
            decoder.next(),
            Err(ProtocolError::LineTooLong { .. })
        ));
    }
}
