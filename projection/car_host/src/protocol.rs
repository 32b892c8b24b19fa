use car_host_runtime::model_host::HostOp;
use car_host_runtime::render::HostScreen;
use car_host_runtime::{BridgeError, EventPayload, MediaEvent, TemplateConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, Read, Write};
use std::sync::mpsc::Receiver;
use tracing::warn;

pub const HEAD_UNIT_TO_BRIDGE_CAP: usize = 1_048_576;
/// Rendered templates carry ids and defaults on top of the registered config.
pub const BRIDGE_TO_HEAD_UNIT_CAP: usize = 4 * HEAD_UNIT_TO_BRIDGE_CAP;

/// Frames written by the head unit (or a test driver) to stdin.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "t", rename_all = "camelCase")]
pub enum HeadUnitEnvelope {
    Connect,
    Start,
    Stop,
    Disconnect,
    Tap {
        #[serde(default)]
        screen: Option<String>,
        id: String,
    },
    Back,
    Media {
        event: MediaEvent,
    },
    Navigate {
        screen: String,
        #[serde(default)]
        params: Option<Value>,
    },
    Register {
        config: Value,
    },
    Update {
        screen: String,
        template: TemplateConfig,
    },
    Pop,
    PopToRoot,
    Finish,
    State,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "t", rename_all = "camelCase")]
pub enum BridgeEnvelope {
    Ready {
        sid: String,
        capabilities: Value,
    },
    Template {
        sid: String,
        op: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        template: Option<HostScreen>,
    },
    Event {
        sid: String,
        name: String,
        payload: EventPayload,
    },
    State {
        sid: String,
        current: Option<String>,
        connected: bool,
    },
    Error {
        sid: String,
        code: String,
        message: String,
    },
}

impl BridgeEnvelope {
    pub fn sid(&self) -> &str {
        match self {
            Self::Ready { sid, .. }
            | Self::Template { sid, .. }
            | Self::Event { sid, .. }
            | Self::State { sid, .. }
            | Self::Error { sid, .. } => sid,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Template { .. } => "template",
            Self::Event { .. } => "event",
            Self::State { .. } => "state",
            Self::Error { .. } => "error",
        }
    }
}

pub fn ready_envelope(sid: &str) -> BridgeEnvelope {
    BridgeEnvelope::Ready {
        sid: sid.to_string(),
        capabilities: serde_json::json!({
            "templates": ["ListTemplate", "MessageTemplate", "PaneTemplate"],
            "transport": "stdio-packet-4"
        }),
    }
}

pub fn template_envelope(sid: &str, op: &HostOp) -> BridgeEnvelope {
    BridgeEnvelope::Template {
        sid: sid.to_string(),
        op: op.name(),
        template: op.screen().cloned(),
    }
}

pub fn event_envelope(sid: &str, name: &str, payload: &EventPayload) -> BridgeEnvelope {
    BridgeEnvelope::Event {
        sid: sid.to_string(),
        name: name.to_string(),
        payload: payload.clone(),
    }
}

pub fn error_envelope(sid: &str, err: &BridgeError) -> BridgeEnvelope {
    BridgeEnvelope::Error {
        sid: sid.to_string(),
        code: err.code().to_string(),
        message: err.to_string(),
    }
}

pub fn writer_loop(rx: Receiver<BridgeEnvelope>) -> io::Result<()> {
    let stdout = io::stdout();
    write_envelopes(&mut stdout.lock(), rx, BRIDGE_TO_HEAD_UNIT_CAP)
}

/// Writes every envelope as a frame. An envelope over `max_payload` is
/// replaced by an `error` frame and the loop carries on.
fn write_envelopes(
    writer: &mut impl Write,
    rx: impl IntoIterator<Item = BridgeEnvelope>,
    max_payload: usize,
) -> io::Result<()> {
    for envelope in rx {
        let mut payload = serde_json::to_vec(&envelope).map_err(json_error)?;
        if payload.len() > max_payload {
            let err = BridgeError::Wire(format!(
                "{} frame too large: {} > {max_payload}",
                envelope.kind(),
                payload.len()
            ));
            warn!(code = err.code(), "{err}");
            payload = serde_json::to_vec(&error_envelope(envelope.sid(), &err)).map_err(json_error)?;
        }
        write_frame(writer, &payload, max_payload)?;
        writer.flush()?;
    }

    Ok(())
}

/// Reads frames until EOF. Undecodable frames are handed to the callback as
/// errors; only transport failures end the loop.
pub fn reader_loop<F>(mut reader: impl Read, mut on_envelope: F) -> io::Result<()>
where
    F: FnMut(Result<HeadUnitEnvelope, serde_json::Error>),
{
    loop {
        match read_frame(&mut reader, HEAD_UNIT_TO_BRIDGE_CAP) {
            Ok(payload) => on_envelope(serde_json::from_slice(&payload)),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}

fn read_frame(reader: &mut impl Read, max_payload: usize) -> io::Result<Vec<u8>> {
    let mut len_buf = [0_u8; 4];
    reader.read_exact(&mut len_buf)?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_payload {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} > {max_payload}"),
        ));
    }

    let mut payload = vec![0_u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

fn write_frame(writer: &mut impl Write, payload: &[u8], max_payload: usize) -> io::Result<()> {
    if payload.len() > max_payload {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {} > {}", payload.len(), max_payload),
        ));
    }

    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "payload exceeds u32"))?;

    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    Ok(())
}

fn json_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use car_host_runtime::render;
    use std::io::Cursor;

    fn framed(payloads: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for payload in payloads {
            write_frame(&mut out, payload, HEAD_UNIT_TO_BRIDGE_CAP).expect("frame write");
        }
        out
    }

    #[test]
    fn length_prefix_is_big_endian() {
        let out = framed(&[b"abc"]);
        assert_eq!(&out[0..4], &[0, 0, 0, 3]);
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let mut cursor = Cursor::new(vec![0, 0, 0, 5, b'a', b'b']);
        let err = read_frame(&mut cursor, HEAD_UNIT_TO_BRIDGE_CAP).expect_err("expected eof");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn oversized_outbound_frame_is_rejected() {
        let payload = vec![b'x'; BRIDGE_TO_HEAD_UNIT_CAP + 1];
        let err = write_frame(&mut Vec::new(), &payload, BRIDGE_TO_HEAD_UNIT_CAP)
            .expect_err("expected too large");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn oversized_envelope_becomes_an_error_frame_and_writing_continues() {
        let huge = event_envelope(
            "S1",
            "onMediaPlayFromId",
            serde_json::json!({"mediaId": "x".repeat(512)})
                .as_object()
                .expect("object"),
        );
        let state = BridgeEnvelope::State {
            sid: "S1".into(),
            current: Some("root".into()),
            connected: true,
        };

        let mut out = Vec::new();
        write_envelopes(&mut out, [huge, state], 256).expect("write");

        let mut cursor = Cursor::new(out);
        let first: Value =
            serde_json::from_slice(&read_frame(&mut cursor, 256).expect("first")).expect("json");
        assert_eq!(first["t"], "error");
        assert_eq!(first["sid"], "S1");
        assert_eq!(first["code"], "WIRE_FORMAT");

        let second: Value =
            serde_json::from_slice(&read_frame(&mut cursor, 256).expect("second")).expect("json");
        assert_eq!(second["t"], "state");
        assert_eq!(second["current"], "root");
    }

    #[test]
    fn reader_reports_bad_frames_and_keeps_going() {
        let input = framed(&[
            br#"{"t":"connect"}"#,
            br#"{"t":"warp"}"#,
            br#"{"t":"tap","screen":"root","id":"root_item_0"}"#,
            br#"{"t":"media","event":{"command":"seekTo","position":5}}"#,
        ]);

        let mut decoded = Vec::new();
        reader_loop(Cursor::new(input), |envelope| decoded.push(envelope)).expect("read");

        assert_eq!(decoded.len(), 4);
        assert!(matches!(decoded[0], Ok(HeadUnitEnvelope::Connect)));
        assert!(decoded[1].is_err());
        match &decoded[2] {
            Ok(HeadUnitEnvelope::Tap { screen, id }) => {
                assert_eq!(screen.as_deref(), Some("root"));
                assert_eq!(id, "root_item_0");
            }
            other => panic!("expected tap, got {other:?}"),
        }
        assert!(matches!(
            decoded[3],
            Ok(HeadUnitEnvelope::Media {
                event: MediaEvent::SeekTo { position: 5 }
            })
        ));
    }

    #[test]
    fn navigate_params_are_optional() {
        let decoded: HeadUnitEnvelope =
            serde_json::from_str(r#"{"t":"navigate","screen":"details"}"#).expect("decode");
        match decoded {
            HeadUnitEnvelope::Navigate { screen, params } => {
                assert_eq!(screen, "details");
                assert!(params.is_none());
            }
            other => panic!("expected navigate, got {other:?}"),
        }
    }

    #[test]
    fn template_envelope_carries_op_and_screen() {
        let op = HostOp::SetRoot(render::placeholder("No screens registered"));
        let value = serde_json::to_value(template_envelope("S1", &op)).expect("encode");
        assert_eq!(value["t"], "template");
        assert_eq!(value["op"], "setRoot");
        assert_eq!(value["template"]["body"]["message"], "No screens registered");

        let pop = serde_json::to_value(template_envelope("S1", &HostOp::Pop)).expect("encode");
        assert!(pop.get("template").is_none());
    }

    #[test]
    fn error_envelope_uses_stable_code() {
        let value = serde_json::to_value(error_envelope(
            "S1",
            &BridgeError::NotFound("missing".into()),
        ))
        .expect("encode");
        assert_eq!(value["code"], "NOT_FOUND");
        assert_eq!(value["message"], "screen 'missing' not found");
    }
}
