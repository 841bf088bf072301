//! Frame codec — encodes events to frames and decodes frames back to events.
//!
//! Structured events become text frames carrying a JSON object with an
//! integer `event_type` discriminant. Media chunks become binary frames with
//! a 16-byte raw-UUID prefix followed by the payload bytes; which media event
//! a binary frame decodes to is inferred from the emitting side.

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::event::{
    Config, ContentType, Event, EventType, InputMedia, OutputMedia, Role,
};

/// Length of the raw-UUID prefix on every binary frame.
pub const MEDIA_PREFIX_LEN: usize = 16;

/// One frame as carried by a transport. Frame boundaries are preserved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FramePayload {
    /// A UTF-8 JSON object.
    Text(String),
    /// Opaque bytes: 16-byte stream UUID, then media payload.
    Binary(Vec<u8>),
}

/// Error returned by [`decode`] and, for invalid field values, by [`encode`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text frame was not valid JSON, or a field failed its schema.
    #[error("malformed event payload: {0}")]
    Json(#[from] serde_json::Error),
    /// The `event_type` field was absent or not an integer.
    #[error("missing or non-integer `event_type` field")]
    MissingEventType,
    /// The `event_type` integer does not map to a known event.
    #[error("unknown event type: {0}")]
    UnknownEventType(i64),
    /// An enum-valued field carried an out-of-range integer.
    #[error("invalid `{name}` value: {value}")]
    InvalidEnumValue { name: &'static str, value: i64 },
    /// A content declaration carried a `type` that contradicts its
    /// `event_type`, or no `type` at all.
    #[error("content declaration {event:?} carries wrong `type`: {found:?}")]
    ContentTypeMismatch { event: EventType, found: Option<i64> },
    /// A media event arrived as a text frame; media travels in binary frames.
    #[error("media event {0:?} must be a binary frame")]
    MediaAsText(EventType),
    /// An event payload did not serialize to a JSON object.
    #[error("event payload did not serialize to a JSON object")]
    NonObjectPayload,
    /// A binary frame shorter than the 16-byte UUID prefix.
    #[error("binary frame of {len} bytes is shorter than the {MEDIA_PREFIX_LEN}-byte prefix")]
    ShortBinaryFrame { len: usize },
    /// `silence_duration` outside the legal domain (`-1.0` or `>= 0`).
    #[error("invalid silence_duration: {0}")]
    InvalidSilenceDuration(f64),
}

// =============================================================================
// ENCODING
// =============================================================================

/// Encode an event into the frame that carries it.
///
/// # Errors
///
/// Returns an error if a field violates its wire contract (e.g. an invalid
/// `silence_duration` on [`Config`]); serialization itself cannot fail for
/// well-formed events.
pub fn encode(event: &Event) -> Result<FramePayload, CodecError> {
    match event {
        Event::InputMedia(media) => Ok(FramePayload::Binary(prefixed(media.id, &media.data))),
        Event::OutputMedia(media) => {
            Ok(FramePayload::Binary(prefixed(media.content_id, &media.data)))
        }
        _ => {
            let object = encode_object(event)?;
            Ok(FramePayload::Text(serde_json::to_string(&Value::Object(object))?))
        }
    }
}

fn prefixed(id: Uuid, data: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(MEDIA_PREFIX_LEN + data.len());
    bytes.extend_from_slice(id.as_bytes());
    bytes.extend_from_slice(data);
    bytes
}

fn encode_object(event: &Event) -> Result<Map<String, Value>, CodecError> {
    let mut object = match event {
        Event::Config(config) => {
            config.validate()?;
            object_of(config)?
        }
        Event::InputText(evt) => object_of(evt)?,
        Event::Interrupt(evt) => object_of(evt)?,
        Event::ServerReady(evt) => object_of(evt)?,
        Event::OutputTranscription(evt) => object_of(evt)?,
        Event::OutputStage(evt) => object_of(evt)?,
        Event::OutputTextContent(evt) => object_of(evt)?,
        Event::OutputFunctionCallContent(evt) => object_of(evt)?,
        Event::OutputAudioContent(evt) => object_of(evt)?,
        Event::OutputVideoContent(evt) => object_of(evt)?,
        Event::OutputContentAddition(evt) => object_of(evt)?,
        Event::OutputText(evt) => object_of(evt)?,
        Event::OutputFunctionCall(evt) => object_of(evt)?,
        Event::InputEnd | Event::OutputEnd | Event::SessionEnd => Map::new(),
        Event::InputMedia(_) | Event::OutputMedia(_) => {
            return Err(CodecError::MediaAsText(event.event_type()));
        }
    };

    object.insert("event_type".to_owned(), Value::from(event.event_type().as_i32()));
    if let Some(content_type) = event.declared_content_type() {
        object.insert("type".to_owned(), Value::from(content_type.as_i32()));
    }
    Ok(object)
}

fn object_of<T: Serialize>(payload: &T) -> Result<Map<String, Value>, CodecError> {
    match serde_json::to_value(payload)? {
        Value::Object(object) => Ok(object),
        _ => Err(CodecError::NonObjectPayload),
    }
}

// =============================================================================
// DECODING
// =============================================================================

/// Decode one frame emitted by `from` into a typed event.
///
/// Unknown JSON fields are ignored; missing required fields, unknown event
/// types, invalid UUID strings, and binary frames shorter than the UUID
/// prefix are errors.
///
/// # Errors
///
/// Returns a [`CodecError`] describing the first violation found.
pub fn decode(payload: FramePayload, from: Role) -> Result<Event, CodecError> {
    match payload {
        FramePayload::Text(text) => decode_text(&text),
        FramePayload::Binary(bytes) => decode_binary(&bytes, from),
    }
}

fn decode_text(text: &str) -> Result<Event, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    let code = value
        .get("event_type")
        .and_then(Value::as_i64)
        .ok_or(CodecError::MissingEventType)?;
    let event_type = i32::try_from(code)
        .map_err(|_| CodecError::UnknownEventType(code))
        .and_then(EventType::from_i32)?;

    let event = match event_type {
        EventType::Config => {
            let config: Config = serde_json::from_value(value)?;
            config.validate()?;
            Event::Config(config)
        }
        EventType::InputText => Event::InputText(serde_json::from_value(value)?),
        EventType::InputEnd => Event::InputEnd,
        EventType::Interrupt => Event::Interrupt(serde_json::from_value(value)?),
        EventType::ServerReady => Event::ServerReady(serde_json::from_value(value)?),
        EventType::OutputTranscription => {
            Event::OutputTranscription(serde_json::from_value(value)?)
        }
        EventType::OutputStage => Event::OutputStage(serde_json::from_value(value)?),
        EventType::OutputTextContent => {
            check_content_type(&value, event_type, ContentType::Text)?;
            Event::OutputTextContent(serde_json::from_value(value)?)
        }
        EventType::OutputFunctionCallContent => {
            check_content_type(&value, event_type, ContentType::FunctionCall)?;
            Event::OutputFunctionCallContent(serde_json::from_value(value)?)
        }
        EventType::OutputAudioContent => {
            check_content_type(&value, event_type, ContentType::Audio)?;
            Event::OutputAudioContent(serde_json::from_value(value)?)
        }
        EventType::OutputVideoContent => {
            check_content_type(&value, event_type, ContentType::Video)?;
            Event::OutputVideoContent(serde_json::from_value(value)?)
        }
        EventType::OutputContentAddition => {
            Event::OutputContentAddition(serde_json::from_value(value)?)
        }
        EventType::OutputText => Event::OutputText(serde_json::from_value(value)?),
        EventType::OutputFunctionCall => Event::OutputFunctionCall(serde_json::from_value(value)?),
        EventType::OutputEnd => Event::OutputEnd,
        EventType::SessionEnd => Event::SessionEnd,
        EventType::InputMedia | EventType::OutputMedia => {
            return Err(CodecError::MediaAsText(event_type));
        }
    };
    Ok(event)
}

fn check_content_type(
    value: &Value,
    event: EventType,
    expected: ContentType,
) -> Result<(), CodecError> {
    let found = value.get("type").and_then(Value::as_i64);
    if found == Some(i64::from(expected.as_i32())) {
        Ok(())
    } else {
        Err(CodecError::ContentTypeMismatch { event, found })
    }
}

fn decode_binary(bytes: &[u8], from: Role) -> Result<Event, CodecError> {
    let Some((prefix, data)) = bytes.split_first_chunk::<MEDIA_PREFIX_LEN>() else {
        return Err(CodecError::ShortBinaryFrame { len: bytes.len() });
    };
    let id = Uuid::from_bytes(*prefix);

    Ok(match from {
        Role::Client => Event::InputMedia(InputMedia { id, data: data.to_vec() }),
        Role::Server => Event::OutputMedia(OutputMedia { content_id: id, data: data.to_vec() }),
    })
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod tests;
