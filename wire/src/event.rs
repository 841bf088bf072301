//! Event taxonomy — the closed set of protocol events and their wire codes.
//!
//! Every structured message exchanged between the two endpoints is one of the
//! [`Event`] variants below. Enum-valued fields map to stable integers on the
//! wire; the mappings are pinned by tests and must never be renumbered.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::codec::CodecError;

// =============================================================================
// ROLES
// =============================================================================

/// Which endpoint of the session emitted (or is emitting) a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// The configuring endpoint: sends input, consumes output.
    Client,
    /// The responding endpoint: consumes input, produces output.
    Server,
}

impl Role {
    /// The opposite endpoint.
    #[must_use]
    pub fn peer(self) -> Self {
        match self {
            Self::Client => Self::Server,
            Self::Server => Self::Client,
        }
    }
}

// =============================================================================
// WIRE ENUMS
// =============================================================================

/// How the client delivers its input turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum InputMode {
    /// Streamed binary audio chunks terminated by `InputEnd`.
    Audio = 0,
    /// A single `InputText` followed by `InputEnd`.
    #[default]
    Text = 1,
}

/// The modality of an output content unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum ContentType {
    Audio = 0,
    Video = 1,
    Text = 2,
    FunctionCall = 3,
}

/// Why the client interrupted the current request. Informational only; both
/// variants have identical wire semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum InterruptType {
    User = 0,
    System = 1,
}

/// Discriminant carried in the `event_type` field of every text frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Config = 0,
    InputText = 1,
    InputMedia = 2,
    InputEnd = 3,
    Interrupt = 4,
    ServerReady = 5,
    OutputTranscription = 6,
    OutputStage = 7,
    OutputTextContent = 8,
    OutputFunctionCallContent = 9,
    OutputAudioContent = 10,
    OutputVideoContent = 11,
    OutputContentAddition = 12,
    OutputText = 13,
    OutputMedia = 14,
    OutputFunctionCall = 15,
    OutputEnd = 16,
    SessionEnd = 17,
}

impl InputMode {
    /// Convert into the wire integer value.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Parse from the wire integer value.
    pub fn from_i32(value: i32) -> Result<Self, CodecError> {
        match value {
            0 => Ok(Self::Audio),
            1 => Ok(Self::Text),
            _ => Err(CodecError::InvalidEnumValue { name: "input_mode", value: i64::from(value) }),
        }
    }
}

impl ContentType {
    /// Convert into the wire integer value.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Parse from the wire integer value.
    pub fn from_i32(value: i32) -> Result<Self, CodecError> {
        match value {
            0 => Ok(Self::Audio),
            1 => Ok(Self::Video),
            2 => Ok(Self::Text),
            3 => Ok(Self::FunctionCall),
            _ => Err(CodecError::InvalidEnumValue { name: "type", value: i64::from(value) }),
        }
    }
}

impl InterruptType {
    /// Convert into the wire integer value.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Parse from the wire integer value.
    pub fn from_i32(value: i32) -> Result<Self, CodecError> {
        match value {
            0 => Ok(Self::User),
            1 => Ok(Self::System),
            _ => Err(CodecError::InvalidEnumValue {
                name: "interrupt_type",
                value: i64::from(value),
            }),
        }
    }
}

impl EventType {
    /// Convert into the wire integer value.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Parse from the wire integer value.
    pub fn from_i32(value: i32) -> Result<Self, CodecError> {
        match value {
            0 => Ok(Self::Config),
            1 => Ok(Self::InputText),
            2 => Ok(Self::InputMedia),
            3 => Ok(Self::InputEnd),
            4 => Ok(Self::Interrupt),
            5 => Ok(Self::ServerReady),
            6 => Ok(Self::OutputTranscription),
            7 => Ok(Self::OutputStage),
            8 => Ok(Self::OutputTextContent),
            9 => Ok(Self::OutputFunctionCallContent),
            10 => Ok(Self::OutputAudioContent),
            11 => Ok(Self::OutputVideoContent),
            12 => Ok(Self::OutputContentAddition),
            13 => Ok(Self::OutputText),
            14 => Ok(Self::OutputMedia),
            15 => Ok(Self::OutputFunctionCall),
            16 => Ok(Self::OutputEnd),
            17 => Ok(Self::SessionEnd),
            _ => Err(CodecError::UnknownEventType(i64::from(value))),
        }
    }
}

impl From<InputMode> for i32 {
    fn from(value: InputMode) -> Self {
        value.as_i32()
    }
}

impl TryFrom<i32> for InputMode {
    type Error = CodecError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_i32(value)
    }
}

impl From<ContentType> for i32 {
    fn from(value: ContentType) -> Self {
        value.as_i32()
    }
}

impl TryFrom<i32> for ContentType {
    type Error = CodecError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_i32(value)
    }
}

impl From<InterruptType> for i32 {
    fn from(value: InterruptType) -> Self {
        value.as_i32()
    }
}

impl TryFrom<i32> for InterruptType {
    type Error = CodecError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_i32(value)
    }
}

// =============================================================================
// MEDIA FORMATS
// =============================================================================

/// PCM audio stream parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioFormat {
    pub nchannels: u32,
    pub sample_rate: u32,
    pub sample_width: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self { nchannels: 1, sample_rate: 16_000, sample_width: 2 }
    }
}

/// Video stream parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoFormat {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

// =============================================================================
// CLIENT -> SERVER EVENTS
// =============================================================================

/// Session configuration. First event of every session, sent by the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Existing chat to resume. The server allocates one if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<Uuid>,
    #[serde(default)]
    pub input_mode: InputMode,
    /// Milliseconds of silence after which the server ends the input turn.
    /// The sentinel `-1.0` means the client device detects end-of-speech and
    /// emits `InputEnd` itself.
    #[serde(default = "default_silence_duration")]
    pub silence_duration: f64,
    #[serde(default = "default_nchannels")]
    pub nchannels: u32,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_sample_width")]
    pub sample_width: u32,
    #[serde(default = "default_true")]
    pub output_text: bool,
    #[serde(default = "default_true")]
    pub output_audio: bool,
    #[serde(default = "default_true")]
    pub output_video: bool,
}

fn default_silence_duration() -> f64 {
    Config::DEVICE_SILENCE
}

fn default_nchannels() -> u32 {
    1
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_sample_width() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chat_id: None,
            input_mode: InputMode::default(),
            silence_duration: Self::DEVICE_SILENCE,
            nchannels: default_nchannels(),
            sample_rate: default_sample_rate(),
            sample_width: default_sample_width(),
            output_text: true,
            output_audio: true,
            output_video: true,
        }
    }
}

impl Config {
    /// Sentinel `silence_duration` meaning the client device detects
    /// end-of-speech.
    pub const DEVICE_SILENCE: f64 = -1.0;

    /// Validate field constraints that the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidSilenceDuration`] for a non-finite value
    /// or a negative value other than the `-1.0` sentinel.
    #[allow(clippy::float_cmp)]
    pub fn validate(&self) -> Result<(), CodecError> {
        if !self.silence_duration.is_finite()
            || (self.silence_duration < 0.0 && self.silence_duration != Self::DEVICE_SILENCE)
        {
            return Err(CodecError::InvalidSilenceDuration(self.silence_duration));
        }
        Ok(())
    }

    /// Whether the client is the designated emitter of `InputEnd`: always in
    /// TEXT mode; in AUDIO mode only when the client device detects
    /// end-of-speech (`silence_duration == -1.0`).
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn client_ends_input(&self) -> bool {
        self.input_mode == InputMode::Text || self.silence_duration == Self::DEVICE_SILENCE
    }
}

/// The single text input of a TEXT-mode request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputText {
    pub data: String,
}

/// One binary chunk of client input audio. Travels as a binary frame tagged
/// with the request's input stream id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputMedia {
    /// Input stream identifier, constant for all chunks of one request.
    pub id: Uuid,
    pub data: Vec<u8>,
}

/// In-band cancellation of the current request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    pub interrupt_type: InterruptType,
}

// =============================================================================
// SERVER -> CLIENT EVENTS
// =============================================================================

/// Announces a new request: the session `chat_id` plus a fresh `request_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerReady {
    pub chat_id: Uuid,
    pub request_id: Uuid,
}

/// One timed span of transcribed input speech.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    /// Span start in seconds from the beginning of the input turn.
    pub start: f64,
    /// Span end in seconds from the beginning of the input turn.
    pub end: f64,
}

/// Partial-or-final textual view of the input audio. Receivers treat the
/// internals as opaque; the only contract is lossless JSON round-tripping.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub segments: Vec<Segment>,
}

/// Transcription of the in-progress input turn, emitted concurrently with
/// input audio chunks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputTranscription {
    pub transcription: Transcription,
}

/// A logical step of the response. Stages form a forest per request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputStage {
    pub id: Uuid,
    /// Parent stage, previously announced in the same request. Absent or
    /// null for a root stage.
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub title: String,
    pub description: String,
}

/// Declares a TEXT content unit under a stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputTextContent {
    pub id: Uuid,
    pub stage_id: Uuid,
}

/// Declares a FUNCTION_CALL content unit under a stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputFunctionCallContent {
    pub id: Uuid,
    pub stage_id: Uuid,
}

/// Declares an AUDIO content unit under a stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputAudioContent {
    pub id: Uuid,
    pub stage_id: Uuid,
    pub nchannels: u32,
    pub sample_rate: u32,
    pub sample_width: u32,
}

impl OutputAudioContent {
    /// The audio stream parameters carried by this declaration.
    #[must_use]
    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            nchannels: self.nchannels,
            sample_rate: self.sample_rate,
            sample_width: self.sample_width,
        }
    }
}

/// Declares a VIDEO content unit under a stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputVideoContent {
    pub id: Uuid,
    pub stage_id: Uuid,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

impl OutputVideoContent {
    /// The video stream parameters carried by this declaration.
    #[must_use]
    pub fn format(&self) -> VideoFormat {
        VideoFormat { fps: self.fps, width: self.width, height: self.height }
    }
}

/// Free-form metadata attached to a previously announced content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputContentAddition {
    pub content_id: Uuid,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// One streamed fragment of a TEXT content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputText {
    pub content_id: Uuid,
    pub data: String,
}

/// The single, atomic JSON payload of a FUNCTION_CALL content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputFunctionCall {
    pub content_id: Uuid,
    pub data: String,
}

/// One binary chunk of an AUDIO or VIDEO content. Travels as a binary frame
/// tagged with the content id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputMedia {
    pub content_id: Uuid,
    pub data: Vec<u8>,
}

// =============================================================================
// EVENT
// =============================================================================

/// The closed set of protocol events. Variants without payload fields carry
/// nothing on the wire beyond their `event_type`.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Config(Config),
    InputText(InputText),
    InputMedia(InputMedia),
    InputEnd,
    Interrupt(Interrupt),
    ServerReady(ServerReady),
    OutputTranscription(OutputTranscription),
    OutputStage(OutputStage),
    OutputTextContent(OutputTextContent),
    OutputFunctionCallContent(OutputFunctionCallContent),
    OutputAudioContent(OutputAudioContent),
    OutputVideoContent(OutputVideoContent),
    OutputContentAddition(OutputContentAddition),
    OutputText(OutputText),
    OutputMedia(OutputMedia),
    OutputFunctionCall(OutputFunctionCall),
    OutputEnd,
    SessionEnd,
}

impl Event {
    /// The wire discriminant of this event.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Config(_) => EventType::Config,
            Self::InputText(_) => EventType::InputText,
            Self::InputMedia(_) => EventType::InputMedia,
            Self::InputEnd => EventType::InputEnd,
            Self::Interrupt(_) => EventType::Interrupt,
            Self::ServerReady(_) => EventType::ServerReady,
            Self::OutputTranscription(_) => EventType::OutputTranscription,
            Self::OutputStage(_) => EventType::OutputStage,
            Self::OutputTextContent(_) => EventType::OutputTextContent,
            Self::OutputFunctionCallContent(_) => EventType::OutputFunctionCallContent,
            Self::OutputAudioContent(_) => EventType::OutputAudioContent,
            Self::OutputVideoContent(_) => EventType::OutputVideoContent,
            Self::OutputContentAddition(_) => EventType::OutputContentAddition,
            Self::OutputText(_) => EventType::OutputText,
            Self::OutputMedia(_) => EventType::OutputMedia,
            Self::OutputFunctionCall(_) => EventType::OutputFunctionCall,
            Self::OutputEnd => EventType::OutputEnd,
            Self::SessionEnd => EventType::SessionEnd,
        }
    }

    /// The endpoint that is allowed to emit this event, or `None` when the
    /// emitter depends on session state (`InputEnd`) or either side may emit
    /// (`SessionEnd`).
    #[must_use]
    pub fn emitter(&self) -> Option<Role> {
        match self {
            Self::Config(_) | Self::InputText(_) | Self::InputMedia(_) | Self::Interrupt(_) => {
                Some(Role::Client)
            }
            Self::ServerReady(_)
            | Self::OutputTranscription(_)
            | Self::OutputStage(_)
            | Self::OutputTextContent(_)
            | Self::OutputFunctionCallContent(_)
            | Self::OutputAudioContent(_)
            | Self::OutputVideoContent(_)
            | Self::OutputContentAddition(_)
            | Self::OutputText(_)
            | Self::OutputMedia(_)
            | Self::OutputFunctionCall(_)
            | Self::OutputEnd => Some(Role::Server),
            Self::InputEnd | Self::SessionEnd => None,
        }
    }

    /// The content type a typed content declaration announces, if this event
    /// is one.
    #[must_use]
    pub fn declared_content_type(&self) -> Option<ContentType> {
        match self {
            Self::OutputTextContent(_) => Some(ContentType::Text),
            Self::OutputFunctionCallContent(_) => Some(ContentType::FunctionCall),
            Self::OutputAudioContent(_) => Some(ContentType::Audio),
            Self::OutputVideoContent(_) => Some(ContentType::Video),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
