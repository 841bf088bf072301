//! Shared event model and frame codec for the Parley chat protocol.
//!
//! This crate owns the wire representation used by both `client` and `server`.
//! Structured events travel as JSON text frames tagged with an integer
//! `event_type`; media chunks travel as binary frames whose first 16 bytes are
//! the raw UUID of the stream they belong to. Both frame kinds share one
//! ordered duplex provided by a [`Transport`] implementation.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`event`] | The closed event taxonomy and stable enum wire codes |
//! | [`codec`] | Encoding and decoding of events to/from frames |
//! | [`transport`] | The transport capability trait and an in-memory duplex |

pub mod codec;
pub mod event;
pub mod transport;

pub use codec::{CodecError, FramePayload, decode, encode};
pub use event::{
    AudioFormat, Config, ContentType, Event, EventType, InputMedia, InputMode, InputText,
    Interrupt, InterruptType, OutputAudioContent, OutputContentAddition, OutputFunctionCall,
    OutputFunctionCallContent, OutputMedia, OutputStage, OutputText, OutputTextContent,
    OutputTranscription, OutputVideoContent, Role, Segment, ServerReady, Transcription,
    VideoFormat,
};
pub use transport::{DuplexTransport, Transport, TransportError, duplex};
