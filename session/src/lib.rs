//! Session state machine for the Parley chat protocol.
//!
//! One [`Session`] tracks the legal event sequence of a single chat session
//! from either endpoint's point of view. The machine is role-independent:
//! the same transition rules validate what the local endpoint is about to
//! emit ([`Session::apply_outbound`]) and what just arrived from the peer
//! ([`Session::apply_inbound`]). Drivers own a `Session` each and funnel
//! every event through it before acting on it.
//!
//! A session is a sequence of requests. Each request is announced by a
//! `ServerReady` (fresh `request_id`, stable `chat_id`), takes one input
//! turn, and is answered by a stage/content/chunk tree closed by
//! `OutputEnd`. `SessionEnd` from either side, or transport loss, ends the
//! session for good.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use wire::event::{Config, ContentType, Event, EventType, InputMode, InterruptType, Role};

/// Where a session currently stands, from one endpoint's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Nothing exchanged yet; only `Config` is legal.
    Init,
    /// Configured, or between requests: waiting for the next `ServerReady`.
    AwaitReady,
    /// A request is open and its input turn is in progress.
    AwaitInput,
    /// The input turn has ended; the server is producing output.
    Responding,
    /// `SessionEnd` was exchanged or the transport is gone. Final.
    Terminated,
}

/// What a receiver should do with an inbound event that passed validation.
///
/// After the local endpoint interrupts a request, output events already in
/// flight keep arriving until the server's `OutputEnd`; those are admitted
/// as [`Admit::Discard`] so drivers can drop them without surfacing them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admit {
    /// Deliver the event to the local handler.
    Deliver,
    /// Legal but stale; drop silently.
    Discard,
}

/// A protocol-state violation. Any of these is terminal for the session
/// when raised against an inbound event; against an outbound event it is a
/// local usage error and nothing is transmitted.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("{event:?} is illegal in phase {phase:?} when emitted by {origin:?}")]
    IllegalTransition { event: EventType, phase: Phase, origin: Role },
    #[error("session already terminated")]
    SessionTerminated,
    #[error("request has been interrupted")]
    RequestInterrupted,
    #[error("interrupt already signalled for this request")]
    InterruptRepeated,
    #[error("{event:?} requires input mode {expected:?}")]
    WrongInputMode { event: EventType, expected: InputMode },
    #[error("only one input text is allowed per request")]
    InputTextRepeated,
    #[error("input media stream id changed mid-request")]
    InputStreamMismatch,
    #[error("server ready chat id {got} does not match session chat id {expected}")]
    ChatIdMismatch { expected: Uuid, got: Uuid },
    #[error("duplicate stage id: {0}")]
    DuplicateStage(Uuid),
    #[error("parent stage {parent} not announced for stage {stage}")]
    UnknownParentStage { stage: Uuid, parent: Uuid },
    #[error("duplicate content id: {0}")]
    DuplicateContent(Uuid),
    #[error("stage {stage} not announced for content {content}")]
    UnknownStage { content: Uuid, stage: Uuid },
    #[error("content {0} not announced")]
    UnknownContent(Uuid),
    #[error("content {content} is {actual:?}, which {event:?} cannot target")]
    ContentKindMismatch { content: Uuid, actual: ContentType, event: EventType },
    #[error("content {0} already carries its function call payload")]
    FunctionCallRepeated(Uuid),
    #[error("output ended with contents lacking data: {0:?}")]
    ContentsWithoutData(Vec<Uuid>),
}

/// Request-scoped bookkeeping. Reset on every `ServerReady`.
#[derive(Debug, Default)]
struct RequestState {
    /// Input-audio stream id, fixed by the first chunk of the request.
    input_stream: Option<Uuid>,
    text_sent: bool,
    input_ended: bool,
    interrupted: Option<InterruptType>,
    /// Announced stages: id to parent.
    stages: HashMap<Uuid, Option<Uuid>>,
    /// Announced contents: id to declared type.
    contents: HashMap<Uuid, ContentType>,
    /// Contents that have received at least one chunk or their payload.
    contents_with_data: HashSet<Uuid>,
}

/// The session state machine for one endpoint.
#[derive(Debug)]
pub struct Session {
    role: Role,
    phase: Phase,
    config: Option<Config>,
    chat_id: Option<Uuid>,
    request_id: Option<Uuid>,
    request: RequestState,
}

impl Session {
    /// A fresh session as seen from `role`.
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self {
            role,
            phase: Phase::Init,
            config: None,
            chat_id: None,
            request_id: None,
            request: RequestState::default(),
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The negotiated configuration, once `Config` has been applied.
    #[must_use]
    pub fn config(&self) -> Option<&Config> {
        self.config.as_ref()
    }

    #[must_use]
    pub fn chat_id(&self) -> Option<Uuid> {
        self.chat_id
    }

    /// The id of the current request, once announced.
    #[must_use]
    pub fn request_id(&self) -> Option<Uuid> {
        self.request_id
    }

    /// Whether the current request has been interrupted.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.request.interrupted.is_some()
    }

    /// Validate an event the local endpoint is about to emit. On success the
    /// state has advanced and the event must be sent; on failure nothing may
    /// be transmitted.
    pub fn apply_outbound(&mut self, event: &Event) -> Result<(), StateError> {
        self.apply(self.role, event).map(|_| ())
    }

    /// Validate an event that arrived from the peer and advance the state.
    /// Returns whether the event should be delivered or silently dropped.
    pub fn apply_inbound(&mut self, event: &Event) -> Result<Admit, StateError> {
        self.apply(self.role.peer(), event)
    }

    /// Out-of-band termination: transport closed or task aborted.
    pub fn terminate(&mut self) {
        self.phase = Phase::Terminated;
    }

    fn illegal(&self, origin: Role, event: &Event) -> StateError {
        StateError::IllegalTransition { event: event.event_type(), phase: self.phase, origin }
    }

    fn apply(&mut self, origin: Role, event: &Event) -> Result<Admit, StateError> {
        if self.phase == Phase::Terminated {
            return Err(StateError::SessionTerminated);
        }

        // Events with a fixed emitter must come from that side.
        if let Some(emitter) = event.emitter()
            && emitter != origin
        {
            return Err(self.illegal(origin, event));
        }

        // An interrupted request narrows to its `OutputEnd`. Inbound events
        // still in flight are discarded; local emissions are usage errors.
        if self.request.interrupted.is_some() {
            let receiving = origin != self.role;
            match event {
                Event::OutputEnd | Event::SessionEnd => {}
                Event::Interrupt(_) => return Err(StateError::InterruptRepeated),
                _ if receiving => return Ok(Admit::Discard),
                _ => return Err(StateError::RequestInterrupted),
            }
        }

        match event {
            Event::Config(config) => {
                if self.phase != Phase::Init {
                    return Err(self.illegal(origin, event));
                }
                self.chat_id = config.chat_id;
                self.config = Some(config.clone());
                self.phase = Phase::AwaitReady;
            }

            Event::ServerReady(ready) => {
                if self.phase != Phase::AwaitReady {
                    return Err(self.illegal(origin, event));
                }
                if let Some(expected) = self.chat_id
                    && expected != ready.chat_id
                {
                    return Err(StateError::ChatIdMismatch { expected, got: ready.chat_id });
                }
                self.chat_id = Some(ready.chat_id);
                self.request_id = Some(ready.request_id);
                self.request = RequestState::default();
                self.phase = Phase::AwaitInput;
            }

            Event::InputText(_) => {
                self.check_input(origin, event, InputMode::Text)?;
                if self.request.text_sent {
                    return Err(StateError::InputTextRepeated);
                }
                self.request.text_sent = true;
            }

            Event::InputMedia(media) => {
                self.check_input(origin, event, InputMode::Audio)?;
                match self.request.input_stream {
                    None => self.request.input_stream = Some(media.id),
                    Some(stream) if stream == media.id => {}
                    Some(_) => return Err(StateError::InputStreamMismatch),
                }
            }

            Event::InputEnd => {
                let client_ends = self.config.as_ref().is_some_and(Config::client_ends_input);
                if client_ends && origin == Role::Server {
                    // The server may echo the client's own `InputEnd`, which
                    // can land after the phase already advanced; the echo is
                    // absorbed without a second delivery.
                    if self.request.input_ended {
                        return Ok(Admit::Discard);
                    }
                    return Err(self.illegal(origin, event));
                }
                if self.phase != Phase::AwaitInput
                    || (!client_ends && origin == Role::Client)
                {
                    return Err(self.illegal(origin, event));
                }
                self.request.input_ended = true;
                self.phase = Phase::Responding;
            }

            Event::Interrupt(interrupt) => {
                if !matches!(self.phase, Phase::AwaitInput | Phase::Responding) {
                    return Err(self.illegal(origin, event));
                }
                self.request.interrupted = Some(interrupt.interrupt_type);
            }

            Event::OutputTranscription(_) => {
                if !matches!(self.phase, Phase::AwaitInput | Phase::Responding) {
                    return Err(self.illegal(origin, event));
                }
                if self.input_mode() != Some(InputMode::Audio) {
                    return Err(StateError::WrongInputMode {
                        event: event.event_type(),
                        expected: InputMode::Audio,
                    });
                }
            }

            Event::OutputStage(stage) => {
                if self.phase != Phase::Responding {
                    return Err(self.illegal(origin, event));
                }
                if self.request.stages.contains_key(&stage.id) {
                    return Err(StateError::DuplicateStage(stage.id));
                }
                if let Some(parent) = stage.parent_id
                    && !self.request.stages.contains_key(&parent)
                {
                    return Err(StateError::UnknownParentStage { stage: stage.id, parent });
                }
                self.request.stages.insert(stage.id, stage.parent_id);
            }

            Event::OutputTextContent(content) => {
                self.announce_content(origin, event, content.id, content.stage_id)?;
            }
            Event::OutputFunctionCallContent(content) => {
                self.announce_content(origin, event, content.id, content.stage_id)?;
            }
            Event::OutputAudioContent(content) => {
                self.announce_content(origin, event, content.id, content.stage_id)?;
            }
            Event::OutputVideoContent(content) => {
                self.announce_content(origin, event, content.id, content.stage_id)?;
            }

            Event::OutputContentAddition(addition) => {
                if self.phase != Phase::Responding {
                    return Err(self.illegal(origin, event));
                }
                if !self.request.contents.contains_key(&addition.content_id) {
                    return Err(StateError::UnknownContent(addition.content_id));
                }
            }

            Event::OutputText(text) => {
                self.feed_content(origin, event, text.content_id, ContentType::Text)?;
            }

            Event::OutputFunctionCall(call) => {
                self.feed_content(origin, event, call.content_id, ContentType::FunctionCall)?;
            }

            Event::OutputMedia(media) => {
                if self.phase != Phase::Responding {
                    return Err(self.illegal(origin, event));
                }
                let Some(&actual) = self.request.contents.get(&media.content_id) else {
                    return Err(StateError::UnknownContent(media.content_id));
                };
                if !matches!(actual, ContentType::Audio | ContentType::Video) {
                    return Err(StateError::ContentKindMismatch {
                        content: media.content_id,
                        actual,
                        event: event.event_type(),
                    });
                }
                self.request.contents_with_data.insert(media.content_id);
            }

            Event::OutputEnd => {
                let interrupted = self.request.interrupted.is_some();
                let legal = match self.phase {
                    Phase::Responding => true,
                    // An interrupt during the input turn short-circuits the
                    // request without any `InputEnd`.
                    Phase::AwaitInput => interrupted,
                    _ => false,
                };
                if !legal {
                    return Err(self.illegal(origin, event));
                }
                if !interrupted {
                    let mut starved: Vec<Uuid> = self
                        .request
                        .contents
                        .keys()
                        .filter(|id| !self.request.contents_with_data.contains(*id))
                        .copied()
                        .collect();
                    if !starved.is_empty() {
                        starved.sort();
                        return Err(StateError::ContentsWithoutData(starved));
                    }
                }
                self.phase = Phase::AwaitReady;
            }

            Event::SessionEnd => {
                self.phase = Phase::Terminated;
            }
        }

        Ok(Admit::Deliver)
    }

    fn input_mode(&self) -> Option<InputMode> {
        self.config.as_ref().map(|config| config.input_mode)
    }

    fn check_input(
        &self,
        origin: Role,
        event: &Event,
        required: InputMode,
    ) -> Result<(), StateError> {
        if self.phase != Phase::AwaitInput {
            return Err(self.illegal(origin, event));
        }
        if self.input_mode() != Some(required) {
            return Err(StateError::WrongInputMode {
                event: event.event_type(),
                expected: required,
            });
        }
        Ok(())
    }

    fn announce_content(
        &mut self,
        origin: Role,
        event: &Event,
        id: Uuid,
        stage_id: Uuid,
    ) -> Result<(), StateError> {
        if self.phase != Phase::Responding {
            return Err(self.illegal(origin, event));
        }
        if self.request.contents.contains_key(&id) {
            return Err(StateError::DuplicateContent(id));
        }
        if !self.request.stages.contains_key(&stage_id) {
            return Err(StateError::UnknownStage { content: id, stage: stage_id });
        }
        let Some(kind) = event.declared_content_type() else {
            return Err(self.illegal(origin, event));
        };
        self.request.contents.insert(id, kind);
        Ok(())
    }

    fn feed_content(
        &mut self,
        origin: Role,
        event: &Event,
        content_id: Uuid,
        required: ContentType,
    ) -> Result<(), StateError> {
        if self.phase != Phase::Responding {
            return Err(self.illegal(origin, event));
        }
        let Some(&actual) = self.request.contents.get(&content_id) else {
            return Err(StateError::UnknownContent(content_id));
        };
        if actual != required {
            return Err(StateError::ContentKindMismatch {
                content: content_id,
                actual,
                event: event.event_type(),
            });
        }
        if required == ContentType::FunctionCall
            && self.request.contents_with_data.contains(&content_id)
        {
            return Err(StateError::FunctionCallRepeated(content_id));
        }
        self.request.contents_with_data.insert(content_id);
        Ok(())
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
