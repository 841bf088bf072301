//! Server endpoint driver for the Parley chat protocol.
//!
//! DESIGN
//! ======
//! The mirror image of the `client` driver: a [`Server`] owns one transport
//! through a spawned I/O task, funnels every event through the shared
//! [`Session`] state machine, and exposes inbound client events via
//! [`Server::next_event`]. The emission API builds the response tree —
//! stages, typed contents, chunks — allocating ids as it goes; each method
//! validates against the session before anything reaches the wire.
//!
//! LIFECYCLE
//! =========
//! 1. [`Server::next_event`] yields `Config`
//! 2. [`Server::ready`] announces the request (`chat_id` + `request_id`)
//! 3. Consume the input turn; in AUDIO mode optionally stream
//!    [`Server::transcription`], and with server-side silence detection call
//!    [`Server::end_input`] when the silence window elapses
//! 4. Emit stages, contents, and chunks; finish with [`Server::end_output`]
//! 5. Loop back to 2 for the next request, or [`Server::end_session`]
//!
//! An inbound `Interrupt` narrows the emission API to `end_output`; stale
//! input frames still in flight are dropped by the I/O task.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use session::{Admit, Phase, Session, StateError};
use wire::codec::{self, CodecError};
use wire::event::{
    AudioFormat, Config, Event, OutputAudioContent, OutputContentAddition, OutputFunctionCall,
    OutputFunctionCallContent, OutputMedia, OutputStage, OutputText, OutputTextContent,
    OutputTranscription, OutputVideoContent, Role, ServerReady, Transcription, VideoFormat,
};
use wire::transport::{Transport, TransportError};

/// Frames queued for the I/O task before media writes suspend.
const OUTBOUND_BUFFER: usize = 64;

/// Decoded events buffered for the host.
const EVENT_BUFFER: usize = 256;

/// Error surfaced by server driver operations.
///
/// From [`Server::next_event`] these are terminal; from an emission method
/// they are local usage errors and nothing has been transmitted.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
    #[error("malformed frame: {0}")]
    Codec(#[from] CodecError),
    #[error("protocol violation: {0}")]
    State(#[from] StateError),
    #[error("session closed")]
    Closed,
}

enum Outbound {
    Frame(codec::FramePayload),
    Close,
}

/// The server side of a chat session.
pub struct Server {
    shared: Arc<Mutex<Session>>,
    outbound_tx: mpsc::Sender<Outbound>,
    events_rx: mpsc::Receiver<Result<Event, ServerError>>,
    io: JoinHandle<()>,
    chat_id: Option<Uuid>,
    request_id: Option<Uuid>,
}

impl Server {
    /// Wrap a connected transport and start consuming client frames.
    #[must_use]
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        let shared = Arc::new(Mutex::new(Session::new(Role::Server)));
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let io = tokio::spawn(run_io(transport, Arc::clone(&shared), outbound_rx, events_tx));

        Self { shared, outbound_tx, events_rx, io, chat_id: None, request_id: None }
    }

    /// Receive the next client event, or `None` once the session has ended
    /// cleanly.
    pub async fn next_event(&mut self) -> Result<Option<Event>, ServerError> {
        match self.events_rx.recv().await {
            Some(Ok(event)) => Ok(Some(event)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Announce a request. Allocates any id not supplied: the chat id
    /// honors the client's proposal (or the one already established), the
    /// request id is fresh per request.
    pub async fn ready(
        &mut self,
        chat_id: Option<Uuid>,
        request_id: Option<Uuid>,
    ) -> Result<ServerReady, ServerError> {
        let established = {
            let session = self.shared.lock().await;
            self.chat_id.or_else(|| session.config().and_then(|config| config.chat_id))
        };
        let announce = ServerReady {
            chat_id: chat_id.or(established).unwrap_or_else(Uuid::new_v4),
            request_id: request_id.unwrap_or_else(Uuid::new_v4),
        };
        self.send_event(Event::ServerReady(announce.clone())).await?;
        self.chat_id = Some(announce.chat_id);
        self.request_id = Some(announce.request_id);
        info!(chat_id = %announce.chat_id, request_id = %announce.request_id, "server: request ready");
        Ok(announce)
    }

    /// Stream a partial-or-final transcription of the input audio.
    pub async fn transcription(&mut self, transcription: Transcription) -> Result<(), ServerError> {
        self.send_event(Event::OutputTranscription(OutputTranscription { transcription })).await
    }

    /// Terminate the input turn from the server side. Valid only when
    /// `silence_duration >= 0` made the server the designated emitter.
    pub async fn end_input(&mut self) -> Result<(), ServerError> {
        self.send_event(Event::InputEnd).await
    }

    /// Announce a stage and return its id.
    pub async fn stage(
        &mut self,
        title: &str,
        description: &str,
        parent_id: Option<Uuid>,
    ) -> Result<Uuid, ServerError> {
        let id = Uuid::new_v4();
        self.send_event(Event::OutputStage(OutputStage {
            id,
            parent_id,
            title: title.to_owned(),
            description: description.to_owned(),
        }))
        .await?;
        Ok(id)
    }

    /// Announce a TEXT content under `stage_id` and return its id.
    pub async fn text_content(&mut self, stage_id: Uuid) -> Result<Uuid, ServerError> {
        let id = Uuid::new_v4();
        self.send_event(Event::OutputTextContent(OutputTextContent { id, stage_id })).await?;
        Ok(id)
    }

    /// Announce a FUNCTION_CALL content under `stage_id` and return its id.
    pub async fn function_call_content(&mut self, stage_id: Uuid) -> Result<Uuid, ServerError> {
        let id = Uuid::new_v4();
        self.send_event(Event::OutputFunctionCallContent(OutputFunctionCallContent {
            id,
            stage_id,
        }))
        .await?;
        Ok(id)
    }

    /// Announce an AUDIO content under `stage_id` and return its id.
    pub async fn audio_content(
        &mut self,
        stage_id: Uuid,
        format: AudioFormat,
    ) -> Result<Uuid, ServerError> {
        let id = Uuid::new_v4();
        self.send_event(Event::OutputAudioContent(OutputAudioContent {
            id,
            stage_id,
            nchannels: format.nchannels,
            sample_rate: format.sample_rate,
            sample_width: format.sample_width,
        }))
        .await?;
        Ok(id)
    }

    /// Announce a VIDEO content under `stage_id` and return its id.
    pub async fn video_content(
        &mut self,
        stage_id: Uuid,
        format: VideoFormat,
    ) -> Result<Uuid, ServerError> {
        let id = Uuid::new_v4();
        self.send_event(Event::OutputVideoContent(OutputVideoContent {
            id,
            stage_id,
            fps: format.fps,
            width: format.width,
            height: format.height,
        }))
        .await?;
        Ok(id)
    }

    /// Attach free-form metadata to a previously announced content.
    pub async fn content_addition(
        &mut self,
        content_id: Uuid,
        metadata: Map<String, Value>,
    ) -> Result<(), ServerError> {
        self.send_event(Event::OutputContentAddition(OutputContentAddition {
            content_id,
            metadata,
        }))
        .await
    }

    /// Stream one text fragment into a TEXT content.
    pub async fn write_text(&mut self, content_id: Uuid, chunk: &str) -> Result<(), ServerError> {
        self.send_event(Event::OutputText(OutputText { content_id, data: chunk.to_owned() })).await
    }

    /// Stream one binary chunk into an AUDIO or VIDEO content. May suspend
    /// on transport backpressure.
    pub async fn write_media(&mut self, content_id: Uuid, bytes: &[u8]) -> Result<(), ServerError> {
        self.send_event(Event::OutputMedia(OutputMedia { content_id, data: bytes.to_vec() })).await
    }

    /// Deliver the single JSON payload of a FUNCTION_CALL content.
    pub async fn write_function_call(
        &mut self,
        content_id: Uuid,
        json_data: &str,
    ) -> Result<(), ServerError> {
        self.send_event(Event::OutputFunctionCall(OutputFunctionCall {
            content_id,
            data: json_data.to_owned(),
        }))
        .await
    }

    /// Close the response. Legal once every announced content has received
    /// data, or at any point after an interrupt.
    pub async fn end_output(&mut self) -> Result<(), ServerError> {
        self.send_event(Event::OutputEnd).await?;
        info!(request_id = ?self.request_id, "server: output ended");
        Ok(())
    }

    /// End the session. Idempotent: a second call emits nothing.
    pub async fn end_session(&mut self) -> Result<(), ServerError> {
        let frame = codec::encode(&Event::SessionEnd)?;
        {
            let mut session = self.shared.lock().await;
            if session.phase() == Phase::Terminated {
                return Ok(());
            }
            session.apply_outbound(&Event::SessionEnd)?;
        }
        info!("server: session ended");
        self.outbound_tx.send(Outbound::Frame(frame)).await.map_err(|_| ServerError::Closed)?;
        self.outbound_tx.send(Outbound::Close).await.map_err(|_| ServerError::Closed)
    }

    /// The negotiated session configuration, once `Config` has arrived.
    pub async fn config(&self) -> Option<Config> {
        self.shared.lock().await.config().cloned()
    }

    /// Whether the current request has been interrupted by the client.
    pub async fn is_interrupted(&self) -> bool {
        self.shared.lock().await.is_interrupted()
    }

    /// The session chat id, once announced.
    #[must_use]
    pub fn chat_id(&self) -> Option<Uuid> {
        self.chat_id
    }

    /// The id of the current request, once announced.
    #[must_use]
    pub fn request_id(&self) -> Option<Uuid> {
        self.request_id
    }

    /// Wait for the I/O task to wind down after the session ended.
    pub async fn join(self) {
        let Server { io, .. } = self;
        if let Err(e) = io.await {
            warn!(error = %e, "server: io task failed");
        }
    }

    /// Validate, encode, and queue one event. Nothing is transmitted when
    /// validation fails.
    async fn send_event(&mut self, event: Event) -> Result<(), ServerError> {
        let frame = codec::encode(&event)?;
        self.shared.lock().await.apply_outbound(&event)?;
        self.outbound_tx.send(Outbound::Frame(frame)).await.map_err(|_| ServerError::Closed)
    }
}

/// The I/O task: multiplexes the outbound frame queue and inbound frames
/// over one transport. Exits on session end, transport loss, or protocol
/// violation; inbound failures are forwarded to the host first.
async fn run_io<T: Transport>(
    mut transport: T,
    shared: Arc<Mutex<Session>>,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    events_tx: mpsc::Sender<Result<Event, ServerError>>,
) {
    loop {
        tokio::select! {
            command = outbound_rx.recv() => match command {
                Some(Outbound::Frame(frame)) => {
                    if let Err(e) = transport.send_frame(frame).await {
                        warn!(error = %e, "server: transport send failed");
                        shared.lock().await.terminate();
                        let _ = events_tx.send(Err(ServerError::Transport(e))).await;
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = transport.close().await;
                    break;
                }
            },
            frame = transport.recv() => match frame {
                Ok(Some(payload)) => {
                    if !dispatch_inbound(&mut transport, &shared, &events_tx, payload).await {
                        break;
                    }
                }
                Ok(None) => {
                    info!("server: transport reached end of stream");
                    shared.lock().await.terminate();
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "server: transport receive failed");
                    shared.lock().await.terminate();
                    let _ = events_tx.send(Err(ServerError::Transport(e))).await;
                    break;
                }
            },
        }
    }
}

/// Decode and validate one inbound frame. Returns `false` when the I/O loop
/// must stop.
async fn dispatch_inbound<T: Transport>(
    transport: &mut T,
    shared: &Arc<Mutex<Session>>,
    events_tx: &mpsc::Sender<Result<Event, ServerError>>,
    payload: codec::FramePayload,
) -> bool {
    let event = match codec::decode(payload, Role::Client) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "server: malformed frame from client");
            shared.lock().await.terminate();
            let _ = transport.close().await;
            let _ = events_tx.send(Err(ServerError::Codec(e))).await;
            return false;
        }
    };

    // Advance the state machine before the host can observe the event, and
    // release the lock before the (possibly suspending) channel send.
    let verdict = shared.lock().await.apply_inbound(&event);

    match verdict {
        Ok(Admit::Deliver) => {
            let ended = matches!(event, Event::SessionEnd);
            if events_tx.send(Ok(event)).await.is_err() {
                return false;
            }
            if ended {
                let _ = transport.close().await;
                return false;
            }
            true
        }
        Ok(Admit::Discard) => {
            debug!(event = ?event.event_type(), "server: discarding stale frame");
            true
        }
        Err(e) => {
            warn!(error = %e, "server: protocol violation from client");
            shared.lock().await.terminate();
            let _ = transport.close().await;
            let _ = events_tx.send(Err(ServerError::State(e))).await;
            false
        }
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
