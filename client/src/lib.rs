//! Client endpoint driver for the Parley chat protocol.
//!
//! DESIGN
//! ======
//! A [`Client`] owns one transport through a spawned I/O task running a
//! `select!` loop over inbound frames and an outbound frame queue. Every
//! event passes through the shared [`Session`] state machine before it is
//! acted on: outbound sends validate under the lock and nothing is
//! transmitted on failure; inbound frames are decoded, validated, and
//! forwarded to the host through [`Client::next_event`]. Stale frames of an
//! interrupted request are dropped by the I/O task and never reach the host.
//!
//! LIFECYCLE
//! =========
//! 1. [`Client::configure`] sends `Config` and resolves on `ServerReady`
//! 2. Drive the input turn (`send_text` / `send_audio_chunk` + `end_input`)
//! 3. Consume output events via [`Client::next_event`] until `OutputEnd`
//! 4. [`Client::next_request`] awaits the next `ServerReady`, or
//!    [`Client::end_session`] closes the conversation

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use session::{Admit, Phase, Session, StateError};
use wire::codec::{self, CodecError};
use wire::event::{
    Config, Event, EventType, InputMedia, InputText, Interrupt, InterruptType, Role, ServerReady,
};
use wire::transport::{Transport, TransportError};

/// Frames queued for the I/O task before media writes suspend.
const OUTBOUND_BUFFER: usize = 64;

/// Decoded events buffered for the host.
const EVENT_BUFFER: usize = 256;

/// Error surfaced by client driver operations.
///
/// `Transport`, `Codec`, and `State` raised from [`Client::next_event`] are
/// terminal: the driver has already closed the transport. The same variants
/// raised from a send method are local usage errors and leave the session
/// running.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
    #[error("malformed frame: {0}")]
    Codec(#[from] CodecError),
    #[error("protocol violation: {0}")]
    State(#[from] StateError),
    #[error("session closed")]
    Closed,
    #[error("no active request; configure the session first")]
    NoActiveRequest,
    #[error("expected ServerReady, received {0:?}")]
    UnexpectedEvent(EventType),
}

enum Outbound {
    Frame(codec::FramePayload),
    Close,
}

/// The client side of a chat session.
pub struct Client {
    shared: Arc<Mutex<Session>>,
    outbound_tx: mpsc::Sender<Outbound>,
    events_rx: mpsc::Receiver<Result<Event, ClientError>>,
    io: JoinHandle<()>,
    /// Input-audio stream id for the current request; fresh per `ServerReady`.
    input_stream: Option<Uuid>,
    chat_id: Option<Uuid>,
    request_id: Option<Uuid>,
}

impl Client {
    /// Wrap a connected transport. No frame is sent until
    /// [`Client::configure`].
    #[must_use]
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        let shared = Arc::new(Mutex::new(Session::new(Role::Client)));
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let io = tokio::spawn(run_io(transport, Arc::clone(&shared), outbound_rx, events_tx));

        Self {
            shared,
            outbound_tx,
            events_rx,
            io,
            input_stream: None,
            chat_id: None,
            request_id: None,
        }
    }

    /// Send `Config` and await the server's `ServerReady` for the first
    /// request.
    pub async fn configure(&mut self, config: Config) -> Result<ServerReady, ClientError> {
        self.send_event(Event::Config(config)).await?;
        info!("client: configured, awaiting server ready");
        self.await_ready().await
    }

    /// Await the `ServerReady` announcing the next request of the session.
    pub async fn next_request(&mut self) -> Result<ServerReady, ClientError> {
        self.await_ready().await
    }

    /// Receive the next server event, or `None` once the session has ended
    /// cleanly.
    pub async fn next_event(&mut self) -> Result<Option<Event>, ClientError> {
        match self.events_rx.recv().await {
            Some(Ok(event)) => Ok(Some(event)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Stream one chunk of input audio. Valid only during an AUDIO-mode
    /// input turn. May suspend on transport backpressure.
    pub async fn send_audio_chunk(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        let Some(id) = self.input_stream else {
            return Err(ClientError::NoActiveRequest);
        };
        self.send_event(Event::InputMedia(InputMedia { id, data: bytes.to_vec() })).await
    }

    /// Send the single input text of a TEXT-mode request.
    pub async fn send_text(&mut self, data: &str) -> Result<(), ClientError> {
        self.send_event(Event::InputText(InputText { data: data.to_owned() })).await
    }

    /// Terminate the input turn. Valid only when the client is the
    /// designated emitter of `InputEnd`.
    pub async fn end_input(&mut self) -> Result<(), ClientError> {
        self.send_event(Event::InputEnd).await
    }

    /// Ask the server to abandon the current request and skip to
    /// `OutputEnd`.
    pub async fn interrupt(&mut self, interrupt_type: InterruptType) -> Result<(), ClientError> {
        self.send_event(Event::Interrupt(Interrupt { interrupt_type })).await?;
        info!(?interrupt_type, "client: request interrupted");
        Ok(())
    }

    /// End the session. Idempotent: a second call emits nothing.
    pub async fn end_session(&mut self) -> Result<(), ClientError> {
        let frame = codec::encode(&Event::SessionEnd)?;
        {
            let mut session = self.shared.lock().await;
            if session.phase() == Phase::Terminated {
                return Ok(());
            }
            session.apply_outbound(&Event::SessionEnd)?;
        }
        info!("client: session ended");
        self.outbound_tx.send(Outbound::Frame(frame)).await.map_err(|_| ClientError::Closed)?;
        self.outbound_tx.send(Outbound::Close).await.map_err(|_| ClientError::Closed)
    }

    /// The session chat id, once assigned by the server.
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
        let Client { io, .. } = self;
        if let Err(e) = io.await {
            warn!(error = %e, "client: io task failed");
        }
    }

    async fn await_ready(&mut self) -> Result<ServerReady, ClientError> {
        match self.next_event().await? {
            Some(Event::ServerReady(ready)) => {
                self.input_stream = Some(Uuid::new_v4());
                self.chat_id = Some(ready.chat_id);
                self.request_id = Some(ready.request_id);
                info!(chat_id = %ready.chat_id, request_id = %ready.request_id, "client: request ready");
                Ok(ready)
            }
            Some(event) => Err(ClientError::UnexpectedEvent(event.event_type())),
            None => Err(ClientError::Closed),
        }
    }

    /// Validate, encode, and queue one event. Nothing is transmitted when
    /// validation fails.
    async fn send_event(&mut self, event: Event) -> Result<(), ClientError> {
        let frame = codec::encode(&event)?;
        self.shared.lock().await.apply_outbound(&event)?;
        self.outbound_tx.send(Outbound::Frame(frame)).await.map_err(|_| ClientError::Closed)
    }
}

/// The I/O task: multiplexes the outbound frame queue and inbound frames
/// over one transport. Exits on session end, transport loss, or protocol
/// violation; inbound failures are forwarded to the host first.
async fn run_io<T: Transport>(
    mut transport: T,
    shared: Arc<Mutex<Session>>,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    events_tx: mpsc::Sender<Result<Event, ClientError>>,
) {
    loop {
        tokio::select! {
            command = outbound_rx.recv() => match command {
                Some(Outbound::Frame(frame)) => {
                    if let Err(e) = transport.send_frame(frame).await {
                        warn!(error = %e, "client: transport send failed");
                        shared.lock().await.terminate();
                        let _ = events_tx.send(Err(ClientError::Transport(e))).await;
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
                    info!("client: transport reached end of stream");
                    shared.lock().await.terminate();
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "client: transport receive failed");
                    shared.lock().await.terminate();
                    let _ = events_tx.send(Err(ClientError::Transport(e))).await;
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
    events_tx: &mpsc::Sender<Result<Event, ClientError>>,
    payload: codec::FramePayload,
) -> bool {
    let event = match codec::decode(payload, Role::Server) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "client: malformed frame from server");
            shared.lock().await.terminate();
            let _ = transport.close().await;
            let _ = events_tx.send(Err(ClientError::Codec(e))).await;
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
            debug!(event = ?event.event_type(), "client: discarding stale frame");
            true
        }
        Err(e) => {
            warn!(error = %e, "client: protocol violation from server");
            shared.lock().await.terminate();
            let _ = transport.close().await;
            let _ = events_tx.send(Err(ClientError::State(e))).await;
            false
        }
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
