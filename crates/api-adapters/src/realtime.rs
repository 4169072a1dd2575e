//! The real-time channel: one WebSocket per client, JSON events both ways.
//!
//! Each socket registers with the `BroadcastHub` and then multiplexes two
//! streams until either side closes: inbound client events, and the
//! connection's outbox (broadcasts for joined threads plus replies meant for
//! this connection alone). Handling an inbound event never tears the socket
//! down; failures become `postError` on the outbox. Each `newPost` runs as
//! its own task, so a slow upload never stalls the outbox or later events.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use domains::{AppError, ClientEvent, NewPostRequest, ServerEvent, ThreadId};
use services::{ConnectionId, ImagePayload, ImagePolicy, NicknameDecision, NicknameSession, Submission};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::extract::ClientAddr;
use crate::state::AppState;
use crate::FORM_OVERHEAD;

/// Largest inbound frame or message: twice the base64 size of the data-URI
/// ceiling, so an oversized image still arrives and is refused as
/// `ImageTooLarge` instead of resetting the socket.
pub fn message_limit(policy: &ImagePolicy) -> usize {
    policy.data_uri_max_bytes.div_ceil(3) * 4 * 2 + FORM_OVERHEAD
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ClientAddr(source): ClientAddr,
) -> Response {
    let limit = message_limit(state.services.images.policy());
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| run_session(socket, state, source))
}

/// Per-connection state that lives exactly as long as the socket.
struct Session {
    state: AppState,
    connection: ConnectionId,
    source: String,
    nicknames: NicknameSession,
    /// Names that spawned submissions posted under, bound back on this loop.
    bindings: mpsc::UnboundedSender<(ThreadId, String)>,
}

async fn run_session(mut socket: WebSocket, state: AppState, source: String) {
    let (connection, mut outbox) = state.services.hub.connect();
    let (bindings, mut posted_names) = mpsc::unbounded_channel();
    state.metrics.connection_opened();
    info!(%connection, %source, "real-time connection opened");

    let mut session = Session {
        state: state.clone(),
        connection,
        source,
        nicknames: NicknameSession::default(),
        bindings,
    };

    loop {
        tokio::select! {
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => session.handle_text(text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(%connection, %err, "socket read failed");
                    break;
                }
            },
            Some((thread_id, name)) = posted_names.recv() => {
                session.nicknames.bind(thread_id, name);
            }
            outbound = outbox.recv() => {
                let Some(event) = outbound else { break };
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(%connection, %err, "failed to encode server event");
                        continue;
                    }
                };
                if socket.send(Message::text(payload)).await.is_err() {
                    break;
                }
            }
        }
    }

    state.services.hub.disconnect(connection);
    state.metrics.connection_closed();
    info!(%connection, "real-time connection closed");
}

impl Session {
    async fn handle_text(&mut self, text: &str) {
        let event: ClientEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(err) => {
                debug!(connection = %self.connection, %err, "malformed client event");
                self.hub_error("malformed message");
                return;
            }
        };
        match event {
            ClientEvent::JoinThread { thread_id, name } => self.join(thread_id, name).await,
            ClientEvent::LeaveThread { thread_id } => {
                self.state.services.hub.unsubscribe(self.connection, thread_id);
            }
            ClientEvent::NewPost(request) => self.new_post(request),
            ClientEvent::RequestNickname { thread_id } => self.request_nickname(thread_id),
            ClientEvent::ConfirmNickname {
                thread_id,
                nickname,
                first_attempt,
            } => self.confirm_nickname(thread_id, nickname, first_attempt).await,
        }
    }

    fn hub_error(&self, message: impl Into<String>) {
        self.state.services.hub.report_error(self.connection, message);
    }

    fn reply(&self, event: ServerEvent) {
        self.state.services.hub.send_to(self.connection, event);
    }

    async fn join(&mut self, thread_id: ThreadId, name: Option<String>) {
        if let Err(err) = self.state.services.threads.get_thread(thread_id).await {
            self.hub_error(err.to_string());
            return;
        }
        self.state.services.hub.subscribe(self.connection, thread_id);
        if let Some(name) = name.map(|n| n.trim().to_owned()).filter(|n| !n.is_empty()) {
            self.nicknames.bind(thread_id, name);
        }
        self.reply(ServerEvent::Joined { thread_id });
    }

    /// Hands the submission to its own task. An upload still in flight when
    /// the socket closes runs to completion.
    fn new_post(&self, request: NewPostRequest) {
        let state = self.state.clone();
        let connection = self.connection;
        let source = self.source.clone();
        let bound = self.nicknames.bound(request.thread_id).map(str::to_owned);
        let bindings = self.bindings.clone();

        tokio::spawn(async move {
            let thread_id = request.thread_id;
            let mut submission = Submission::new(&source, thread_id, &request.content);
            submission.name = request.name.as_deref();
            submission.credential = request.credential.as_deref();
            submission.image = request.image.as_deref().map(ImagePayload::DataUri);
            submission.bound_nickname = bound.as_deref();

            match state.services.posting.submit_from(connection, submission).await {
                Ok(post) => {
                    state.metrics.post_accepted();
                    if request.name.as_deref().is_some_and(|n| !n.trim().is_empty()) {
                        // The session may already be gone.
                        let _ = bindings.send((thread_id, post.name));
                    }
                }
                Err(err) => state.metrics.post_rejected(&err),
            }
        });
    }

    fn request_nickname(&mut self, thread_id: ThreadId) {
        if let Some(nickname) = self.nicknames.bound(thread_id) {
            let nickname = nickname.to_owned();
            self.reply(ServerEvent::NicknameAccepted { thread_id, nickname });
            return;
        }
        let nickname = self.state.services.nicknames.assign_generated(thread_id);
        self.nicknames.propose(thread_id, nickname.clone());
        self.reply(ServerEvent::NicknameProposed { thread_id, nickname });
    }

    async fn confirm_nickname(&mut self, thread_id: ThreadId, nickname: String, first_attempt: bool) {
        let decision = match self
            .state
            .services
            .nicknames
            .negotiate(thread_id, &nickname, first_attempt)
            .await
        {
            Ok(decision) => decision,
            Err(err) => {
                self.hub_error(err.to_string());
                return;
            }
        };
        self.nicknames.apply(thread_id, &nickname, &decision);
        match decision {
            NicknameDecision::Accepted(nickname) => {
                self.reply(ServerEvent::NicknameAccepted { thread_id, nickname });
            }
            NicknameDecision::Rejected { reason, regenerate } => {
                let suggestion = regenerate.then(|| self.state.services.nicknames.assign_generated(thread_id));
                self.reply(ServerEvent::NicknameRejected {
                    thread_id,
                    reason: reason.to_string(),
                    regenerate,
                    suggestion,
                });
                if !first_attempt {
                    self.hub_error(AppError::NicknameUnavailable(reason.to_string()).to_string());
                }
            }
        }
    }
}
