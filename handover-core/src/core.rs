//! Host-driven router: the host passes transport and launch events in,
//! HandoverCore classifies them and returns effects to perform.

use std::path::PathBuf;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::feedback::FeedbackQueue;
use crate::protocol::{Envelope, MsgType};
use crate::session::{ServicePhase, SessionState};
use crate::wire;

/// Text offered on a continuity request when the operator has not typed
/// anything.
pub const DEFAULT_CONTINUITY_MSG: &str = "Continuity test message";

/// Local resources the router offers to peers.
#[derive(Debug, Clone)]
pub struct CoreOptions {
    /// Preset local file offered on a file handover.
    pub preset_file: PathBuf,
    /// Eligibility policy attached to broadcasts. Opaque; `None` makes
    /// broadcasts fail encode validation.
    pub eligibility: Option<Value>,
    /// Fallback text for message handovers.
    pub default_message: String,
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self {
            preset_file: PathBuf::new(),
            eligibility: None,
            default_message: DEFAULT_CONTINUITY_MSG.to_owned(),
        }
    }
}

/// Side effect for the host to perform. Effects are applied in the order
/// produced. Serializable so the C ABI can hand them to a polling host.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum Effect {
    /// (Re-)register with the peer transport.
    Register,
    /// Unregister from the peer transport, best effort.
    Unregister,
    /// Submit an envelope to the transport, fire and forget.
    Send(Envelope),
    /// Submit an envelope together with a local file reference.
    SendFile(Envelope, PathBuf),
    /// Post a status line to the presentation layer.
    Surface(String),
    /// Post a received image to the presentation layer.
    ShowImage(PathBuf),
}

/// Why an operator action was rejected. None of these are fatal; the
/// presentation layer shows a status line at most.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The handover service is not Available. `reinitialize` is true when
    /// one re-initialization attempt was granted; the host should
    /// re-register and the operator should retry later.
    #[error("handover service is not available")]
    ServiceUnavailable { reinitialize: bool },
    /// No peer has been recorded yet, so a unicast has no address.
    #[error("no active peer to address")]
    NoActivePeer,
    #[error("empty parameter: {0}")]
    EmptyParameter(&'static str),
    /// The envelope would be incomplete for its type.
    #[error(transparent)]
    Encode(#[from] wire::EnvelopeEncodeError),
}

/// Content delivered through the platform launch channel, after any durable
/// local copy has completed.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceivedData {
    /// Literal handover text.
    Message(String),
    /// Local path the handover file was durably copied to.
    File(PathBuf),
    /// A file reference arrived but the local copy failed.
    CopyFailed,
    /// The launch carried no handover payload.
    Empty,
}

/// Main coordinator. Owns the session state and the feedback queue; all
/// mutations happen through this type on one worker context.
pub struct HandoverCore {
    session: SessionState,
    feedback: FeedbackQueue,
    options: CoreOptions,
    input_text: String,
}

impl HandoverCore {
    pub fn new(options: CoreOptions) -> Self {
        Self {
            session: SessionState::new(),
            feedback: FeedbackQueue::new(),
            options,
            input_text: String::new(),
        }
    }

    /// Explicit start: transition to Initializing and ask the host to
    /// register with the transport.
    pub fn start(&mut self) -> Vec<Effect> {
        if self.session.phase() == ServicePhase::Terminated {
            return Vec::new();
        }
        info!("starting handover session");
        self.session.begin_initialization();
        vec![Effect::Register]
    }

    /// Explicit shutdown: no further processing, best-effort unregister.
    pub fn shutdown(&mut self) -> Vec<Effect> {
        info!("terminating handover session");
        self.session.terminate();
        vec![Effect::Unregister]
    }

    pub fn is_available(&self) -> bool {
        self.session.is_available()
    }

    pub fn active_peer(&self) -> Option<&str> {
        self.session.active_peer()
    }

    /// Operator's pending message text, read at continuity-request time.
    pub fn set_input_text(&mut self, text: impl Into<String>) {
        self.input_text = text.into();
    }

    /// Availability-changed signal from the transport callback.
    pub fn on_availability_changed(&mut self, available: bool) -> Vec<Effect> {
        if self.session.phase() == ServicePhase::Terminated {
            return Vec::new();
        }
        if available {
            info!("handover service available");
            self.session.on_available();
            Vec::new()
        } else if self.session.on_unavailable() {
            info!(
                attempt = self.session.init_attempts(),
                "handover service unavailable, re-registering"
            );
            vec![Effect::Register]
        } else {
            warn!("handover service unavailable and re-init budget exhausted");
            Vec::new()
        }
    }

    /// Raw envelope payload from the transport callback. Undecodable input
    /// is logged and ignored; it never aborts the worker.
    pub fn on_data_event(&mut self, raw: &str) -> Vec<Effect> {
        let env = match wire::decode_envelope(raw) {
            Ok(env) => env,
            Err(err) => {
                warn!(%err, "ignoring undecodable envelope");
                return Vec::new();
            }
        };
        self.dispatch(env)
    }

    fn dispatch(&mut self, env: Envelope) -> Vec<Effect> {
        if self.session.phase() == ServicePhase::Terminated {
            return Vec::new();
        }
        match env.msg_type {
            MsgType::ContinuityRequest => {
                let Some(peer) = env.node_id.filter(|n| !n.is_empty()) else {
                    warn!("continuity request without a peer node id");
                    return Vec::new();
                };
                info!(peer = %peer, "received continuity request");
                self.session.record_peer(peer.clone());
                if self.session.pending_transfer_is_file() {
                    vec![Effect::SendFile(
                        Envelope::continuity_file(peer),
                        self.options.preset_file.clone(),
                    )]
                } else {
                    let text = if self.input_text.is_empty() {
                        self.options.default_message.clone()
                    } else {
                        self.input_text.clone()
                    };
                    vec![Effect::Send(Envelope::continuity_msg(peer, text))]
                }
            }
            MsgType::NormalMsg => {
                if let Some(peer) = env.node_id.filter(|n| !n.is_empty()) {
                    self.session.record_peer(peer);
                }
                let text = env.data_content.unwrap_or_default();
                vec![Effect::Surface(format!("Receive NORMAL_MSG: {text}"))]
            }
            MsgType::ContinuityResultFeedback => {
                let result = env.data_content.unwrap_or_default();
                vec![Effect::Surface(format!(
                    "Receive continuity result: {result} from peer device."
                ))]
            }
            MsgType::ContinuityFailed => {
                let error_info = env.data_content.unwrap_or_default();
                let error_code = env.error_code.unwrap_or_default();
                vec![Effect::Surface(format!(
                    "ErrorInfo: {error_info} ErrorCode: {error_code}"
                ))]
            }
            MsgType::ContinuityDeviceEvent => {
                // Log-only; device presence changes never reach the UI.
                let event = env.data_content.unwrap_or_default();
                let online = env.online_dev_num.unwrap_or_default();
                info!("{event}, current online device number: {online}");
                Vec::new()
            }
            other => {
                debug!(msg_type = ?other, "ignoring envelope with no inbound role");
                Vec::new()
            }
        }
    }

    /// Content delivered through the platform launch channel. Any durable
    /// file copy has already completed (or failed) before this is called,
    /// so the acknowledgement scheduled here is safe: the peer may purge
    /// its cache of the transferred file once it receives the feedback.
    pub fn on_handover_data(
        &mut self,
        peer_node_id: Option<&str>,
        data: ReceivedData,
        now: Instant,
    ) -> Vec<Effect> {
        if self.session.phase() == ServicePhase::Terminated {
            return Vec::new();
        }
        if let Some(peer) = peer_node_id.filter(|n| !n.is_empty()) {
            self.session.record_peer(peer);
        }
        let mut effects = Vec::new();
        let success = match data {
            ReceivedData::Message(text) => {
                info!("received continuity message");
                effects.push(Effect::Surface(text));
                true
            }
            ReceivedData::File(path) => {
                info!(path = %path.display(), "received continuity file");
                effects.push(Effect::ShowImage(path));
                true
            }
            ReceivedData::CopyFailed => {
                warn!("local copy of the continuity file failed");
                false
            }
            ReceivedData::Empty => {
                warn!("launch carried no continuity data");
                false
            }
        };
        match self.session.active_peer() {
            Some(peer) => {
                let peer = peer.to_owned();
                self.feedback.schedule(peer, success, now);
            }
            None => warn!("no peer to acknowledge, dropping feedback"),
        }
        effects
    }

    /// Announce transferable content; a later continuity request will be
    /// answered with a message.
    pub fn send_message_broadcast(&mut self) -> Result<Vec<Effect>, ProtocolError> {
        self.ensure_available()?;
        self.session.set_pending_transfer_is_file(false);
        self.broadcast_effect()
    }

    /// Announce transferable content; a later continuity request will be
    /// answered with the preset file.
    pub fn send_file_broadcast(&mut self) -> Result<Vec<Effect>, ProtocolError> {
        self.ensure_available()?;
        self.session.set_pending_transfer_is_file(true);
        self.broadcast_effect()
    }

    /// Withdraw a previous broadcast.
    pub fn stop_broadcast(&mut self) -> Result<Vec<Effect>, ProtocolError> {
        self.ensure_available()?;
        Ok(vec![Effect::Send(Envelope::stop_broadcast())])
    }

    /// Plain message to the active peer. Both sides must be registered.
    pub fn send_normal_msg(&mut self, text: &str) -> Result<Vec<Effect>, ProtocolError> {
        self.ensure_available()?;
        if text.is_empty() {
            return Err(ProtocolError::EmptyParameter("message"));
        }
        let peer = self
            .session
            .active_peer()
            .ok_or(ProtocolError::NoActivePeer)?
            .to_owned();
        Ok(vec![Effect::Send(Envelope::normal_msg(peer, text))])
    }

    fn ensure_available(&mut self) -> Result<(), ProtocolError> {
        if self.session.is_available() {
            return Ok(());
        }
        // No queued retry: the operator is the retry loop. One bounded
        // re-init attempt, then the caller is told to check availability.
        let reinitialize = self.session.grant_reinit();
        warn!(reinitialize, "handover service is not available");
        Err(ProtocolError::ServiceUnavailable { reinitialize })
    }

    fn broadcast_effect(&self) -> Result<Vec<Effect>, ProtocolError> {
        let Some(eligibility) = self.options.eligibility.clone() else {
            warn!("no eligibility policy loaded, cannot broadcast");
            return Err(wire::EnvelopeEncodeError::MissingField("eligibility").into());
        };
        Ok(vec![Effect::Send(Envelope::broadcast(eligibility))])
    }

    /// When the host timer should next fire.
    pub fn next_feedback_due(&self) -> Option<Instant> {
        self.feedback.next_due()
    }

    /// Drain due acknowledgements into outbound feedback envelopes.
    pub fn poll_feedback(&mut self, now: Instant) -> Vec<Effect> {
        self.feedback
            .take_due(now)
            .into_iter()
            .map(|p| {
                debug!(peer = %p.peer_node_id, success = p.success, "sending continuity result feedback");
                Effect::Send(Envelope::result_feedback(p.peer_node_id, p.success))
            })
            .collect()
    }
}
