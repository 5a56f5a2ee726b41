//! Continuity handover protocol core.
//! Host-driven: no I/O; the host passes events and receives effects.

pub mod protocol;
pub mod session;
pub mod wire;

pub use self::core::{
    CoreOptions, Effect, HandoverCore, ProtocolError, ReceivedData, DEFAULT_CONTINUITY_MSG,
};
pub use feedback::{FeedbackQueue, PendingFeedback, FEEDBACK_DELAY};
pub use protocol::{Envelope, MsgType, RESULT_FAILED, RESULT_SUCCESS};
pub use session::{ServicePhase, SessionState, MAX_INIT_ATTEMPTS};
pub use wire::{decode_envelope, encode_envelope, EnvelopeDecodeError, EnvelopeEncodeError};

pub mod core;
pub mod feedback;
pub mod ffi;
