//! Envelope codec: JSON text with per-type required-field validation.

use crate::protocol::{Envelope, MsgType};

/// Fields a given message type must carry. Used on both encode and decode
/// so an incomplete envelope is rejected before transmission and a
/// truncated inbound one is rejected before dispatch.
fn missing_field(env: &Envelope) -> Option<&'static str> {
    let need_node = matches!(
        env.msg_type,
        MsgType::ContinuityRequest
            | MsgType::ContinuityMsg
            | MsgType::ContinuityFile
            | MsgType::ContinuityResultFeedback
            | MsgType::NormalMsg
    );
    if need_node && env.node_id.is_none() {
        return Some("nodeId");
    }
    let need_data = matches!(
        env.msg_type,
        MsgType::ContinuityMsg
            | MsgType::ContinuityResultFeedback
            | MsgType::NormalMsg
            | MsgType::ContinuityFailed
            | MsgType::ContinuityDeviceEvent
    );
    if need_data && env.data_content.is_none() {
        return Some("dataContent");
    }
    if env.msg_type == MsgType::ContinuityFailed && env.error_code.is_none() {
        return Some("errorCode");
    }
    if env.msg_type == MsgType::ContinuityDeviceEvent && env.online_dev_num.is_none() {
        return Some("onlineDevNum");
    }
    if env.msg_type == MsgType::ContinuityBroadcast && env.eligibility.is_none() {
        return Some("eligibility");
    }
    None
}

/// Encode an envelope into JSON text. Populated fields only; an envelope
/// missing a field its type requires is rejected, as is the Unknown type.
pub fn encode_envelope(env: &Envelope) -> Result<String, EnvelopeEncodeError> {
    if env.msg_type == MsgType::Unknown {
        return Err(EnvelopeEncodeError::UnknownType);
    }
    if let Some(field) = missing_field(env) {
        return Err(EnvelopeEncodeError::MissingField(field));
    }
    serde_json::to_string(env).map_err(EnvelopeEncodeError::Json)
}

/// Error encoding an envelope (incomplete for its type, or serialization).
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeEncodeError {
    #[error("required field {0} is missing")]
    MissingField(&'static str),
    #[error("cannot encode an unknown message type")]
    UnknownType,
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode raw text into an envelope. An unrecognized msgType decodes to
/// `MsgType::Unknown` (the router ignores it); a recognized type missing a
/// required field is a decode error.
pub fn decode_envelope(raw: &str) -> Result<Envelope, EnvelopeDecodeError> {
    let env: Envelope = serde_json::from_str(raw).map_err(EnvelopeDecodeError::Malformed)?;
    if env.msg_type != MsgType::Unknown {
        if let Some(field) = missing_field(&env) {
            return Err(EnvelopeDecodeError::MissingField(field));
        }
    }
    Ok(env)
}

/// Error decoding raw text (not well-formed, or incomplete for its type).
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeDecodeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("required field {0} is missing")]
    MissingField(&'static str),
}
