//! Handover protocol: envelope message unit and its type enumeration.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result literal carried in a CONTINUITY_RESULT_FEEDBACK envelope.
pub const RESULT_SUCCESS: &str = "SUCCESS";

/// Failure literal carried in a CONTINUITY_RESULT_FEEDBACK envelope.
pub const RESULT_FAILED: &str = "FAILED";

/// All envelope message types. Encoding is JSON text (see wire module);
/// the tag strings are the ones exchanged with the handover framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MsgType {
    /// Announce transferable content to all eligible nearby devices.
    ContinuityBroadcast,
    /// Withdraw a previous broadcast.
    ContinuityStopBroadcast,
    /// A peer tapped the continuity affordance and asks for the content.
    ContinuityRequest,
    /// Unicast handover of a text payload.
    ContinuityMsg,
    /// Unicast handover of a file; the file itself travels out of band.
    ContinuityFile,
    /// Receiver's acknowledgement: SUCCESS or FAILED.
    ContinuityResultFeedback,
    /// Plain application message between registered peers.
    NormalMsg,
    /// Framework failure notification with an error code.
    ContinuityFailed,
    /// Device came online or went offline; carries the new online count.
    ContinuityDeviceEvent,
    /// Any tag this build does not recognize. Decodes cleanly so the
    /// router can ignore it instead of erroring.
    #[serde(other)]
    Unknown,
}

/// One protocol message. Only the fields relevant to `msg_type` are
/// populated; absent fields are omitted from the wire entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "msgType")]
    pub msg_type: MsgType,
    /// Peer device identifier. Required for unicast types, absent for broadcasts.
    #[serde(rename = "nodeId", default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Text payload, serialized result, or error description.
    #[serde(rename = "dataContent", default, skip_serializing_if = "Option::is_none")]
    pub data_content: Option<String>,
    /// Present only on CONTINUITY_FAILED.
    #[serde(rename = "errorCode", default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
    /// Present only on CONTINUITY_DEVICE_EVENT.
    #[serde(rename = "onlineDevNum", default, skip_serializing_if = "Option::is_none")]
    pub online_dev_num: Option<u32>,
    /// Eligibility policy: which device/app categories get the continuity
    /// affordance. Opaque pass-through, present only on broadcasts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligibility: Option<Value>,
}

impl Envelope {
    fn bare(msg_type: MsgType) -> Self {
        Self {
            msg_type,
            node_id: None,
            data_content: None,
            error_code: None,
            online_dev_num: None,
            eligibility: None,
        }
    }

    /// Broadcast transferable content with the given eligibility policy.
    pub fn broadcast(eligibility: Value) -> Self {
        Self {
            eligibility: Some(eligibility),
            ..Self::bare(MsgType::ContinuityBroadcast)
        }
    }

    /// Withdraw a previous broadcast.
    pub fn stop_broadcast() -> Self {
        Self::bare(MsgType::ContinuityStopBroadcast)
    }

    /// Hand a text payload over to `node_id`.
    pub fn continuity_msg(node_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            node_id: Some(node_id.into()),
            data_content: Some(text.into()),
            ..Self::bare(MsgType::ContinuityMsg)
        }
    }

    /// Hand a file over to `node_id`. The file reference is submitted to the
    /// transport alongside the envelope, not inside it.
    pub fn continuity_file(node_id: impl Into<String>) -> Self {
        Self {
            node_id: Some(node_id.into()),
            ..Self::bare(MsgType::ContinuityFile)
        }
    }

    /// Acknowledge received content back to the sending peer.
    pub fn result_feedback(node_id: impl Into<String>, success: bool) -> Self {
        let result = if success { RESULT_SUCCESS } else { RESULT_FAILED };
        Self {
            node_id: Some(node_id.into()),
            data_content: Some(result.to_owned()),
            ..Self::bare(MsgType::ContinuityResultFeedback)
        }
    }

    /// Plain message to a registered peer.
    pub fn normal_msg(node_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            node_id: Some(node_id.into()),
            data_content: Some(text.into()),
            ..Self::bare(MsgType::NormalMsg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_type_wire_tags() {
        let json = serde_json::to_string(&MsgType::ContinuityResultFeedback).unwrap();
        assert_eq!(json, "\"CONTINUITY_RESULT_FEEDBACK\"");
        let json = serde_json::to_string(&MsgType::NormalMsg).unwrap();
        assert_eq!(json, "\"NORMAL_MSG\"");
    }

    #[test]
    fn unrecognized_tag_maps_to_unknown() {
        let t: MsgType = serde_json::from_str("\"CONTINUITY_SOMETHING_NEW\"").unwrap();
        assert_eq!(t, MsgType::Unknown);
    }

    #[test]
    fn result_feedback_literals() {
        let ok = Envelope::result_feedback("P1", true);
        assert_eq!(ok.data_content.as_deref(), Some(RESULT_SUCCESS));
        let bad = Envelope::result_feedback("P1", false);
        assert_eq!(bad.data_content.as_deref(), Some(RESULT_FAILED));
    }

    #[test]
    fn absent_fields_are_omitted() {
        let env = Envelope::stop_broadcast();
        let json = serde_json::to_string(&env).unwrap();
        assert_eq!(json, "{\"msgType\":\"CONTINUITY_STOP_BROADCAST\"}");
    }
}
