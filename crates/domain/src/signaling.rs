//! WebSocket signaling protocol.
//!
//! All payloads are JSON with camelCase keys and a kebab-case `type` tag.
//! Inbound messages tolerate missing fields (handlers decide whether to drop
//! or answer with an `error` message); outbound messages are always complete.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Participants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Participant,
}

/// Signaling view of a participant, as sent over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub user_id: String,
    pub user_name: String,
    pub role: Role,
    pub audio_muted: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound (client → gateway)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Join,
    #[serde(rename_all = "camelCase")]
    Offer {
        target_user_id: Option<String>,
        sdp: Option<serde_json::Value>,
    },
    #[serde(rename_all = "camelCase")]
    Answer {
        target_user_id: Option<String>,
        sdp: Option<serde_json::Value>,
    },
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        target_user_id: Option<String>,
        candidate: Option<serde_json::Value>,
    },
    Mute {
        #[serde(default)]
        muted: bool,
    },
    #[serde(rename_all = "camelCase")]
    ForceMute {
        target_user_id: Option<String>,
        #[serde(default = "d_true")]
        muted: bool,
    },
    ScreenShareStart,
    ScreenShareStop,
    #[serde(rename_all = "camelCase")]
    ScreenOffer {
        target_user_id: Option<String>,
        sdp: Option<serde_json::Value>,
    },
    #[serde(rename_all = "camelCase")]
    ScreenAnswer {
        target_user_id: Option<String>,
        sdp: Option<serde_json::Value>,
    },
    #[serde(rename_all = "camelCase")]
    ScreenIceCandidate {
        target_user_id: Option<String>,
        candidate: Option<serde_json::Value>,
    },
    ChatMessage {
        #[serde(default)]
        content: String,
    },
    Leave,
}

fn d_true() -> bool {
    true
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound (gateway → client)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Connected { user_id: String },
    Joined {
        participants: Vec<ParticipantInfo>,
    },
    ParticipantJoined {
        participant: ParticipantInfo,
    },
    #[serde(rename_all = "camelCase")]
    ParticipantLeft { user_id: String },
    #[serde(rename_all = "camelCase")]
    ParticipantMuted { user_id: String, muted: bool },
    #[serde(rename_all = "camelCase")]
    ForceMuted { muted: bool, by_user_id: String },
    #[serde(rename_all = "camelCase")]
    Offer {
        sdp: serde_json::Value,
        from_user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Answer {
        sdp: serde_json::Value,
        from_user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        candidate: serde_json::Value,
        from_user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    ScreenShareStarted { user_id: String },
    #[serde(rename_all = "camelCase")]
    ScreenShareStopped { user_id: String },
    #[serde(rename_all = "camelCase")]
    ScreenOffer {
        sdp: serde_json::Value,
        from_user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    ScreenAnswer {
        sdp: serde_json::Value,
        from_user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    ScreenIceCandidate {
        candidate: serde_json::Value,
        from_user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        message_id: String,
        user_id: String,
        user_name: String,
        content: String,
        created_at: Option<String>,
    },
    Error {
        code: &'static str,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_offer_parses_camel_case() {
        let raw = r#"{"type":"offer","targetUserId":"B","sdp":{"type":"offer","sdp":"v=0..."}}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ClientMessage::Offer {
                target_user_id,
                sdp,
            } => {
                assert_eq!(target_user_id.as_deref(), Some("B"));
                assert!(sdp.is_some());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn inbound_offer_tolerates_missing_fields() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"offer"}"#).unwrap();
        match msg {
            ClientMessage::Offer {
                target_user_id,
                sdp,
            } => {
                assert!(target_user_id.is_none());
                assert!(sdp.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn outbound_offer_stamps_from_user_id() {
        let msg = ServerMessage::Offer {
            sdp: serde_json::json!({"type": "offer", "sdp": "v=0..."}),
            from_user_id: "A".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "offer");
        assert_eq!(value["fromUserId"], "A");
        assert_eq!(value["sdp"]["type"], "offer");
    }

    #[test]
    fn outbound_error_carries_code() {
        let msg = ServerMessage::Error {
            code: "permission_denied",
            message: "Only host can force mute participants.".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "permission_denied");
    }

    #[test]
    fn participant_info_is_camel_case() {
        let info = ParticipantInfo {
            user_id: "u1".into(),
            user_name: "Ana".into(),
            role: Role::Host,
            audio_muted: false,
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["userName"], "Ana");
        assert_eq!(value["role"], "host");
        assert_eq!(value["audioMuted"], false);
    }

    #[test]
    fn kebab_case_tags_round_trip() {
        for raw in [
            r#"{"type":"join"}"#,
            r#"{"type":"screen-share-start"}"#,
            r#"{"type":"ice-candidate","candidate":{"c":1}}"#,
            r#"{"type":"chat-message","content":"hi"}"#,
            r#"{"type":"leave"}"#,
        ] {
            assert!(serde_json::from_str::<ClientMessage>(raw).is_ok(), "{raw}");
        }
    }
}
