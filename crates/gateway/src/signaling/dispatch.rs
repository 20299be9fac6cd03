//! Strategy-dispatched signaling message handling.
//!
//! One handler per message kind, per the protocol table in
//! [`cf_domain::signaling`]. Handlers never let an error cross the socket
//! boundary: invalid payloads are dropped or answered with an `error`
//! message to the sender, and the loop continues. `leave` is the only kind
//! that stops the socket loop.

use std::sync::Arc;

use cf_domain::signaling::{ClientMessage, ServerMessage};
use cf_domain::stores::ChatStore;

use super::registry::ConnectionRegistry;

/// What the socket loop should do after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Continue,
    /// Terminal (`leave`): close the connection.
    Stop,
}

pub struct DispatchContext {
    pub registry: Arc<ConnectionRegistry>,
    pub chat: Arc<dyn ChatStore>,
    pub meeting_id: String,
    pub user_id: String,
}

pub async fn dispatch(ctx: &DispatchContext, message: ClientMessage) -> DispatchOutcome {
    match message {
        ClientMessage::Join => handle_join(ctx).await,
        ClientMessage::Offer { target_user_id, sdp } => {
            forward_sdp(ctx, target_user_id, sdp, SdpKind::Offer).await
        }
        ClientMessage::Answer { target_user_id, sdp } => {
            forward_sdp(ctx, target_user_id, sdp, SdpKind::Answer).await
        }
        ClientMessage::IceCandidate {
            target_user_id,
            candidate,
        } => handle_ice(ctx, target_user_id, candidate, false).await,
        ClientMessage::Mute { muted } => handle_mute(ctx, muted).await,
        ClientMessage::ForceMute {
            target_user_id,
            muted,
        } => handle_force_mute(ctx, target_user_id, muted).await,
        ClientMessage::ScreenShareStart => handle_screen_share(ctx, true).await,
        ClientMessage::ScreenShareStop => handle_screen_share(ctx, false).await,
        ClientMessage::ScreenOffer { target_user_id, sdp } => {
            forward_sdp(ctx, target_user_id, sdp, SdpKind::ScreenOffer).await
        }
        ClientMessage::ScreenAnswer { target_user_id, sdp } => {
            forward_sdp(ctx, target_user_id, sdp, SdpKind::ScreenAnswer).await
        }
        ClientMessage::ScreenIceCandidate {
            target_user_id,
            candidate,
        } => handle_ice(ctx, target_user_id, candidate, true).await,
        ClientMessage::ChatMessage { content } => handle_chat(ctx, content).await,
        ClientMessage::Leave => DispatchOutcome::Stop,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn handle_join(ctx: &DispatchContext) -> DispatchOutcome {
    let participants = ctx.registry.participants(&ctx.meeting_id);
    ctx.registry
        .send_to_user(
            &ctx.meeting_id,
            &ctx.user_id,
            ServerMessage::Joined { participants },
        )
        .await;

    if let Some(participant) = ctx.registry.participant(&ctx.meeting_id, &ctx.user_id) {
        ctx.registry
            .broadcast(
                &ctx.meeting_id,
                ServerMessage::ParticipantJoined { participant },
                Some(&ctx.user_id),
            )
            .await;
    }
    DispatchOutcome::Continue
}

enum SdpKind {
    Offer,
    Answer,
    ScreenOffer,
    ScreenAnswer,
}

async fn forward_sdp(
    ctx: &DispatchContext,
    target_user_id: Option<String>,
    sdp: Option<serde_json::Value>,
    kind: SdpKind,
) -> DispatchOutcome {
    let (Some(target_user_id), Some(sdp)) = (target_user_id, sdp) else {
        // Screen variants log the drop; plain offer/answer stay silent.
        if matches!(kind, SdpKind::ScreenOffer | SdpKind::ScreenAnswer) {
            tracing::warn!(
                meeting_id = %ctx.meeting_id,
                user_id = %ctx.user_id,
                "screen sdp message missing targetUserId or sdp"
            );
        }
        return DispatchOutcome::Continue;
    };

    let from_user_id = ctx.user_id.clone();
    let message = match kind {
        SdpKind::Offer => ServerMessage::Offer { sdp, from_user_id },
        SdpKind::Answer => ServerMessage::Answer { sdp, from_user_id },
        SdpKind::ScreenOffer => ServerMessage::ScreenOffer { sdp, from_user_id },
        SdpKind::ScreenAnswer => ServerMessage::ScreenAnswer { sdp, from_user_id },
    };
    ctx.registry
        .send_to_user(&ctx.meeting_id, &target_user_id, message)
        .await;
    DispatchOutcome::Continue
}

async fn handle_ice(
    ctx: &DispatchContext,
    target_user_id: Option<String>,
    candidate: Option<serde_json::Value>,
    screen: bool,
) -> DispatchOutcome {
    let Some(candidate) = candidate else {
        return DispatchOutcome::Continue;
    };

    match target_user_id {
        Some(target) => {
            let message = if screen {
                ServerMessage::ScreenIceCandidate {
                    candidate,
                    from_user_id: ctx.user_id.clone(),
                }
            } else {
                ServerMessage::IceCandidate {
                    candidate,
                    from_user_id: ctx.user_id.clone(),
                }
            };
            ctx.registry.send_to_user(&ctx.meeting_id, &target, message).await;
        }
        None if !screen => {
            ctx.registry
                .broadcast(
                    &ctx.meeting_id,
                    ServerMessage::IceCandidate {
                        candidate,
                        from_user_id: ctx.user_id.clone(),
                    },
                    Some(&ctx.user_id),
                )
                .await;
        }
        None => {
            tracing::warn!(
                meeting_id = %ctx.meeting_id,
                user_id = %ctx.user_id,
                "screen ice candidate missing targetUserId"
            );
        }
    }
    DispatchOutcome::Continue
}

async fn handle_mute(ctx: &DispatchContext, muted: bool) -> DispatchOutcome {
    ctx.registry.update_mute_status(&ctx.meeting_id, &ctx.user_id, muted);
    ctx.registry
        .broadcast(
            &ctx.meeting_id,
            ServerMessage::ParticipantMuted {
                user_id: ctx.user_id.clone(),
                muted,
            },
            Some(&ctx.user_id),
        )
        .await;
    DispatchOutcome::Continue
}

async fn handle_force_mute(
    ctx: &DispatchContext,
    target_user_id: Option<String>,
    muted: bool,
) -> DispatchOutcome {
    let Some(target_user_id) = target_user_id else {
        return DispatchOutcome::Continue;
    };

    if target_user_id == ctx.user_id {
        ctx.registry
            .send_to_user(
                &ctx.meeting_id,
                &ctx.user_id,
                ServerMessage::Error {
                    code: "invalid_target",
                    message: "Cannot force mute yourself. Use regular mute instead.".into(),
                },
            )
            .await;
        return DispatchOutcome::Continue;
    }

    if !ctx.registry.is_host(&ctx.meeting_id, &ctx.user_id) {
        ctx.registry
            .send_to_user(
                &ctx.meeting_id,
                &ctx.user_id,
                ServerMessage::Error {
                    code: "permission_denied",
                    message: "Only host can force mute participants. Permission denied.".into(),
                },
            )
            .await;
        return DispatchOutcome::Continue;
    }

    ctx.registry.update_mute_status(&ctx.meeting_id, &target_user_id, muted);
    ctx.registry
        .send_to_user(
            &ctx.meeting_id,
            &target_user_id,
            ServerMessage::ForceMuted {
                muted,
                by_user_id: ctx.user_id.clone(),
            },
        )
        .await;
    // Everyone sees the state change, sender included.
    ctx.registry
        .broadcast(
            &ctx.meeting_id,
            ServerMessage::ParticipantMuted {
                user_id: target_user_id,
                muted,
            },
            None,
        )
        .await;
    DispatchOutcome::Continue
}

async fn handle_screen_share(ctx: &DispatchContext, started: bool) -> DispatchOutcome {
    tracing::info!(
        meeting_id = %ctx.meeting_id,
        user_id = %ctx.user_id,
        started,
        "screen share state changed"
    );
    let message = if started {
        ServerMessage::ScreenShareStarted {
            user_id: ctx.user_id.clone(),
        }
    } else {
        ServerMessage::ScreenShareStopped {
            user_id: ctx.user_id.clone(),
        }
    };
    ctx.registry
        .broadcast(&ctx.meeting_id, message, Some(&ctx.user_id))
        .await;
    DispatchOutcome::Continue
}

async fn handle_chat(ctx: &DispatchContext, content: String) -> DispatchOutcome {
    if content.trim().is_empty() {
        return DispatchOutcome::Continue;
    }

    let record = match ctx.chat.append(&ctx.meeting_id, &ctx.user_id, &content).await {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(
                meeting_id = %ctx.meeting_id,
                user_id = %ctx.user_id,
                error = %e,
                "chat message rejected"
            );
            return DispatchOutcome::Continue;
        }
    };

    let user_name = ctx
        .registry
        .participant(&ctx.meeting_id, &ctx.user_id)
        .map(|p| p.user_name)
        .unwrap_or_else(|| "Unknown".into());

    ctx.registry
        .broadcast(
            &ctx.meeting_id,
            ServerMessage::ChatMessage {
                message_id: record.id,
                user_id: ctx.user_id.clone(),
                user_name,
                content: record.content,
                created_at: Some(record.created_at.to_rfc3339()),
            },
            None,
        )
        .await;
    DispatchOutcome::Continue
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryChatStore;
    use cf_domain::signaling::{ParticipantInfo, Role};
    use tokio::sync::mpsc;

    struct Harness {
        registry: Arc<ConnectionRegistry>,
        chat: Arc<InMemoryChatStore>,
        receivers: std::collections::HashMap<String, mpsc::Receiver<ServerMessage>>,
    }

    impl Harness {
        fn new(users: &[(&str, Role)]) -> Self {
            let registry = Arc::new(ConnectionRegistry::new());
            let mut receivers = std::collections::HashMap::new();
            for (user_id, role) in users {
                let (tx, rx) = mpsc::channel(16);
                registry.connect(
                    "m1",
                    ParticipantInfo {
                        user_id: (*user_id).into(),
                        user_name: user_id.to_uppercase(),
                        role: *role,
                        audio_muted: false,
                    },
                    tx,
                );
                receivers.insert((*user_id).to_string(), rx);
            }
            Self {
                registry,
                chat: Arc::new(InMemoryChatStore::new()),
                receivers,
            }
        }

        fn ctx(&self, user_id: &str) -> DispatchContext {
            DispatchContext {
                registry: self.registry.clone(),
                chat: self.chat.clone(),
                meeting_id: "m1".into(),
                user_id: user_id.into(),
            }
        }

        fn drain(&mut self, user_id: &str) -> Vec<serde_json::Value> {
            let rx = self.receivers.get_mut(user_id).unwrap();
            let mut out = Vec::new();
            while let Ok(message) = rx.try_recv() {
                out.push(serde_json::to_value(&message).unwrap());
            }
            out
        }
    }

    #[tokio::test]
    async fn offer_routes_to_target_with_sender_stamp() {
        let mut harness = Harness::new(&[("a", Role::Host), ("b", Role::Participant)]);
        let message = ClientMessage::Offer {
            target_user_id: Some("b".into()),
            sdp: Some(serde_json::json!({"type": "offer", "sdp": "v=0..."})),
        };
        let outcome = dispatch(&harness.ctx("a"), message).await;
        assert_eq!(outcome, DispatchOutcome::Continue);

        let to_b = harness.drain("b");
        assert_eq!(to_b.len(), 1);
        assert_eq!(to_b[0]["type"], "offer");
        assert_eq!(to_b[0]["fromUserId"], "a");
        assert_eq!(to_b[0]["sdp"]["type"], "offer");
        assert!(harness.drain("a").is_empty());
    }

    #[tokio::test]
    async fn offer_without_sdp_is_dropped() {
        let mut harness = Harness::new(&[("a", Role::Host), ("b", Role::Participant)]);
        dispatch(
            &harness.ctx("a"),
            ClientMessage::Offer {
                target_user_id: Some("b".into()),
                sdp: None,
            },
        )
        .await;
        assert!(harness.drain("b").is_empty());
    }

    #[tokio::test]
    async fn force_mute_requires_host() {
        let mut harness = Harness::new(&[
            ("h", Role::Host),
            ("u", Role::Participant),
            ("v", Role::Participant),
        ]);
        dispatch(
            &harness.ctx("u"),
            ClientMessage::ForceMute {
                target_user_id: Some("v".into()),
                muted: true,
            },
        )
        .await;

        let to_u = harness.drain("u");
        assert_eq!(to_u.len(), 1);
        assert_eq!(to_u[0]["type"], "error");
        assert_eq!(to_u[0]["code"], "permission_denied");
        assert!(harness.drain("v").is_empty());
        assert!(harness.drain("h").is_empty());
        assert!(!harness.registry.participant("m1", "v").unwrap().audio_muted);
    }

    #[tokio::test]
    async fn force_mute_by_host_notifies_target_and_all() {
        let mut harness = Harness::new(&[("h", Role::Host), ("v", Role::Participant)]);
        dispatch(
            &harness.ctx("h"),
            ClientMessage::ForceMute {
                target_user_id: Some("v".into()),
                muted: true,
            },
        )
        .await;

        assert!(harness.registry.participant("m1", "v").unwrap().audio_muted);

        let to_v = harness.drain("v");
        assert_eq!(to_v.len(), 2);
        assert_eq!(to_v[0]["type"], "force-muted");
        assert_eq!(to_v[0]["byUserId"], "h");
        assert_eq!(to_v[1]["type"], "participant-muted");

        // Sender also receives the broadcast (no exclusion on force-mute).
        let to_h = harness.drain("h");
        assert_eq!(to_h.len(), 1);
        assert_eq!(to_h[0]["type"], "participant-muted");
        assert_eq!(to_h[0]["userId"], "v");
    }

    #[tokio::test]
    async fn force_mute_self_is_invalid_target() {
        let mut harness = Harness::new(&[("h", Role::Host)]);
        dispatch(
            &harness.ctx("h"),
            ClientMessage::ForceMute {
                target_user_id: Some("h".into()),
                muted: true,
            },
        )
        .await;
        let to_h = harness.drain("h");
        assert_eq!(to_h.len(), 1);
        assert_eq!(to_h[0]["code"], "invalid_target");
        assert!(!harness.registry.participant("m1", "h").unwrap().audio_muted);
    }

    #[tokio::test]
    async fn mute_broadcast_excludes_sender() {
        let mut harness = Harness::new(&[("a", Role::Host), ("b", Role::Participant)]);
        dispatch(&harness.ctx("a"), ClientMessage::Mute { muted: true }).await;

        assert!(harness.registry.participant("m1", "a").unwrap().audio_muted);
        assert!(harness.drain("a").is_empty());
        let to_b = harness.drain("b");
        assert_eq!(to_b[0]["type"], "participant-muted");
        assert_eq!(to_b[0]["userId"], "a");
        assert_eq!(to_b[0]["muted"], true);
    }

    #[tokio::test]
    async fn ice_without_target_broadcasts_excluding_sender() {
        let mut harness = Harness::new(&[("a", Role::Host), ("b", Role::Participant)]);
        dispatch(
            &harness.ctx("a"),
            ClientMessage::IceCandidate {
                target_user_id: None,
                candidate: Some(serde_json::json!({"candidate": "..."})),
            },
        )
        .await;
        assert!(harness.drain("a").is_empty());
        let to_b = harness.drain("b");
        assert_eq!(to_b[0]["type"], "ice-candidate");
        assert_eq!(to_b[0]["fromUserId"], "a");
    }

    #[tokio::test]
    async fn screen_ice_without_target_is_logged_not_broadcast() {
        let mut harness = Harness::new(&[("a", Role::Host), ("b", Role::Participant)]);
        dispatch(
            &harness.ctx("a"),
            ClientMessage::ScreenIceCandidate {
                target_user_id: None,
                candidate: Some(serde_json::json!({"candidate": "..."})),
            },
        )
        .await;
        assert!(harness.drain("b").is_empty());
    }

    #[tokio::test]
    async fn join_sends_roster_and_announces() {
        let mut harness = Harness::new(&[("a", Role::Host), ("b", Role::Participant)]);
        dispatch(&harness.ctx("b"), ClientMessage::Join).await;

        let to_b = harness.drain("b");
        assert_eq!(to_b[0]["type"], "joined");
        assert_eq!(to_b[0]["participants"].as_array().unwrap().len(), 2);

        let to_a = harness.drain("a");
        assert_eq!(to_a[0]["type"], "participant-joined");
        assert_eq!(to_a[0]["participant"]["userId"], "b");
    }

    #[tokio::test]
    async fn chat_is_persisted_and_broadcast_to_all() {
        let mut harness = Harness::new(&[("a", Role::Host), ("b", Role::Participant)]);
        dispatch(
            &harness.ctx("a"),
            ClientMessage::ChatMessage {
                content: "안녕하세요".into(),
            },
        )
        .await;

        // Sender included in the chat broadcast.
        let to_a = harness.drain("a");
        assert_eq!(to_a[0]["type"], "chat-message");
        assert_eq!(to_a[0]["userId"], "a");
        assert_eq!(to_a[0]["userName"], "A");
        assert_eq!(to_a[0]["content"], "안녕하세요");
        assert!(to_a[0]["messageId"].as_str().is_some());
        assert!(to_a[0]["createdAt"].as_str().is_some());
        assert_eq!(harness.drain("b").len(), 1);
    }

    #[tokio::test]
    async fn empty_chat_is_ignored() {
        let mut harness = Harness::new(&[("a", Role::Host)]);
        dispatch(
            &harness.ctx("a"),
            ClientMessage::ChatMessage { content: "   ".into() },
        )
        .await;
        assert!(harness.drain("a").is_empty());
    }

    #[tokio::test]
    async fn leave_stops_the_loop() {
        let harness = Harness::new(&[("a", Role::Host)]);
        let outcome = dispatch(&harness.ctx("a"), ClientMessage::Leave).await;
        assert_eq!(outcome, DispatchOutcome::Stop);
    }
}
