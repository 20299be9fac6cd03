//! Mutation tools (spotlight only, HITL-gated).
//!
//! Success messages deliberately carry the configured mutation-success
//! markers ("…되었습니다") so the planner and evaluator short-circuit after
//! a completed write.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;

use cf_domain::error::Result;
use cf_domain::stores::{MeetingRecord, MeetingStatus, TeamRecord};

use crate::registry::{object_schema, HitlFieldSpec, ToolContext, ToolRegistry, ToolSpec};
use crate::state::{AgentMode, ToolCategory};

use super::ToolEnv;

fn spec(
    name: &str,
    description: &str,
    parameters: Value,
    display_template: &str,
    hitl_fields: Vec<HitlFieldSpec>,
) -> ToolSpec {
    ToolSpec {
        name: name.into(),
        description: description.into(),
        parameters,
        category: ToolCategory::Mutation,
        modes: Some(vec![AgentMode::Spotlight]),
        display_template: Some(display_template.into()),
        hitl_fields,
    }
}

fn error(text: impl Into<String>) -> Result<Value> {
    Ok(json!({ "error": text.into() }))
}

fn success(text: String) -> Result<Value> {
    Ok(json!({ "success": true, "message": text }))
}

async fn is_team_member(env: &ToolEnv, team_id: &str, user_id: &str) -> Result<bool> {
    Ok(env
        .teams
        .teams_for_user(user_id)
        .await?
        .iter()
        .any(|t| t.id == team_id))
}

/// Signed, expiring invite token: `team_id.expiry_ts.hmac`.
fn invite_token(secret: &str, team_id: &str, expires_at: DateTime<Utc>) -> String {
    let expiry = expires_at.timestamp();
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(format!("{team_id}:{expiry}").as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    format!("{team_id}.{expiry}.{signature}")
}

macro_rules! tool {
    ($registry:expr, $env:expr, $spec:expr, |$ctx:ident, $captured:ident| $body:expr) => {{
        let $captured = $env.clone();
        $registry.register($spec, move |$ctx: ToolContext| {
            let $captured = $captured.clone();
            Box::pin(async move { $body })
        });
    }};
}

pub fn register(registry: &mut ToolRegistry, env: &Arc<ToolEnv>) {
    // ── Meetings ─────────────────────────────────────────────────
    tool!(
        registry,
        env,
        spec(
            "create_meeting",
            "새로운 회의 생성",
            object_schema(&[
                ("team_id", "string", "회의를 만들 팀 ID", true),
                ("title", "string", "회의 제목", true),
                ("scheduled_at", "string", "회의 시각 (ISO 8601)", false),
                ("description", "string", "회의 설명", false),
            ]),
            "{{team_id}} 팀에 '{{title}}' 회의를 {{scheduled_at}}에 만들까요?",
            vec![
                HitlFieldSpec::new("team_id", "text", "팀을 선택하세요").options_source("user_teams"),
                HitlFieldSpec::new("title", "text", "회의 제목"),
                HitlFieldSpec::new("scheduled_at", "datetime", "회의 시간").optional(),
                HitlFieldSpec::new("description", "textarea", "회의 설명").optional(),
            ],
        ),
        |ctx, env| {
            let (Some(team_id), Some(title)) = (
                ctx.arg_str("team_id").map(String::from),
                ctx.arg_str("title").map(String::from),
            ) else {
                return error("team_id와 title이 필요합니다.");
            };
            if !is_team_member(&env, &team_id, &ctx.user_id).await? {
                return error("해당 팀의 멤버만 회의를 만들 수 있습니다.");
            }
            let scheduled_at = ctx
                .arg_str("scheduled_at")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc));
            let record = MeetingRecord {
                id: uuid::Uuid::new_v4().to_string(),
                team_id: Some(team_id),
                title: title.clone(),
                description: ctx.arg_str("description").map(String::from),
                host_id: ctx.user_id.clone(),
                status: MeetingStatus::Scheduled,
                scheduled_at,
                participant_ids: vec![ctx.user_id.clone()],
                summary: None,
            };
            let created = env.meetings.create(record).await?;
            success(format!("'{}' 회의가 생성되었습니다 (id: {})", title, created.id))
        }
    );

    tool!(
        registry,
        env,
        spec(
            "update_meeting",
            "회의 정보 수정",
            object_schema(&[
                ("meeting_id", "string", "회의 ID", true),
                ("title", "string", "새 제목", false),
                ("scheduled_at", "string", "새 시각 (ISO 8601)", false),
                ("description", "string", "새 설명", false),
            ]),
            "회의 정보를 수정할까요?",
            vec![
                HitlFieldSpec::new("meeting_id", "text", "회의 ID"),
                HitlFieldSpec::new("title", "text", "새 제목").optional(),
                HitlFieldSpec::new("scheduled_at", "datetime", "새 시각").optional(),
            ],
        ),
        |ctx, env| {
            let Some(meeting_id) = ctx.arg_str("meeting_id").map(String::from) else {
                return error("meeting_id가 필요합니다.");
            };
            let mut meeting = env.meetings.get(&meeting_id).await?;
            if meeting.host_id != ctx.user_id {
                return error("호스트만 회의를 수정할 수 있습니다.");
            }
            if let Some(title) = ctx.arg_str("title") {
                meeting.title = title.to_string();
            }
            if let Some(description) = ctx.arg_str("description") {
                meeting.description = Some(description.to_string());
            }
            if let Some(at) = ctx.arg_str("scheduled_at") {
                match DateTime::parse_from_rfc3339(at) {
                    Ok(t) => meeting.scheduled_at = Some(t.with_timezone(&Utc)),
                    Err(_) => return error("scheduled_at 형식이 올바르지 않습니다."),
                }
            }
            let updated = env.meetings.update(meeting).await?;
            success(format!("'{}' 회의가 수정되었습니다", updated.title))
        }
    );

    tool!(
        registry,
        env,
        spec(
            "delete_meeting",
            "회의 삭제",
            object_schema(&[("meeting_id", "string", "회의 ID", true)]),
            "이 회의를 삭제할까요?",
            vec![HitlFieldSpec::new("meeting_id", "text", "회의 ID")],
        ),
        |ctx, env| {
            let Some(meeting_id) = ctx.arg_str("meeting_id").map(String::from) else {
                return error("meeting_id가 필요합니다.");
            };
            let meeting = env.meetings.get(&meeting_id).await?;
            if meeting.host_id != ctx.user_id {
                return error("호스트만 회의를 삭제할 수 있습니다.");
            }
            env.meetings.delete(&meeting_id).await?;
            success(format!("'{}' 회의가 삭제되었습니다", meeting.title))
        }
    );

    tool!(
        registry,
        env,
        spec(
            "invite_meeting_participant",
            "회의 참여자 초대",
            object_schema(&[
                ("meeting_id", "string", "회의 ID", true),
                ("user_id", "string", "초대할 사용자 ID", true),
            ]),
            "회의에 참여자를 추가할까요?",
            vec![
                HitlFieldSpec::new("meeting_id", "text", "회의 ID"),
                HitlFieldSpec::new("user_id", "text", "초대할 사용자"),
            ],
        ),
        |ctx, env| {
            let (Some(meeting_id), Some(invitee)) = (
                ctx.arg_str("meeting_id").map(String::from),
                ctx.arg_str("user_id").map(String::from),
            ) else {
                return error("meeting_id와 user_id가 필요합니다.");
            };
            let meeting = env.meetings.get(&meeting_id).await?;
            if meeting.host_id != ctx.user_id {
                return error("호스트만 참여자를 초대할 수 있습니다.");
            }
            if meeting.participant_ids.contains(&invitee) {
                return error("이미 회의에 참여 중인 사용자입니다.");
            }
            env.meetings.add_participant(&meeting_id, &invitee).await?;
            success(format!("'{}' 회의 초대가 생성되었습니다", meeting.title))
        }
    );

    // ── Teams ─────────────────────────────────────────────────────
    tool!(
        registry,
        env,
        spec(
            "create_team",
            "새로운 팀 생성",
            object_schema(&[
                ("name", "string", "팀 이름", true),
                ("description", "string", "팀 설명", false),
            ]),
            "'{{name}}' 팀을 만들까요?",
            vec![
                HitlFieldSpec::new("name", "text", "팀 이름"),
                HitlFieldSpec::new("description", "textarea", "팀 설명").optional(),
            ],
        ),
        |ctx, env| {
            let Some(name) = ctx.arg_str("name").map(String::from) else {
                return error("name이 필요합니다.");
            };
            let record = TeamRecord {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.clone(),
                description: ctx.arg_str("description").map(String::from),
            };
            let created = env.teams.create(record).await?;
            let profile = env.teams.user_profile(&ctx.user_id).await?;
            env.teams
                .add_member(&created.id, &ctx.user_id, &profile.user_name)
                .await?;
            success(format!("'{name}' 팀이 생성되었습니다 (id: {})", created.id))
        }
    );

    tool!(
        registry,
        env,
        spec(
            "update_team",
            "팀 정보 수정",
            object_schema(&[
                ("team_id", "string", "팀 ID", true),
                ("name", "string", "새 이름", false),
                ("description", "string", "새 설명", false),
            ]),
            "팀 정보를 수정할까요?",
            vec![
                HitlFieldSpec::new("team_id", "text", "팀을 선택하세요").options_source("user_teams"),
                HitlFieldSpec::new("name", "text", "새 이름").optional(),
                HitlFieldSpec::new("description", "textarea", "새 설명").optional(),
            ],
        ),
        |ctx, env| {
            let Some(team_id) = ctx.arg_str("team_id").map(String::from) else {
                return error("team_id가 필요합니다.");
            };
            if !is_team_member(&env, &team_id, &ctx.user_id).await? {
                return error("팀 멤버만 팀 정보를 수정할 수 있습니다.");
            }
            let mut team = env.teams.get(&team_id).await?;
            if let Some(name) = ctx.arg_str("name") {
                team.name = name.to_string();
            }
            if let Some(description) = ctx.arg_str("description") {
                team.description = Some(description.to_string());
            }
            let updated = env.teams.update(team).await?;
            success(format!("'{}' 팀이 수정되었습니다", updated.name))
        }
    );

    tool!(
        registry,
        env,
        spec(
            "delete_team",
            "팀 삭제",
            object_schema(&[("team_id", "string", "팀 ID", true)]),
            "'{{team_id}}' 팀을 삭제할까요?",
            vec![HitlFieldSpec::new("team_id", "text", "팀을 선택하세요").options_source("user_teams")],
        ),
        |ctx, env| {
            let Some(team_id) = ctx.arg_str("team_id").map(String::from) else {
                return error("team_id가 필요합니다.");
            };
            if !is_team_member(&env, &team_id, &ctx.user_id).await? {
                return error("팀 멤버만 팀을 삭제할 수 있습니다.");
            }
            let team = env.teams.get(&team_id).await?;
            env.teams.delete(&team_id).await?;
            success(format!("'{}' 팀이 삭제되었습니다", team.name))
        }
    );

    tool!(
        registry,
        env,
        spec(
            "invite_team_member",
            "팀원 초대",
            object_schema(&[
                ("team_id", "string", "팀 ID", true),
                ("user_id", "string", "초대할 사용자 ID", true),
            ]),
            "{{user_id}}을 팀에 초대할까요?",
            vec![
                HitlFieldSpec::new("team_id", "text", "팀을 선택하세요").options_source("user_teams"),
                HitlFieldSpec::new("user_id", "text", "초대할 사용자"),
            ],
        ),
        |ctx, env| {
            let (Some(team_id), Some(invitee)) = (
                ctx.arg_str("team_id").map(String::from),
                ctx.arg_str("user_id").map(String::from),
            ) else {
                return error("team_id와 user_id가 필요합니다.");
            };
            if !is_team_member(&env, &team_id, &ctx.user_id).await? {
                return error("팀 멤버만 초대할 수 있습니다.");
            }
            let profile = env.teams.user_profile(&invitee).await?;
            env.teams
                .add_member(&team_id, &invitee, &profile.user_name)
                .await?;
            success(format!("{} 님의 팀원 초대가 생성되었습니다", profile.user_name))
        }
    );

    tool!(
        registry,
        env,
        spec(
            "create_team_invite_link",
            "팀 초대 링크 생성",
            object_schema(&[("team_id", "string", "팀 ID", true)]),
            "'{{team_id}}' 팀의 초대 링크를 만들까요?",
            vec![HitlFieldSpec::new("team_id", "text", "팀을 선택하세요").options_source("user_teams")],
        ),
        |ctx, env| {
            let Some(team_id) = ctx.arg_str("team_id").map(String::from) else {
                return error("team_id가 필요합니다.");
            };
            if !is_team_member(&env, &team_id, &ctx.user_id).await? {
                return error("팀 멤버만 초대 링크를 만들 수 있습니다.");
            }
            let expires_at = Utc::now() + Duration::days(7);
            let token = invite_token(&env.invite_secret, &team_id, expires_at);
            success(format!(
                "초대 링크가 생성되었습니다: {}/invite/{token}",
                env.invite_base_url
            ))
        }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_token_is_deterministic_and_key_sensitive() {
        let expiry = DateTime::parse_from_rfc3339("2026-08-08T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let a = invite_token("secret", "t1", expiry);
        let b = invite_token("secret", "t1", expiry);
        let c = invite_token("other", "t1", expiry);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("t1."));
        // team.expiry.signature
        assert_eq!(a.split('.').count(), 3);
    }
}
