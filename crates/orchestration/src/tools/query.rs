//! Read-only tools.

use std::sync::Arc;

use serde_json::{json, Value};

use cf_domain::error::Result;
use cf_domain::stores::MeetingStatus;

use crate::registry::{object_schema, ToolContext, ToolRegistry, ToolSpec};
use crate::state::{AgentMode, ToolCategory, SEARCH_RESULT_MARKER, SEARCH_TOOL_NAME};

use super::ToolEnv;

fn spec(name: &str, description: &str, parameters: Value, modes: Option<Vec<AgentMode>>) -> ToolSpec {
    ToolSpec {
        name: name.into(),
        description: description.into(),
        parameters,
        category: ToolCategory::Query,
        modes,
        display_template: None,
        hitl_fields: vec![],
    }
}

fn message(text: String) -> Result<Value> {
    Ok(json!({ "message": text }))
}

fn status_label(status: MeetingStatus) -> &'static str {
    match status {
        MeetingStatus::Scheduled => "예정",
        MeetingStatus::Ongoing => "진행 중",
        MeetingStatus::Completed => "완료",
    }
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
        spec("get_meetings", "내가 속한 회의 목록 조회", object_schema(&[]), None),
        |ctx, env| {
            let meetings = env.meetings.list_for_user(&ctx.user_id).await?;
            if meetings.is_empty() {
                return message("참여 중인 회의가 없습니다.".into());
            }
            let lines: Vec<String> = meetings
                .iter()
                .map(|m| format!("- {} ({})", m.title, status_label(m.status)))
                .collect();
            message(format!("회의 {}건:\n{}", meetings.len(), lines.join("\n")))
        }
    );

    tool!(
        registry,
        env,
        spec(
            "get_meeting",
            "회의 상세 조회",
            object_schema(&[("meeting_id", "string", "회의 ID", true)]),
            None,
        ),
        |ctx, env| {
            let Some(meeting_id) = ctx.arg_str("meeting_id").map(String::from) else {
                return Ok(json!({ "error": "meeting_id가 필요합니다." }));
            };
            let meeting = env.meetings.get(&meeting_id).await?;
            message(format!(
                "'{}' — 상태: {}, 참여자 {}명{}",
                meeting.title,
                status_label(meeting.status),
                meeting.participant_ids.len(),
                meeting
                    .scheduled_at
                    .map(|t| format!(", 예정 시각: {}", t.format("%Y-%m-%d %H:%M")))
                    .unwrap_or_default(),
            ))
        }
    );

    tool!(
        registry,
        env,
        spec("get_upcoming_meetings", "다가오는 회의 조회", object_schema(&[]), None),
        |ctx, env| {
            let meetings = env.meetings.upcoming_for_user(&ctx.user_id).await?;
            if meetings.is_empty() {
                return message("다가오는 회의가 없습니다.".into());
            }
            let lines: Vec<String> = meetings
                .iter()
                .map(|m| {
                    format!(
                        "- {}{}",
                        m.title,
                        m.scheduled_at
                            .map(|t| format!(" ({})", t.format("%m/%d %H:%M")))
                            .unwrap_or_default()
                    )
                })
                .collect();
            message(format!("다가오는 회의 {}건:\n{}", meetings.len(), lines.join("\n")))
        }
    );

    tool!(
        registry,
        env,
        spec(
            "get_meeting_transcript",
            "회의 발화 기록 조회",
            object_schema(&[("meeting_id", "string", "회의 ID", true)]),
            None,
        ),
        |ctx, env| {
            let Some(meeting_id) = ctx.arg_str("meeting_id").map(String::from) else {
                return Ok(json!({ "error": "meeting_id가 필요합니다." }));
            };
            let utterances = env.transcripts.recent(&meeting_id, 30).await?;
            if utterances.is_empty() {
                return message("발화 기록이 없습니다.".into());
            }
            let lines: Vec<String> = utterances
                .iter()
                .map(|u| format!("[{}] {}", u.speaker_name, u.text))
                .collect();
            message(lines.join("\n"))
        }
    );

    tool!(
        registry,
        env,
        spec(
            "get_meeting_summary",
            "회의 요약 조회",
            object_schema(&[("meeting_id", "string", "회의 ID", true)]),
            None,
        ),
        |ctx, env| {
            let Some(meeting_id) = ctx.arg_str("meeting_id").map(String::from) else {
                return Ok(json!({ "error": "meeting_id가 필요합니다." }));
            };
            let meeting = env.meetings.get(&meeting_id).await?;
            match meeting.summary {
                Some(summary) if !summary.is_empty() => message(summary),
                _ => message(format!("'{}' 회의의 요약이 아직 없습니다.", meeting.title)),
            }
        }
    );

    // ── Teams & users ─────────────────────────────────────────────
    tool!(
        registry,
        env,
        spec(
            "get_my_teams",
            "내가 속한 팀 목록 조회",
            object_schema(&[]),
            Some(vec![AgentMode::Spotlight]),
        ),
        |ctx, env| {
            let teams = env.teams.teams_for_user(&ctx.user_id).await?;
            if teams.is_empty() {
                return message("소속된 팀이 없습니다.".into());
            }
            let lines: Vec<String> = teams.iter().map(|t| format!("- {}", t.name)).collect();
            message(format!("소속 팀 {}개:\n{}", teams.len(), lines.join("\n")))
        }
    );

    tool!(
        registry,
        env,
        spec(
            "get_team",
            "팀 상세 조회",
            object_schema(&[("team_id", "string", "팀 ID", true)]),
            None,
        ),
        |ctx, env| {
            let Some(team_id) = ctx.arg_str("team_id").map(String::from) else {
                return Ok(json!({ "error": "team_id가 필요합니다." }));
            };
            let team = env.teams.get(&team_id).await?;
            let members = env.teams.members(&team_id).await?;
            message(format!(
                "'{}' — 멤버 {}명{}",
                team.name,
                members.len(),
                team.description.map(|d| format!(", 설명: {d}")).unwrap_or_default(),
            ))
        }
    );

    tool!(
        registry,
        env,
        spec(
            "get_team_members",
            "팀 멤버 목록 조회",
            object_schema(&[("team_id", "string", "팀 ID", true)]),
            Some(vec![AgentMode::Spotlight]),
        ),
        |ctx, env| {
            let Some(team_id) = ctx.arg_str("team_id").map(String::from) else {
                return Ok(json!({ "error": "team_id가 필요합니다." }));
            };
            let members = env.teams.members(&team_id).await?;
            if members.is_empty() {
                return message("팀에 멤버가 없습니다.".into());
            }
            let lines: Vec<String> = members.iter().map(|m| format!("- {}", m.user_name)).collect();
            message(format!("팀 멤버 {}명:\n{}", members.len(), lines.join("\n")))
        }
    );

    tool!(
        registry,
        env,
        spec(
            "get_team_by_meeting",
            "회의가 속한 팀 조회",
            object_schema(&[("meeting_id", "string", "회의 ID", true)]),
            Some(vec![AgentMode::Voice]),
        ),
        |ctx, env| {
            let Some(meeting_id) = ctx.arg_str("meeting_id").map(String::from) else {
                return Ok(json!({ "error": "meeting_id가 필요합니다." }));
            };
            match env.teams.team_for_meeting(&meeting_id).await? {
                Some(team) => message(format!("이 회의는 '{}' 팀 소속입니다.", team.name)),
                None => message("이 회의는 팀에 속해 있지 않습니다.".into()),
            }
        }
    );

    tool!(
        registry,
        env,
        spec("get_user_profile", "내 프로필 조회", object_schema(&[]), None),
        |ctx, env| {
            let profile = env.teams.user_profile(&ctx.user_id).await?;
            message(format!(
                "{}{}",
                profile.user_name,
                profile.email.map(|e| format!(" ({e})")).unwrap_or_default(),
            ))
        }
    );

    // ── Knowledge graph ───────────────────────────────────────────
    tool!(
        registry,
        env,
        spec(
            "get_my_action_items",
            "내 액션 아이템 조회",
            object_schema(&[]),
            Some(vec![AgentMode::Spotlight]),
        ),
        |ctx, env| {
            let items = env.kg.action_items_for(&ctx.user_id).await?;
            if items.is_empty() {
                return message("할당된 액션 아이템이 없습니다.".into());
            }
            let lines: Vec<String> = items
                .iter()
                .map(|item| format!("- {} ({})", item.description, item.status))
                .collect();
            message(format!("액션 아이템 {}건:\n{}", items.len(), lines.join("\n")))
        }
    );

    tool!(
        registry,
        env,
        spec(
            "get_ground_truth",
            "팀의 최신 결정사항 조회",
            object_schema(&[("team_id", "string", "팀 ID", true)]),
            None,
        ),
        |ctx, env| {
            let Some(team_id) = ctx.arg_str("team_id").map(String::from) else {
                return Ok(json!({ "error": "team_id가 필요합니다." }));
            };
            let decisions = env.kg.ground_truth(&team_id).await?;
            if decisions.is_empty() {
                return message("기록된 결정사항이 없습니다.".into());
            }
            let lines: Vec<String> = decisions
                .iter()
                .map(|d| {
                    format!(
                        "- {} [{}]{}",
                        d.title,
                        d.status,
                        d.assignee_name
                            .as_deref()
                            .map(|n| format!(" 담당자: {n}"))
                            .unwrap_or_default()
                    )
                })
                .collect();
            message(format!("결정사항 {}건:\n{}", decisions.len(), lines.join("\n")))
        }
    );

    tool!(
        registry,
        env,
        spec(
            SEARCH_TOOL_NAME,
            "회의·결정·담당자 통합 검색",
            object_schema(&[("query", "string", "검색어", true)]),
            None,
        ),
        |ctx, env| {
            let Some(query) = ctx.arg_str("query").map(String::from) else {
                return Ok(json!({ "error": "query가 필요합니다." }));
            };
            let team_ids: Vec<String> = env
                .teams
                .teams_for_user(&ctx.user_id)
                .await
                .map(|teams| teams.into_iter().map(|t| t.id).collect())
                .unwrap_or_default();
            let hits = env.kg.search(&query, &team_ids).await?;
            if hits.is_empty() {
                // No marker: the evaluator decides whether to retry.
                return message("검색 결과가 없습니다.".into());
            }
            let lines: Vec<String> = hits
                .iter()
                .map(|h| format!("- [{}] {} — {}", h.kind, h.title, h.snippet))
                .collect();
            message(format!(
                "{} {}건]\n{}",
                SEARCH_RESULT_MARKER,
                hits.len(),
                lines.join("\n")
            ))
        }
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_kg::{SearchHit, StaticKg};

    use cf_domain::stores::{TeamRecord, TeamStore};

    // Minimal store doubles for the handlers under test.
    struct NoTeams;
    #[async_trait::async_trait]
    impl TeamStore for NoTeams {
        async fn get(&self, id: &str) -> Result<TeamRecord> {
            Err(cf_domain::Error::NotFound(format!("team {id}")))
        }
        async fn teams_for_user(&self, _u: &str) -> Result<Vec<TeamRecord>> {
            Ok(vec![])
        }
        async fn members(&self, _t: &str) -> Result<Vec<cf_domain::stores::TeamMemberRecord>> {
            Ok(vec![])
        }
        async fn team_for_meeting(&self, _m: &str) -> Result<Option<TeamRecord>> {
            Ok(None)
        }
        async fn user_profile(&self, u: &str) -> Result<cf_domain::stores::UserProfile> {
            Ok(cf_domain::stores::UserProfile {
                user_id: u.into(),
                user_name: "테스터".into(),
                email: None,
            })
        }
        async fn create(&self, r: TeamRecord) -> Result<TeamRecord> {
            Ok(r)
        }
        async fn update(&self, r: TeamRecord) -> Result<TeamRecord> {
            Ok(r)
        }
        async fn delete(&self, _t: &str) -> Result<()> {
            Ok(())
        }
        async fn add_member(&self, _t: &str, _u: &str, _n: &str) -> Result<()> {
            Ok(())
        }
    }

    struct NoMeetings;
    #[async_trait::async_trait]
    impl cf_domain::stores::MeetingStore for NoMeetings {
        async fn get(&self, id: &str) -> Result<cf_domain::stores::MeetingRecord> {
            Err(cf_domain::Error::NotFound(format!("meeting {id}")))
        }
        async fn list_for_user(&self, _u: &str) -> Result<Vec<cf_domain::stores::MeetingRecord>> {
            Ok(vec![])
        }
        async fn upcoming_for_user(
            &self,
            _u: &str,
        ) -> Result<Vec<cf_domain::stores::MeetingRecord>> {
            Ok(vec![])
        }
        async fn create(
            &self,
            r: cf_domain::stores::MeetingRecord,
        ) -> Result<cf_domain::stores::MeetingRecord> {
            Ok(r)
        }
        async fn update(
            &self,
            r: cf_domain::stores::MeetingRecord,
        ) -> Result<cf_domain::stores::MeetingRecord> {
            Ok(r)
        }
        async fn delete(&self, _m: &str) -> Result<()> {
            Ok(())
        }
        async fn set_status(
            &self,
            id: &str,
            _s: MeetingStatus,
        ) -> Result<cf_domain::stores::MeetingRecord> {
            Err(cf_domain::Error::NotFound(format!("meeting {id}")))
        }
        async fn add_participant(&self, _m: &str, _u: &str) -> Result<()> {
            Ok(())
        }
    }

    struct NoTranscripts;
    #[async_trait::async_trait]
    impl cf_domain::stores::TranscriptStore for NoTranscripts {
        async fn append(
            &self,
            _m: &str,
            _s: cf_domain::transcript::TranscriptSegmentRequest,
        ) -> Result<cf_domain::transcript::Utterance> {
            Err(cf_domain::Error::Internal("unused".into()))
        }
        async fn recent(
            &self,
            _m: &str,
            _l: usize,
        ) -> Result<Vec<cf_domain::transcript::Utterance>> {
            Ok(vec![])
        }
        async fn get(&self, _m: &str, id: u64) -> Result<cf_domain::transcript::Utterance> {
            Err(cf_domain::Error::NotFound(format!("utterance {id}")))
        }
    }

    fn env_with_kg(kg: StaticKg) -> Arc<ToolEnv> {
        Arc::new(ToolEnv {
            meetings: Arc::new(NoMeetings),
            teams: Arc::new(NoTeams),
            transcripts: Arc::new(NoTranscripts),
            kg: Arc::new(kg),
            invite_secret: "secret".into(),
            invite_base_url: "https://confab.example".into(),
        })
    }

    #[tokio::test]
    async fn kg_search_stamps_marker_only_with_hits() {
        let kg = StaticKg::new();
        kg.seed_hit(SearchHit {
            kind: "decision".into(),
            title: "교육 프로그램 개편".into(),
            snippet: "담당자: 김수진".into(),
            score: 0.9,
            metadata: serde_json::Value::Null,
        });
        let mut registry = ToolRegistry::new();
        register(&mut registry, &env_with_kg(kg));

        let handler = registry.handler("kg_search").unwrap();
        let result = handler(ToolContext {
            user_id: "u1".into(),
            args: json!({"query": "교육 프로그램"}),
        })
        .await
        .unwrap();
        let text = result["message"].as_str().unwrap();
        assert!(text.starts_with(SEARCH_RESULT_MARKER));
        assert!(text.contains("1건"));

        // Miss: no marker so the evaluator can ask for a retry.
        let handler = registry.handler("kg_search").unwrap();
        let result = handler(ToolContext {
            user_id: "u1".into(),
            args: json!({"query": "존재하지 않는 키워드"}),
        })
        .await
        .unwrap();
        assert!(!result["message"].as_str().unwrap().contains(SEARCH_RESULT_MARKER));
    }

    #[tokio::test]
    async fn missing_required_arg_is_tool_error() {
        let mut registry = ToolRegistry::new();
        register(&mut registry, &env_with_kg(StaticKg::new()));

        let handler = registry.handler("get_meeting").unwrap();
        let result = handler(ToolContext {
            user_id: "u1".into(),
            args: json!({}),
        })
        .await
        .unwrap();
        assert!(result["error"].as_str().unwrap().contains("meeting_id"));
    }

    #[tokio::test]
    async fn voice_and_spotlight_catalogs_differ() {
        let mut registry = ToolRegistry::new();
        register(&mut registry, &env_with_kg(StaticKg::new()));

        let voice: Vec<String> = registry
            .definitions_for_mode(AgentMode::Voice)
            .into_iter()
            .map(|d| d.name)
            .collect();
        let spotlight: Vec<String> = registry
            .definitions_for_mode(AgentMode::Spotlight)
            .into_iter()
            .map(|d| d.name)
            .collect();

        assert!(voice.contains(&"get_team_by_meeting".to_string()));
        assert!(!voice.contains(&"get_my_teams".to_string()));
        assert!(spotlight.contains(&"get_my_teams".to_string()));
        assert!(!spotlight.contains(&"get_team_by_meeting".to_string()));
    }
}
