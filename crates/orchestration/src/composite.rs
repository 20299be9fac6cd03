//! Lexical heuristics for composite queries.
//!
//! A composite query needs two tool rounds: find an assignee first, then
//! resolve their team. The keyword lists are configuration, not code — see
//! [`cf_domain::config::AgentConfig`].

use cf_domain::config::AgentConfig;

/// Did replanning generate this query? Sub-queries reference earlier
/// results ("이전에 찾은 …") and must not re-trigger composite handling.
pub fn is_subquery(query: &str, config: &AgentConfig) -> bool {
    config.subquery_keywords.iter().any(|kw| query.contains(kw.as_str()))
}

/// Does the query combine an assignment hint with a team hint?
pub fn detect_composite_query(query: &str, config: &AgentConfig) -> bool {
    let has_assignment = config
        .assignment_keywords
        .iter()
        .any(|kw| query.contains(kw.as_str()));
    let has_team = config.team_keywords.iter().any(|kw| query.contains(kw.as_str()));
    has_assignment && has_team
}

/// Build the second-round sub-query from the first-round phrasing.
pub fn extract_next_step_query(query: &str) -> String {
    if query.contains("팀원") {
        "이전에 찾은 담당자와 같은 팀의 팀원들은 누구인가?".to_string()
    } else if query.contains("같은 팀") || query.contains("팀에서") || query.contains("팀의") {
        "이전에 찾은 담당자와 같은 팀의 팀원들은 누구인가?".to_string()
    } else {
        "이전에 찾은 담당자의 팀 정보는?".to_string()
    }
}

/// Do the results indicate a completed mutation?
pub fn has_mutation_success(tool_results: &str, config: &AgentConfig) -> bool {
    !tool_results.is_empty()
        && config
            .mutation_success_markers
            .iter()
            .any(|marker| tool_results.contains(marker.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_needs_both_hint_kinds() {
        let config = AgentConfig::default();
        assert!(detect_composite_query(
            "action X 담당자와 같은 팀의 팀원은?",
            &config
        ));
        // Assignment hint only.
        assert!(!detect_composite_query("교육 프로그램 담당자는 누구야?", &config));
        // Team hint only.
        assert!(!detect_composite_query("우리 팀의 팀원을 알려줘", &config));
    }

    #[test]
    fn subquery_detection() {
        let config = AgentConfig::default();
        assert!(is_subquery(
            "이전에 찾은 담당자와 같은 팀의 팀원들은 누구인가?",
            &config
        ));
        assert!(!is_subquery("배포 일정 담당자와 같은 팀은?", &config));
    }

    #[test]
    fn next_step_query_mentions_teammates() {
        let next = extract_next_step_query("action X 담당자와 같은 팀의 팀원은?");
        assert!(next.contains("이전에 찾은"));
        assert!(next.contains("팀원"));
    }

    #[test]
    fn mutation_success_markers() {
        let config = AgentConfig::default();
        assert!(has_mutation_success("회의가 생성되었습니다", &config));
        assert!(has_mutation_success("{\"success\": true}", &config));
        assert!(!has_mutation_success("검색 결과 없음", &config));
        assert!(!has_mutation_success("", &config));
    }
}
