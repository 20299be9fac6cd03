use serde::{Deserialize, Serialize};

/// Agent pipeline settings: wake word, retry bounds and the lexical
/// heuristics used for composite-query detection.
///
/// The keyword lists are configuration rather than hard-coded so deployments
/// can tune them per language without a release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Phrase whose presence in STT output triggers the agent pipeline.
    #[serde(default = "d_wake_word")]
    pub wake_word: String,
    /// Whether the agent pipeline is enabled at all.
    #[serde(default = "d_true")]
    pub enabled: bool,

    /// Planner retry cap. Reaching it falls back to a direct answer.
    #[serde(default = "d_planning_max_retry")]
    pub planning_max_retry: u32,
    /// Hard ceiling on planner/evaluator iterations; reaching it forces
    /// the evaluator to report success.
    #[serde(default = "d_max_iterations")]
    pub max_iterations: u32,

    /// Fast pre-planner classifier for trivially answerable queries.
    #[serde(default = "d_true")]
    pub simple_router_enabled: bool,

    /// Literal substrings in tool results that mark a completed mutation.
    #[serde(default = "d_mutation_success_markers")]
    pub mutation_success_markers: Vec<String>,
    /// Assignment hints ("who owns…") for composite-query detection.
    #[serde(default = "d_assignment_keywords")]
    pub assignment_keywords: Vec<String>,
    /// Team hints ("…same team") for composite-query detection.
    #[serde(default = "d_team_keywords")]
    pub team_keywords: Vec<String>,
    /// Referential tokens marking a planner-generated sub-query.
    #[serde(default = "d_subquery_keywords")]
    pub subquery_keywords: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            wake_word: d_wake_word(),
            enabled: true,
            planning_max_retry: d_planning_max_retry(),
            max_iterations: d_max_iterations(),
            simple_router_enabled: true,
            mutation_success_markers: d_mutation_success_markers(),
            assignment_keywords: d_assignment_keywords(),
            team_keywords: d_team_keywords(),
            subquery_keywords: d_subquery_keywords(),
        }
    }
}

fn d_wake_word() -> String {
    "부덕아".into()
}

fn d_planning_max_retry() -> u32 {
    3
}

fn d_max_iterations() -> u32 {
    6
}

fn d_mutation_success_markers() -> Vec<String> {
    [
        "생성되었습니다",
        "수정되었습니다",
        "삭제되었습니다",
        "\"success\": true",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn d_assignment_keywords() -> Vec<String> {
    ["맡고 있는", "담당", "책임자", "담당자", "맡은"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn d_team_keywords() -> Vec<String> {
    ["팀원", "같은 팀", "팀에서", "팀의"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn d_subquery_keywords() -> Vec<String> {
    [
        "이전에 찾은",
        "그 담당자",
        "그 사람",
        "그 액션",
        "그 팀원",
        "그 팀",
        "그 결정",
        "찾은",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn d_true() -> bool {
    true
}
