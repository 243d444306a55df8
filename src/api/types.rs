use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::session::UsageDelta;

/// Registered participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub gender: String,
    /// Quiz questions answered so far
    pub current_static_step: u32,
}

/// Row of `GET /users`: a user plus how far they got
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub gender: String,
    pub current_static_step: u32,
    /// Text interview started
    #[serde(default)]
    pub has_chat: bool,
    /// A final report exists
    #[serde(default)]
    pub has_voice: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub gender: String,
}

/// One forced-choice quiz question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub situation: String,
    pub text: String,
    pub option_a: String,
    pub key_a: String,
    pub option_b: String,
    pub key_b: String,
}

impl Question {
    /// Whether `key` is one of this question's answer keys
    pub fn accepts(&self, key: &str) -> bool {
        self.key_a == key || self.key_b == key
    }

    /// Map typed input to an answer key
    ///
    /// `a`/`b` pick an option; otherwise the input must be one of the keys,
    /// in either case.
    pub fn resolve(&self, input: &str) -> Option<&str> {
        let input = input.trim();
        if input.eq_ignore_ascii_case("a") {
            return Some(&self.key_a);
        }
        if input.eq_ignore_ascii_case("b") {
            return Some(&self.key_b);
        }
        [&self.key_a, &self.key_b]
            .into_iter()
            .find(|key| key.eq_ignore_ascii_case(input))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub user_id: String,
    pub question_id: i64,
    pub selected_key: String,
}

/// Per-letter quiz scores and the derived four-letter type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MbtiResult {
    #[serde(rename = "E")]
    pub e: u32,
    #[serde(rename = "I")]
    pub i: u32,
    #[serde(rename = "S")]
    pub s: u32,
    #[serde(rename = "N")]
    pub n: u32,
    #[serde(rename = "T")]
    pub t: u32,
    #[serde(rename = "F")]
    pub f: u32,
    #[serde(rename = "J")]
    pub j: u32,
    #[serde(rename = "P")]
    pub p: u32,
    #[serde(rename = "type")]
    pub mbti_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub message: &'a str,
}

/// Raw `POST /chat` response body
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub usage: Option<UsageDelta>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub report: Option<AssessmentReport>,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

/// Interview outcome produced by the backend
///
/// The model writes this block itself, so every field is optional on the
/// wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentReport {
    #[serde(default)]
    pub mbti_type: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, i64>,
    #[serde(default)]
    pub skill_gaps: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

/// Combined report from `GET /api/v1/user-report/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserReport {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub gender: String,
    /// Quiz scores, when any answers exist
    #[serde(default)]
    pub stage_1_static: Option<MbtiResult>,
    #[serde(default)]
    pub stage_2_chat: Option<serde_json::Value>,
    #[serde(default)]
    pub stage_3_voice: Option<serde_json::Value>,
    #[serde(default)]
    pub full_history: Vec<serde_json::Value>,
    #[serde(default)]
    pub summary: ReportSummary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub total_reports_found: u32,
}
