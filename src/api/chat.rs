//! Text interview post-processing
//!
//! Interviewer replies carry inline markup meant for the client:
//! `[[LOG: ...]]` diagnostic notes and a `<REPORT>{json}</REPORT>` block at
//! the end of the interview. Both are stripped before display.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use super::types::{AssessmentReport, ChatResponse, HistoryEntry};
use crate::session::SessionUsage;

/// Sent when a user opens the text interview with no history
pub const OPENING_PROMPT: &str = "Начни диалог";

/// Compiled reply markup patterns
#[derive(Debug, Clone)]
pub struct ReplyMarkup {
    log: Regex,
    log_strip: Regex,
    report: Regex,
}

impl ReplyMarkup {
    pub fn new() -> Result<Self> {
        Ok(Self {
            log: Regex::new(r"\[\[LOG: (.*?)\]\]").context("invalid log pattern")?,
            log_strip: Regex::new(r"\[\[LOG:.*?\]\]").context("invalid log pattern")?,
            report: Regex::new(r"(?s)<REPORT>(.*?)</REPORT>").context("invalid report pattern")?,
        })
    }

    /// Remove diagnostic and report markup, trimming what is left
    pub fn clean_text(&self, raw: &str) -> String {
        let without_logs = self.log_strip.replace_all(raw, "");
        self.report.replace_all(&without_logs, "").trim().to_string()
    }

    /// The last diagnostic note in `raw`, if any
    pub fn last_diagnostic(&self, raw: &str) -> Option<String> {
        self.log
            .captures_iter(raw)
            .last()
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Parse the first `<REPORT>` block in `raw`
    ///
    /// Returns `None` (and logs) when the block is missing or not valid JSON.
    pub fn extract_report(&self, raw: &str) -> Option<AssessmentReport> {
        let body = self.report.captures(raw)?.get(1)?.as_str();

        match serde_json::from_str(body.trim()) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Failed to parse report block: {}", e);
                None
            }
        }
    }

    pub(crate) fn reply(&self, response: &ChatResponse) -> ChatReply {
        let report = response
            .report
            .clone()
            .or_else(|| self.extract_report(&response.text));

        ChatReply {
            text: self.clean_text(&response.text),
            diagnostic: self.last_diagnostic(&response.text),
            is_final: response.is_final || report.is_some(),
            report,
        }
    }

    /// Clean stored history for display, dropping entries that were only markup
    pub fn clean_history(&self, entries: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
        entries
            .into_iter()
            .filter_map(|entry| {
                let content = self.clean_text(&entry.content);
                (!content.is_empty()).then(|| HistoryEntry {
                    role: entry.role,
                    content,
                })
            })
            .collect()
    }
}

/// A chat reply ready for display
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatReply {
    /// Display text; may be empty when the reply was only markup
    pub text: String,
    pub diagnostic: Option<String>,
    pub report: Option<AssessmentReport>,
    pub is_final: bool,
}

/// Usage accumulated over a text interview
#[derive(Debug, Clone, Default)]
pub struct ChatUsage {
    total: SessionUsage,
}

impl ChatUsage {
    pub(crate) fn record(&mut self, response: &ChatResponse) {
        if let Some(usage) = &response.usage {
            self.total.merge(usage, response.cost);
        }
    }

    pub fn total(&self) -> SessionUsage {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::UsageDelta;

    fn markup() -> ReplyMarkup {
        ReplyMarkup::new().unwrap()
    }

    #[test]
    fn test_clean_text_strips_markup() {
        let raw = "[[LOG: warming up]] Привет! Расскажи о себе. [[LOG: E signal]]";
        assert_eq!(markup().clean_text(raw), "Привет! Расскажи о себе.");
    }

    #[test]
    fn test_clean_text_strips_multiline_report() {
        let raw = "Спасибо!\n<REPORT>\n{\"mbti_type\": \"INTJ\"}\n</REPORT>";
        assert_eq!(markup().clean_text(raw), "Спасибо!");
    }

    #[test]
    fn test_last_diagnostic_wins() {
        let raw = "[[LOG: first]] text [[LOG: second]]";
        assert_eq!(markup().last_diagnostic(raw).as_deref(), Some("second"));
        assert_eq!(markup().last_diagnostic("plain"), None);
    }

    #[test]
    fn test_extract_report() {
        let raw = r#"Bye <REPORT>{"mbti_type": "ENFP", "summary": "Warm", "metrics": {"E_I": 70}}</REPORT>"#;
        let report = markup().extract_report(raw).unwrap();

        assert_eq!(report.mbti_type, "ENFP");
        assert_eq!(report.summary, "Warm");
        assert_eq!(report.metrics.get("E_I"), Some(&70));
        assert!(report.skill_gaps.is_empty());
    }

    #[test]
    fn test_extract_report_invalid_json() {
        assert_eq!(markup().extract_report("<REPORT>{not json</REPORT>"), None);
        assert_eq!(markup().extract_report("no report here"), None);
    }

    #[test]
    fn test_structured_report_preferred() {
        let response = ChatResponse {
            text: r#"Done <REPORT>{"mbti_type": "ISTP"}</REPORT>"#.to_string(),
            report: Some(AssessmentReport {
                mbti_type: "INTJ".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let reply = markup().reply(&response);
        assert_eq!(reply.text, "Done");
        assert_eq!(reply.report.unwrap().mbti_type, "INTJ");
        assert!(reply.is_final);
    }

    #[test]
    fn test_clean_history_drops_empty_entries() {
        let entries = vec![
            HistoryEntry { role: "user".into(), content: OPENING_PROMPT.into() },
            HistoryEntry { role: "assistant".into(), content: "<REPORT>{}</REPORT>".into() },
            HistoryEntry { role: "assistant".into(), content: "Hi [[LOG: x]]".into() },
        ];

        let cleaned = markup().clean_history(entries);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[1].content, "Hi");
    }

    #[test]
    fn test_usage_accumulates() {
        let mut usage = ChatUsage::default();
        let response = ChatResponse {
            usage: Some(UsageDelta { input: 100, output: 20, cached: 50 }),
            cost: Some(0.001),
            ..Default::default()
        };

        usage.record(&response);
        usage.record(&response);
        usage.record(&ChatResponse { cost: Some(5.0), ..Default::default() });

        let total = usage.total();
        assert_eq!(total.input, 200);
        assert_eq!(total.cached, 100);
        assert!((total.cost - 0.002).abs() < 1e-12);
    }
}
