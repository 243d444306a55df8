//! REST stages: registration, quiz, text interview

pub mod chat;
mod client;
pub mod quiz;
mod types;

pub use chat::{ChatReply, ChatUsage, ReplyMarkup, OPENING_PROMPT};
pub use client::ApiClient;
pub use quiz::Quiz;
pub use types::{
    AssessmentReport, Answer, HistoryEntry, MbtiResult, NewUser, Question, ReportSummary, User,
    UserReport, UserSummary,
};
