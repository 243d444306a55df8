//! Guided forced-choice quiz
//!
//! Resumes where the user left off (`current_static_step`), submits each
//! answer as it is given and fetches the scores once every question is done.

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::client::ApiClient;
use super::types::{Answer, MbtiResult, Question};

pub struct Quiz {
    user_id: String,
    questions: Vec<Question>,
    position: usize,
}

impl Quiz {
    /// Build a quiz over `questions`, skipping the first `answered`
    pub fn new(user_id: impl Into<String>, questions: Vec<Question>, answered: usize) -> Self {
        let position = answered.min(questions.len());
        Self {
            user_id: user_id.into(),
            questions,
            position,
        }
    }

    /// Load the user and the question list from the backend
    pub async fn start(client: &ApiClient, user_id: &str) -> Result<Self> {
        let user = client
            .get_user(user_id)
            .await?
            .with_context(|| format!("User {} not found", user_id))?;
        let questions = client.questions().await?;

        let quiz = Self::new(user.id, questions, user.current_static_step as usize);
        info!(
            "Quiz for {}: {} of {} questions left",
            quiz.user_id,
            quiz.remaining(),
            quiz.questions.len()
        );
        Ok(quiz)
    }

    /// The question waiting for an answer, if any
    pub fn current(&self) -> Option<&Question> {
        self.questions.get(self.position)
    }

    /// 1-based number of the current question and the total
    pub fn progress(&self) -> (usize, usize) {
        (self.position + 1, self.questions.len())
    }

    pub fn remaining(&self) -> usize {
        self.questions.len() - self.position
    }

    pub fn is_finished(&self) -> bool {
        self.current().is_none()
    }

    /// Answer the current question
    ///
    /// Returns `Ok(false)` without contacting the backend when `input` is not
    /// one of the question's options.
    pub async fn answer(&mut self, client: &ApiClient, input: &str) -> Result<bool> {
        let Some(question) = self.current() else {
            return Ok(false);
        };
        let Some(key) = question.resolve(input) else {
            debug!("Rejected answer {:?} for question {}", input, question.id);
            return Ok(false);
        };

        let answer = Answer {
            user_id: self.user_id.clone(),
            question_id: question.id,
            selected_key: key.to_string(),
        };
        client.submit_answer(&answer).await?;

        self.position += 1;
        Ok(true)
    }

    /// Fetch the scores; call once every question is answered
    pub async fn finish(&self, client: &ApiClient) -> Result<MbtiResult> {
        let result = client.result(&self.user_id).await?;
        info!("Quiz finished for {}: {}", self.user_id, result.mbti_type);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn questions(n: i64) -> Vec<Question> {
        (1..=n)
            .map(|id| Question {
                id,
                situation: String::new(),
                text: format!("q{}", id),
                option_a: "a".into(),
                key_a: "E".into(),
                option_b: "b".into(),
                key_b: "I".into(),
            })
            .collect()
    }

    #[test]
    fn test_resumes_at_answered_count() {
        let quiz = Quiz::new("u1", questions(4), 3);

        assert_eq!(quiz.current().map(|q| q.id), Some(4));
        assert_eq!(quiz.progress(), (4, 4));
        assert_eq!(quiz.remaining(), 1);
    }

    #[test]
    fn test_answered_past_end_is_finished() {
        let quiz = Quiz::new("u1", questions(2), 56);

        assert!(quiz.is_finished());
        assert_eq!(quiz.remaining(), 0);
    }
}
