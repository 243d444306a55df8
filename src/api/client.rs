use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::chat::{ChatReply, ChatUsage, ReplyMarkup, OPENING_PROMPT};
use super::types::{
    Answer, ChatRequest, ChatResponse, HistoryEntry, MbtiResult, NewUser, Question, User,
    UserReport, UserSummary,
};

/// Client for the assessment backend's REST resources
pub struct ApiClient {
    client: Client,
    base_url: String,
    markup: ReplyMarkup,
    usage: ChatUsage,
}

impl ApiClient {
    /// # Arguments
    /// * `base_url` - Backend base URL (e.g., "http://localhost:8000")
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            markup: ReplyMarkup::new()?,
            usage: ChatUsage::default(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Chat usage accumulated by this client
    pub fn usage(&self) -> &ChatUsage {
        &self.usage
    }

    /// Fetch a user; `Ok(None)` when the backend does not know the id
    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let url = format!("{}/users/{}", self.base_url, user_id);
        let response = self.client.get(&url).send().await.context("GET /users failed")?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("User {} not found", user_id);
            return Ok(None);
        }
        read_json(response).await.map(Some)
    }

    /// All users with their progress flags
    pub async fn users(&self) -> Result<Vec<UserSummary>> {
        let url = format!("{}/users", self.base_url);
        let response = self.client.get(&url).send().await.context("GET /users failed")?;
        read_json(response).await
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<User> {
        let url = format!("{}/users", self.base_url);
        let response = self.client.post(&url).json(user).send().await.context("POST /users failed")?;

        let created: User = read_json(response).await?;
        info!("Created user {} ({})", created.id, created.name);
        Ok(created)
    }

    pub async fn questions(&self) -> Result<Vec<Question>> {
        let url = format!("{}/questions", self.base_url);
        let response = self.client.get(&url).send().await.context("GET /questions failed")?;
        read_json(response).await
    }

    pub async fn submit_answer(&self, answer: &Answer) -> Result<()> {
        let url = format!("{}/answers", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(answer)
            .send()
            .await
            .context("POST /answers failed")?;

        let _: serde_json::Value = read_json(response).await?;
        debug!("Answer {} recorded for question {}", answer.selected_key, answer.question_id);
        Ok(())
    }

    pub async fn result(&self, user_id: &str) -> Result<MbtiResult> {
        let url = format!("{}/users/{}/result", self.base_url, user_id);
        let response = self.client.get(&url).send().await.context("GET /result failed")?;
        read_json(response).await
    }

    /// Address of the printable report, for sharing
    pub fn report_pdf_url(&self, user_id: &str) -> String {
        format!("{}/api/v1/user-report/{}/pdf", self.base_url, user_id)
    }

    /// Quiz scores and interview reports collected for a user
    pub async fn report(&self, user_id: &str) -> Result<UserReport> {
        let url = format!("{}/api/v1/user-report/{}", self.base_url, user_id);
        let response = self.client.get(&url).send().await.context("GET /user-report failed")?;

        // Unknown users come back as 200 with an `error` field
        let body: serde_json::Value = read_json(response).await?;
        if let Some(error) = body.get("error") {
            bail!("Report for {} unavailable: {}", user_id, error);
        }
        serde_json::from_value(body).context("Failed to parse user report")
    }

    /// Download the rendered PDF report
    pub async fn report_pdf(&self, user_id: &str) -> Result<Vec<u8>> {
        let url = self.report_pdf_url(user_id);
        let response = self.client.get(&url).send().await.context("GET /user-report pdf failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            bail!("Backend returned {}: {}", status, error_text);
        }

        let bytes = response.bytes().await.context("Failed to read PDF report")?;
        debug!("Downloaded {} byte report for {}", bytes.len(), user_id);
        Ok(bytes.to_vec())
    }

    /// Chat history with markup removed; entries left empty are dropped
    pub async fn chat_history(&self, user_id: &str) -> Result<Vec<HistoryEntry>> {
        let url = format!("{}/chat/history/{}", self.base_url, user_id);
        let response = self.client.get(&url).send().await.context("GET /chat/history failed")?;

        let entries: Vec<HistoryEntry> = read_json(response).await?;
        Ok(self.markup.clean_history(entries))
    }

    /// Send one chat message and post-process the reply
    pub async fn send_chat(&mut self, user_id: &str, message: &str) -> Result<ChatReply> {
        let url = format!("{}/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("user_id", user_id)])
            .json(&ChatRequest { message })
            .send()
            .await
            .context("POST /chat failed")?;

        let status = response.status();
        let body: ChatResponse = response.json().await.context("Failed to parse chat response")?;

        if let Some(detail) = &body.detail {
            bail!("Chat request rejected ({}): {}", status, detail);
        }
        if !status.is_success() {
            bail!("Chat request failed: {}", status);
        }

        self.usage.record(&body);
        let reply = self.markup.reply(&body);
        if reply.is_final && reply.report.is_none() {
            warn!("Interview marked final but no report was attached");
        }
        Ok(reply)
    }

    /// Start the text interview if the user has no history yet
    ///
    /// Returns the existing history, or the opening reply as its only entry.
    pub async fn open_chat(&mut self, user_id: &str) -> Result<Vec<HistoryEntry>> {
        let history = self.chat_history(user_id).await?;
        if !history.is_empty() {
            return Ok(history);
        }

        info!("No chat history for {}, opening interview", user_id);
        let reply = self.send_chat(user_id, OPENING_PROMPT).await?;
        Ok(vec![HistoryEntry {
            role: "assistant".to_string(),
            content: reply.text,
        }])
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        bail!("Backend returned {}: {}", status, error_text);
    }

    response.json().await.context("Failed to parse backend response")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_removed() {
        let client = ApiClient::new("http://localhost:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
    }
}
