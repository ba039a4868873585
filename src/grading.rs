//! Feedback for a finished role-play
//!
//! A `Grader` turns the advisor's full transcript into spoken feedback.
//! `StaticGrader` always returns a canned line; `RubricGrader` asks an LLM
//! to score the transcript against the Empowered Advisor Call Guide.

use crate::llm::{LlmError, LlmMessage, LlmRequest, LlmService, SystemContent};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Rubric the advisor is graded against
pub const CALL_GUIDE: &str = include_str!("grading/call_guide.md");

const COACH_PERSONA: &str = "You are a call coach grading a service advisor.";

/// Feedback is spoken over the phone, so keep it short
const MAX_FEEDBACK_TOKENS: u32 = 1024;

#[derive(Debug, Error)]
pub enum GradingError {
    #[error("grading model failed: {0}")]
    Llm(#[from] LlmError),
    #[error("grading model returned no feedback")]
    EmptyFeedback,
}

/// Scores a finished call
#[async_trait]
pub trait Grader: Send + Sync {
    /// Grade the caller's utterances, in the order they were spoken
    async fn grade(&self, transcript: &[String]) -> Result<String, GradingError>;
}

#[async_trait]
impl<T: Grader + ?Sized> Grader for Arc<T> {
    async fn grade(&self, transcript: &[String]) -> Result<String, GradingError> {
        (**self).grade(transcript).await
    }
}

/// Which grader a deployment uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GradingMode {
    Static,
    #[default]
    Rubric,
}

impl FromStr for GradingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" | "canned" => Ok(GradingMode::Static),
            "rubric" | "llm" => Ok(GradingMode::Rubric),
            other => Err(format!("unknown grading mode: {other}")),
        }
    }
}

/// Always returns the same congratulatory line
#[derive(Debug, Clone)]
pub struct StaticGrader {
    feedback: String,
}

impl StaticGrader {
    pub fn new(feedback: impl Into<String>) -> Self {
        Self {
            feedback: feedback.into(),
        }
    }
}

#[async_trait]
impl Grader for StaticGrader {
    async fn grade(&self, _transcript: &[String]) -> Result<String, GradingError> {
        Ok(self.feedback.clone())
    }
}

/// Grades the transcript with an LLM against a rubric
pub struct RubricGrader {
    llm: Arc<dyn LlmService>,
    rubric: String,
}

impl RubricGrader {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self::with_rubric(llm, CALL_GUIDE)
    }

    pub fn with_rubric(llm: Arc<dyn LlmService>, rubric: impl Into<String>) -> Self {
        Self {
            llm,
            rubric: rubric.into(),
        }
    }

    fn build_request(&self, transcript: &[String]) -> LlmRequest {
        LlmRequest {
            system: vec![SystemContent::new(COACH_PERSONA)],
            messages: vec![LlmMessage::user(build_grading_prompt(
                &self.rubric,
                transcript,
            ))],
            max_tokens: Some(MAX_FEEDBACK_TOKENS),
        }
    }
}

#[async_trait]
impl Grader for RubricGrader {
    async fn grade(&self, transcript: &[String]) -> Result<String, GradingError> {
        let request = self.build_request(transcript);
        let response = self.llm.complete(&request).await?;
        if !response.end_turn {
            tracing::warn!(model = %self.llm.model_id(), "Grading feedback was truncated");
        }
        let feedback = response.text.trim();
        if feedback.is_empty() {
            return Err(GradingError::EmptyFeedback);
        }
        Ok(feedback.to_string())
    }
}

/// Build the user prompt: rubric, then the advisor's numbered turns
pub fn build_grading_prompt(rubric: &str, transcript: &[String]) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are a call coach grading a service advisor using the following call handling guide:\n\n",
    );
    prompt.push_str(rubric.trim());
    prompt.push_str("\n\nThe advisor said, turn by turn:\n\n");

    if transcript.is_empty() {
        prompt.push_str("(the advisor said nothing)\n");
    }
    for (i, utterance) in transcript.iter().enumerate() {
        let text = utterance.trim();
        let text = if text.is_empty() { "(no response)" } else { text };
        let _ = writeln!(prompt, "{}. {text}", i + 1);
    }

    prompt.push_str(
        "\nPlease provide detailed, constructive feedback, including specific steps they followed or missed.\n\
         Conclude with an encouraging tone and summarize how they can improve next time.\n\
         Keep it brief enough to be read aloud over the phone.",
    );
    prompt
}
