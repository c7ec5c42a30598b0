// src/models/result.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::question::AnswerOption;

/// Represents the 'results' table: one identity's persisted score for one
/// quiz. Exactly one of `user_id` / `guest_id` is set.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizResult {
    pub id: i64,
    pub score: i64,
    pub quiz_id: i64,
    pub user_id: Option<i64>,
    pub guest_id: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// The identity a score submission is keyed by: an authenticated user or an
/// anonymous guest token. Threaded explicitly through every scoring call.
#[derive(Debug, Clone)]
pub enum ResultIdentity {
    User(i64),
    Guest(String),
}

impl ResultIdentity {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            ResultIdentity::User(id) => Some(*id),
            ResultIdentity::Guest(_) => None,
        }
    }

    pub fn guest_id(&self) -> Option<&str> {
        match self {
            ResultIdentity::User(_) => None,
            ResultIdentity::Guest(id) => Some(id),
        }
    }
}

/// One (question, chosen answer) pair of a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAnswer {
    pub question_id: i64,
    pub answer_id: i64,
}

/// DTO for a guest score submission.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateResultRequest {
    #[validate(length(min = 1, max = 200, message = "Guest id must not be empty."))]
    pub guest_id: String,
    #[validate(length(min = 1, message = "At least one answer must be submitted."))]
    pub user_answers: Vec<UserAnswer>,
}

/// DTO for an authenticated score submission; identity comes from the token.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitQuizRequest {
    #[validate(length(min = 1, message = "At least one answer must be submitted."))]
    pub user_answers: Vec<UserAnswer>,
}

/// A question with its correct answer, shown alongside a stored result.
#[derive(Debug, Serialize)]
pub struct CorrectionEntry {
    pub id: i64,
    pub text: String,
    pub correct_answer: AnswerOption,
}

/// Stored result plus the quiz's corrections, returned on score retrieval.
#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub id: i64,
    pub score: i64,
    pub quiz_id: i64,
    pub user_id: Option<i64>,
    pub guest_id: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub questions: Vec<CorrectionEntry>,
}

impl ScoreResponse {
    pub fn from_result(result: QuizResult, questions: Vec<CorrectionEntry>) -> Self {
        Self {
            id: result.id,
            score: result.score,
            quiz_id: result.quiz_id,
            user_id: result.user_id,
            guest_id: result.guest_id,
            created_at: result.created_at,
            questions,
        }
    }
}
