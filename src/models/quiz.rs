// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::question::{QuestionDetail, QuestionInput};

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// Owning user.
    pub user_id: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a new quiz with its full question set.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200, message = "Title must not be empty."))]
    pub title: String,
    #[validate(length(min = 1, max = 2000, message = "Description must not be empty."))]
    pub description: String,
    #[validate(
        length(min = 1, message = "A quiz must contain at least 1 question."),
        nested
    )]
    pub questions: Vec<QuestionInput>,
}

/// DTO for updating a quiz. The question list is a full replacement of the
/// quiz's question set; ids mark questions that should survive in place.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuizRequest {
    #[validate(length(min = 1, max = 200, message = "Title must not be empty."))]
    pub title: String,
    #[validate(length(min = 1, max = 2000, message = "Description must not be empty."))]
    pub description: String,
    #[validate(
        length(min = 1, message = "A quiz must contain at least 1 question."),
        nested
    )]
    pub questions: Vec<QuestionInput>,
}

/// One page of the public cursor-paginated quiz feed.
#[derive(Debug, Serialize)]
pub struct QuizPage {
    pub total: i64,
    pub data: Vec<Quiz>,
    /// Absent when the page is empty or already reaches the oldest quiz.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<i64>,
}

/// One page of the owner's offset-paginated quiz listing.
#[derive(Debug, Serialize)]
pub struct UserQuizPage {
    pub total: i64,
    pub data: Vec<Quiz>,
}

/// Quiz with its nested questions and answer options, as served to takers.
#[derive(Debug, Serialize)]
pub struct QuizDetail {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub user_id: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub questions: Vec<QuestionDetail>,
}
