// src/models/question.rs

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Incoming question payload for quiz create/update.
///
/// An `id` marks a question that already exists on the quiz; questions
/// without one (or with an id the quiz does not own) are created fresh.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct QuestionInput {
    pub id: Option<i64>,
    #[validate(length(min = 1, max = 1000, message = "Question text must not be empty."))]
    pub text: String,
    #[validate(
        length(equal = 5, message = "A question must have exactly 5 answers."),
        custom(function = validate_answers),
        nested
    )]
    pub answers: Vec<AnswerInput>,
}

/// Incoming answer payload. Answers are always recreated from the input on
/// update, so the id is accepted for wire compatibility but not required.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct AnswerInput {
    pub id: Option<i64>,
    #[validate(length(min = 1, max = 500, message = "Answer text must not be empty."))]
    pub text: String,
    pub is_correct: bool,
}

/// Scoring relies on a single correct answer per question, so the rule is
/// checked at the boundary rather than left to convention.
fn validate_answers(answers: &[AnswerInput]) -> Result<(), ValidationError> {
    if answers.iter().filter(|a| a.is_correct).count() != 1 {
        return Err(ValidationError::new("exactly_one_correct_answer"));
    }
    Ok(())
}

/// Question as exposed in the quiz detail view.
#[derive(Debug, Serialize)]
pub struct QuestionDetail {
    pub id: i64,
    pub text: String,
    pub answers: Vec<AnswerOption>,
}

/// Answer as shown to a quiz taker. The correct flag is never exposed here.
#[derive(Debug, Serialize)]
pub struct AnswerOption {
    pub id: i64,
    pub text: String,
}
