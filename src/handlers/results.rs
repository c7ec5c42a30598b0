// src/handlers/results.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        question::AnswerOption,
        result::{
            CorrectionEntry, CreateResultRequest, QuizResult, ResultIdentity, ScoreResponse,
            SubmitQuizRequest, UserAnswer,
        },
    },
    utils::jwt::Claims,
};

const RESULT_COLUMNS: &str = "id, score, quiz_id, user_id, guest_id, created_at";

/// A question id paired with its single correct answer id.
#[derive(Debug, Clone, sqlx::FromRow)]
struct CorrectAnswer {
    question_id: i64,
    answer_id: i64,
}

/// Query parameters for a guest score submission.
#[derive(Debug, Deserialize)]
pub struct ResultQuery {
    pub quiz_id: i64,
}

/// Query parameters for a guest score retrieval.
#[derive(Debug, Deserialize)]
pub struct ScoreQuery {
    pub quiz_id: i64,
    pub guest_id: String,
}

/// Counts the questions answered correctly.
///
/// A question scores 1 iff a submitted pair exists for its id and carries
/// the correct answer id. Questions the taker skipped contribute 0, pairs
/// for unknown question ids never match, and when the taker submits several
/// pairs for one question the first one wins.
fn calc_quiz_score(correct_answers: &[CorrectAnswer], user_answers: &[UserAnswer]) -> i64 {
    correct_answers
        .iter()
        .filter(|correct| {
            user_answers
                .iter()
                .find(|ua| ua.question_id == correct.question_id)
                .is_some_and(|ua| ua.answer_id == correct.answer_id)
        })
        .count() as i64
}

/// Records a guest's score for a quiz.
pub async fn record_guest_score(
    State(pool): State<PgPool>,
    Query(params): Query<ResultQuery>,
    Json(payload): Json<CreateResultRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let identity = ResultIdentity::Guest(payload.guest_id);
    let result = record_score(&pool, params.quiz_id, identity, &payload.user_answers).await?;

    Ok((StatusCode::CREATED, Json(result)))
}

/// Retrieves a guest's stored result, with the quiz's corrections.
pub async fn get_guest_score(
    State(pool): State<PgPool>,
    Query(params): Query<ScoreQuery>,
) -> Result<impl IntoResponse, AppError> {
    let identity = ResultIdentity::Guest(params.guest_id);
    let response = load_score(&pool, params.quiz_id, &identity).await?;

    Ok(Json(response))
}

/// Records the authenticated caller's score for a quiz.
pub async fn submit_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<SubmitQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let identity = ResultIdentity::User(claims.user_id()?);
    let result = record_score(&pool, quiz_id, identity, &payload.user_answers).await?;

    Ok(Json(result))
}

/// Retrieves the authenticated caller's stored result for a quiz.
pub async fn get_my_score(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let identity = ResultIdentity::User(claims.user_id()?);
    let response = load_score(&pool, quiz_id, &identity).await?;

    Ok(Json(response))
}

/// Computes the score for a submission and upserts the (quiz, identity)
/// result row.
///
/// The find-then-write below is deliberately unsynchronized: concurrent
/// submissions for the same identity are last-write-wins.
async fn record_score(
    pool: &PgPool,
    quiz_id: i64,
    identity: ResultIdentity,
    user_answers: &[UserAnswer],
) -> Result<QuizResult, AppError> {
    ensure_quiz_exists(pool, quiz_id).await?;

    let correct_answers = fetch_correct_answers(pool, quiz_id).await?;
    let score = calc_quiz_score(&correct_answers, user_answers);

    let existing = find_result(pool, quiz_id, &identity).await?;

    let result = match existing {
        Some(result) => {
            sqlx::query_as::<_, QuizResult>(&format!(
                "UPDATE results SET score = $1 WHERE id = $2 RETURNING {}",
                RESULT_COLUMNS
            ))
            .bind(score)
            .bind(result.id)
            .fetch_one(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, QuizResult>(&format!(
                "INSERT INTO results (score, quiz_id, user_id, guest_id) VALUES ($1, $2, $3, $4) RETURNING {}",
                RESULT_COLUMNS
            ))
            .bind(score)
            .bind(quiz_id)
            .bind(identity.user_id())
            .bind(identity.guest_id())
            .fetch_one(pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to record result for quiz {}: {:?}", quiz_id, e);
                AppError::InternalServerError(e.to_string())
            })?
        }
    };

    Ok(result)
}

async fn load_score(
    pool: &PgPool,
    quiz_id: i64,
    identity: &ResultIdentity,
) -> Result<ScoreResponse, AppError> {
    ensure_quiz_exists(pool, quiz_id).await?;

    let result = find_result(pool, quiz_id, identity)
        .await?
        .ok_or(AppError::NotFound("Result not found".to_string()))?;

    // The taker already submitted, so the corrections can be shown.
    #[derive(sqlx::FromRow)]
    struct CorrectionRow {
        question_id: i64,
        text: String,
        answer_id: i64,
        answer_text: String,
    }

    let corrections = sqlx::query_as::<_, CorrectionRow>(
        r#"
        SELECT q.id AS question_id, q.text, a.id AS answer_id, a.text AS answer_text
        FROM questions q
        JOIN answers a ON a.question_id = q.id AND a.is_correct
        WHERE q.quiz_id = $1
        ORDER BY q.id
        "#,
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await?;

    let questions = corrections
        .into_iter()
        .map(|row| CorrectionEntry {
            id: row.question_id,
            text: row.text,
            correct_answer: AnswerOption {
                id: row.answer_id,
                text: row.answer_text,
            },
        })
        .collect();

    Ok(ScoreResponse::from_result(result, questions))
}

/// Not-found is reported before any scoring is attempted.
async fn ensure_quiz_exists(pool: &PgPool, quiz_id: i64) -> Result<(), AppError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM quizzes WHERE id = $1")
        .bind(quiz_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    Ok(())
}

async fn fetch_correct_answers(
    pool: &PgPool,
    quiz_id: i64,
) -> Result<Vec<CorrectAnswer>, AppError> {
    let correct_answers = sqlx::query_as::<_, CorrectAnswer>(
        r#"
        SELECT q.id AS question_id, a.id AS answer_id
        FROM questions q
        JOIN answers a ON a.question_id = q.id AND a.is_correct
        WHERE q.quiz_id = $1
        ORDER BY q.id
        "#,
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await?;

    Ok(correct_answers)
}

async fn find_result(
    pool: &PgPool,
    quiz_id: i64,
    identity: &ResultIdentity,
) -> Result<Option<QuizResult>, AppError> {
    let result = match identity {
        ResultIdentity::User(user_id) => {
            sqlx::query_as::<_, QuizResult>(&format!(
                "SELECT {} FROM results WHERE quiz_id = $1 AND user_id = $2",
                RESULT_COLUMNS
            ))
            .bind(quiz_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?
        }
        ResultIdentity::Guest(guest_id) => {
            sqlx::query_as::<_, QuizResult>(&format!(
                "SELECT {} FROM results WHERE quiz_id = $1 AND guest_id = $2",
                RESULT_COLUMNS
            ))
            .bind(quiz_id)
            .bind(guest_id)
            .fetch_optional(pool)
            .await?
        }
    };

    Ok(result)
}
