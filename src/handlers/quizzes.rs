// src/handlers/quizzes.rs

use std::collections::{HashMap, HashSet};

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        question::{AnswerInput, QuestionDetail, QuestionInput},
        quiz::{CreateQuizRequest, Quiz, QuizDetail, QuizPage, UpdateQuizRequest, UserQuizPage},
    },
    utils::{html::clean_html, jwt::Claims},
};

/// Query parameters for the public cursor-paginated quiz feed.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Id of the last quiz of the previous page.
    pub cursor: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}

/// Query parameters for the owner's offset-paginated listing.
#[derive(Debug, Deserialize)]
pub struct UserListParams {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}

/// Creates a quiz with its full question set, owned by the caller.
///
/// Quiz, questions and answers are inserted in one transaction.
pub async fn create_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let user_id = claims.user_id()?;

    let mut tx = pool.begin().await?;

    let quiz = sqlx::query_as::<_, Quiz>(
        r#"
        INSERT INTO quizzes (title, description, user_id)
        VALUES ($1, $2, $3)
        RETURNING id, title, description, user_id, created_at
        "#,
    )
    .bind(clean_html(&payload.title))
    .bind(clean_html(&payload.description))
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    for question in &payload.questions {
        insert_question(&mut *tx, quiz.id, question).await?;
    }

    tx.commit().await.map_err(|e| {
        tracing::error!("Failed to create quiz: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(quiz)))
}

/// Lists quizzes, newest first, with keyset (cursor) pagination.
///
/// The cursor is the id of the last quiz of the previous page; rows strictly
/// after it in (created_at, id) descending order are returned, and the
/// continuation cursor is omitted once the page reaches the globally oldest
/// quiz.
pub async fn list_quizzes(
    State(pool): State<PgPool>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let search_pattern = params.search.map(|k| format!("%{}%", k));

    let cursor_created_at = match params.cursor {
        Some(cursor_id) => Some(
            sqlx::query_scalar::<_, chrono::DateTime<chrono::Utc>>(
                "SELECT created_at FROM quizzes WHERE id = $1",
            )
            .bind(cursor_id)
            .fetch_optional(&pool)
            .await?
            .ok_or(AppError::NotFound("Cursor quiz not found".to_string()))?,
        ),
        None => None,
    };

    let quizzes = sqlx::query_as::<_, Quiz>(
        r#"
        SELECT id, title, description, user_id, created_at
        FROM quizzes
        WHERE ($1::TEXT IS NULL OR title ILIKE $1)
          AND ($2::TIMESTAMPTZ IS NULL OR (created_at, id) < ($2, $3))
        ORDER BY created_at DESC, id DESC
        LIMIT $4
        "#,
    )
    .bind(&search_pattern)
    .bind(cursor_created_at)
    .bind(params.cursor)
    .bind(limit)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list quizzes: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM quizzes WHERE ($1::TEXT IS NULL OR title ILIKE $1)",
    )
    .bind(&search_pattern)
    .fetch_one(&pool)
    .await?;

    // The front-end hides its "load more" control when the cursor is absent.
    let oldest_id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM quizzes ORDER BY created_at ASC, id ASC LIMIT 1")
            .fetch_optional(&pool)
            .await?;

    let next_cursor = quizzes
        .last()
        .map(|last| last.id)
        .filter(|last_id| Some(*last_id) != oldest_id);

    Ok(Json(QuizPage {
        total,
        data: quizzes,
        next_cursor,
    }))
}

/// Lists the caller's own quizzes with offset pagination.
pub async fn list_user_quizzes(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<UserListParams>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let offset = params.offset.unwrap_or(0).max(0);
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let search_pattern = params.search.map(|k| format!("%{}%", k));

    let quizzes = sqlx::query_as::<_, Quiz>(
        r#"
        SELECT id, title, description, user_id, created_at
        FROM quizzes
        WHERE user_id = $1
          AND ($2::TEXT IS NULL OR title ILIKE $2)
        ORDER BY created_at DESC, id DESC
        OFFSET $3
        LIMIT $4
        "#,
    )
    .bind(user_id)
    .bind(&search_pattern)
    .bind(offset)
    .bind(limit)
    .fetch_all(&pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM quizzes WHERE user_id = $1 AND ($2::TEXT IS NULL OR title ILIKE $2)",
    )
    .bind(user_id)
    .bind(&search_pattern)
    .fetch_one(&pool)
    .await?;

    Ok(Json(UserQuizPage {
        total,
        data: quizzes,
    }))
}

/// Retrieves a quiz with its questions and answer options.
///
/// This is the taker's view: the correct flag is never included.
pub async fn get_quiz(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = sqlx::query_as::<_, Quiz>(
        "SELECT id, title, description, user_id, created_at FROM quizzes WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    let detail = load_quiz_detail(&pool, quiz).await?;

    Ok(Json(detail))
}

/// Same detail view, restricted to quizzes the caller owns.
pub async fn get_user_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let quiz = sqlx::query_as::<_, Quiz>(
        "SELECT id, title, description, user_id, created_at FROM quizzes WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    let detail = load_quiz_detail(&pool, quiz).await?;

    Ok(Json(detail))
}

/// Applies a full replacement of a quiz's question set.
///
/// Incoming questions are partitioned against the current question ids:
/// matched ids are updated in place (text updated, answers recreated),
/// missing ids are deleted, and questions without a known id are created.
/// A structural change (any create or delete) invalidates every stored
/// result for the quiz, inside one transaction with the update itself;
/// an in-place-only update leaves results untouched and runs without a
/// wrapping transaction.
pub async fn update_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let user_id = claims.user_id()?;

    // Ownership scope is checked before any mutation.
    sqlx::query_scalar::<_, i64>("SELECT id FROM quizzes WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    let current_ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM questions WHERE quiz_id = $1")
        .bind(id)
        .fetch_all(&pool)
        .await?;

    let partition = partition_questions(&current_ids, &payload.questions);

    let quiz = if partition.is_structural() {
        // Stored results reference answer ids the structural change may
        // destroy, so they are deleted atomically with the update.
        let mut tx = pool.begin().await?;

        let quiz = update_quiz_row(&mut *tx, id, &payload.title, &payload.description).await?;

        if !partition.to_delete.is_empty() {
            sqlx::query("DELETE FROM questions WHERE quiz_id = $1 AND id = ANY($2)")
                .bind(id)
                .bind(&partition.to_delete)
                .execute(&mut *tx)
                .await?;
        }

        for question in &partition.to_create {
            insert_question(&mut *tx, id, question).await?;
        }

        for (question_id, question) in &partition.to_update {
            apply_question_update(&mut *tx, *question_id, question).await?;
        }

        sqlx::query("DELETE FROM results WHERE quiz_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await.map_err(|e| {
            tracing::error!("Failed to update quiz {}: {:?}", id, e);
            AppError::InternalServerError(e.to_string())
        })?;

        quiz
    } else {
        // Only in-place updates: the question set is unchanged, results
        // stay valid and no wrapping transaction is used.
        let mut conn = pool.acquire().await?;

        let quiz = update_quiz_row(&mut *conn, id, &payload.title, &payload.description).await?;

        for (question_id, question) in &partition.to_update {
            apply_question_update(&mut *conn, *question_id, question).await?;
        }

        quiz
    };

    Ok(Json(quiz))
}

/// Deletes a quiz the caller owns. Questions, answers and results go with
/// it via the foreign-key cascades.
pub async fn delete_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let result = sqlx::query("DELETE FROM quizzes WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete quiz {}: {:?}", id, e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// The three-way partition a quiz update applies to its question set.
pub(crate) struct QuestionPartition<'a> {
    /// Ids present on the quiz and in the input: updated in place.
    pub to_update: Vec<(i64, &'a QuestionInput)>,
    /// Input questions with no id, or an id the quiz does not own: created.
    pub to_create: Vec<&'a QuestionInput>,
    /// Current ids absent from the input: deleted.
    pub to_delete: Vec<i64>,
}

impl QuestionPartition<'_> {
    /// True when the question set itself changes, not just question texts.
    pub(crate) fn is_structural(&self) -> bool {
        !self.to_create.is_empty() || !self.to_delete.is_empty()
    }
}

pub(crate) fn partition_questions<'a>(
    current_ids: &[i64],
    incoming: &'a [QuestionInput],
) -> QuestionPartition<'a> {
    let incoming_ids: HashSet<i64> = incoming.iter().filter_map(|q| q.id).collect();

    let to_delete = current_ids
        .iter()
        .copied()
        .filter(|id| !incoming_ids.contains(id))
        .collect();

    let mut to_update = Vec::new();
    let mut to_create = Vec::new();

    for question in incoming {
        match question.id {
            Some(id) if current_ids.contains(&id) => to_update.push((id, question)),
            _ => to_create.push(question),
        }
    }

    QuestionPartition {
        to_update,
        to_create,
        to_delete,
    }
}

async fn update_quiz_row(
    conn: &mut PgConnection,
    quiz_id: i64,
    title: &str,
    description: &str,
) -> Result<Quiz, AppError> {
    let quiz = sqlx::query_as::<_, Quiz>(
        r#"
        UPDATE quizzes
        SET title = $1, description = $2
        WHERE id = $3
        RETURNING id, title, description, user_id, created_at
        "#,
    )
    .bind(clean_html(title))
    .bind(clean_html(description))
    .bind(quiz_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(quiz)
}

async fn insert_question(
    conn: &mut PgConnection,
    quiz_id: i64,
    question: &QuestionInput,
) -> Result<(), AppError> {
    let question_id: i64 =
        sqlx::query_scalar("INSERT INTO questions (text, quiz_id) VALUES ($1, $2) RETURNING id")
            .bind(clean_html(&question.text))
            .bind(quiz_id)
            .fetch_one(&mut *conn)
            .await?;

    insert_answers(conn, question_id, &question.answers).await
}

/// Updates an in-place question: text replaced, answers deleted and
/// recreated wholesale from the input.
async fn apply_question_update(
    conn: &mut PgConnection,
    question_id: i64,
    question: &QuestionInput,
) -> Result<(), AppError> {
    sqlx::query("UPDATE questions SET text = $1 WHERE id = $2")
        .bind(clean_html(&question.text))
        .bind(question_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("DELETE FROM answers WHERE question_id = $1")
        .bind(question_id)
        .execute(&mut *conn)
        .await?;

    insert_answers(conn, question_id, &question.answers).await
}

async fn insert_answers(
    conn: &mut PgConnection,
    question_id: i64,
    answers: &[AnswerInput],
) -> Result<(), AppError> {
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO answers (text, is_correct, question_id) ");

    builder.push_values(answers, |mut b, answer| {
        b.push_bind(clean_html(&answer.text))
            .push_bind(answer.is_correct)
            .push_bind(question_id);
    });

    builder.build().execute(&mut *conn).await?;

    Ok(())
}

async fn load_quiz_detail(pool: &PgPool, quiz: Quiz) -> Result<QuizDetail, AppError> {
    #[derive(sqlx::FromRow)]
    struct QuestionRow {
        id: i64,
        text: String,
    }

    #[derive(sqlx::FromRow)]
    struct AnswerRow {
        id: i64,
        text: String,
        question_id: i64,
    }

    let questions =
        sqlx::query_as::<_, QuestionRow>("SELECT id, text FROM questions WHERE quiz_id = $1 ORDER BY id")
            .bind(quiz.id)
            .fetch_all(pool)
            .await?;

    let answers = sqlx::query_as::<_, AnswerRow>(
        r#"
        SELECT a.id, a.text, a.question_id
        FROM answers a
        JOIN questions q ON q.id = a.question_id
        WHERE q.quiz_id = $1
        ORDER BY a.id
        "#,
    )
    .bind(quiz.id)
    .fetch_all(pool)
    .await?;

    let mut answers_by_question: HashMap<i64, Vec<crate::models::question::AnswerOption>> =
        HashMap::new();
    for answer in answers {
        answers_by_question
            .entry(answer.question_id)
            .or_default()
            .push(crate::models::question::AnswerOption {
                id: answer.id,
                text: answer.text,
            });
    }

    let questions = questions
        .into_iter()
        .map(|q| QuestionDetail {
            answers: answers_by_question.remove(&q.id).unwrap_or_default(),
            id: q.id,
            text: q.text,
        })
        .collect();

    Ok(QuizDetail {
        id: quiz.id,
        title: quiz.title,
        description: quiz.description,
        user_id: quiz.user_id,
        created_at: quiz.created_at,
        questions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: Option<i64>) -> QuestionInput {
        QuestionInput {
            id,
            text: "q".to_string(),
            answers: Vec::new(),
        }
    }

    #[test]
    fn matched_ids_are_updated_in_place() {
        let incoming = vec![question(Some(1)), question(Some(2))];
        let partition = partition_questions(&[1, 2], &incoming);

        assert_eq!(
            partition.to_update.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(partition.to_create.is_empty());
        assert!(partition.to_delete.is_empty());
        assert!(!partition.is_structural());
    }

    #[test]
    fn missing_ids_are_deleted_and_new_questions_created() {
        let incoming = vec![question(Some(2)), question(None)];
        let partition = partition_questions(&[1, 2], &incoming);

        assert_eq!(partition.to_update.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![2]);
        assert_eq!(partition.to_create.len(), 1);
        assert_eq!(partition.to_delete, vec![1]);
        assert!(partition.is_structural());
    }

    #[test]
    fn unknown_ids_count_as_new_questions() {
        // An id the quiz does not own cannot be updated in place.
        let incoming = vec![question(Some(99))];
        let partition = partition_questions(&[1], &incoming);

        assert!(partition.to_update.is_empty());
        assert_eq!(partition.to_create.len(), 1);
        assert_eq!(partition.to_delete, vec![1]);
        assert!(partition.is_structural());
    }

    #[test]
    fn empty_overlap_replaces_the_whole_set() {
        let incoming = vec![question(None), question(None)];
        let partition = partition_questions(&[5, 6, 7], &incoming);

        assert!(partition.to_update.is_empty());
        assert_eq!(partition.to_create.len(), 2);
        assert_eq!(partition.to_delete, vec![5, 6, 7]);
        assert!(partition.is_structural());
    }
}
