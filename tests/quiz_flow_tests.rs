// tests/quiz_flow_tests.rs

use quiz_api::{config::Config, routes, state::AppState};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

async fn spawn_app() -> Option<(String, PgPool)> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("Skipping test: DATABASE_URL is not set");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: "quiz_flow_test_secret".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        port: 0,
        allowed_origins: vec!["http://localhost:3000".to_string()],
    };

    let state = AppState {
        pool: pool.clone(),
        config,
    };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Some((address, pool))
}

/// Registers a fresh user and returns (bearer token, user id).
async fn register_and_login(client: &reqwest::Client, address: &str) -> (String, i64) {
    let email = format!("q_{}@example.com", &uuid::Uuid::new_v4().to_string()[..8]);

    let user: serde_json::Value = client
        .post(format!("{}/api/users", address))
        .json(&serde_json::json!({
            "email": email,
            "name": "Quiz Author",
            "password": "password123"
        }))
        .send()
        .await
        .expect("Register failed")
        .json()
        .await
        .expect("Failed to parse register json");
    let user_id = user["id"].as_i64().expect("User id missing");

    let login: serde_json::Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({
            "email": email,
            "password": "password123"
        }))
        .send()
        .await
        .expect("Login failed")
        .json()
        .await
        .expect("Failed to parse login json");
    let token = login["access_token"].as_str().expect("Token missing");

    (token.to_string(), user_id)
}

/// Builds a question payload with 5 answers, one of them correct.
fn question_body(text: &str, correct_index: usize) -> serde_json::Value {
    let answers: Vec<serde_json::Value> = (0..5)
        .map(|i| {
            serde_json::json!({
                "text": format!("option {}", i),
                "is_correct": i == correct_index
            })
        })
        .collect();

    serde_json::json!({ "text": text, "answers": answers })
}

/// Creates a two-question quiz and returns its id.
async fn create_quiz(client: &reqwest::Client, address: &str, token: &str, title: &str) -> i64 {
    let response = client
        .post(format!("{}/api/quizzes", address))
        .bearer_auth(token)
        .json(&serde_json::json!({
            "title": title,
            "description": "An integration test quiz",
            "questions": [
                question_body("First question", 0),
                question_body("Second question", 1),
            ]
        }))
        .send()
        .await
        .expect("Create quiz failed");

    assert_eq!(response.status().as_u16(), 201);
    let quiz: serde_json::Value = response.json().await.unwrap();
    quiz["id"].as_i64().expect("Quiz id missing")
}

/// (question id, correct answer id, one wrong answer id) per question.
async fn answer_key(pool: &PgPool, quiz_id: i64) -> Vec<(i64, i64, i64)> {
    let question_ids: Vec<i64> =
        sqlx::query_scalar("SELECT id FROM questions WHERE quiz_id = $1 ORDER BY id")
            .bind(quiz_id)
            .fetch_all(pool)
            .await
            .unwrap();

    let mut key = Vec::new();
    for question_id in question_ids {
        let correct: i64 = sqlx::query_scalar(
            "SELECT id FROM answers WHERE question_id = $1 AND is_correct ORDER BY id LIMIT 1",
        )
        .bind(question_id)
        .fetch_one(pool)
        .await
        .unwrap();

        let wrong: i64 = sqlx::query_scalar(
            "SELECT id FROM answers WHERE question_id = $1 AND NOT is_correct ORDER BY id LIMIT 1",
        )
        .bind(question_id)
        .fetch_one(pool)
        .await
        .unwrap();

        key.push((question_id, correct, wrong));
    }
    key
}

async fn result_count(pool: &PgPool, quiz_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM results WHERE quiz_id = $1")
        .bind(quiz_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn quiz_detail_never_exposes_the_correct_flag() {
    // Arrange
    let Some((address, _pool)) = spawn_app().await else { return };
    let client = reqwest::Client::new();
    let (token, user_id) = register_and_login(&client, &address).await;
    let quiz_id = create_quiz(&client, &address, &token, "Detail quiz").await;

    // Act: the public detail view needs no token
    let detail: serde_json::Value = client
        .get(format!("{}/api/quizzes/{}", address, quiz_id))
        .send()
        .await
        .expect("Get quiz failed")
        .json()
        .await
        .unwrap();

    // Assert
    assert_eq!(detail["user_id"].as_i64(), Some(user_id));
    let questions = detail["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 2);
    for question in questions {
        let answers = question["answers"].as_array().unwrap();
        assert_eq!(answers.len(), 5);
        for answer in answers {
            assert!(
                answer.get("is_correct").is_none(),
                "correct flag must not leak to takers"
            );
        }
    }
}

#[tokio::test]
async fn quiz_create_rejects_broken_answer_sets() {
    // Arrange
    let Some((address, _pool)) = spawn_app().await else { return };
    let client = reqwest::Client::new();
    let (token, _) = register_and_login(&client, &address).await;

    // 4 answers instead of 5
    let mut four_answers = question_body("Short question", 0);
    four_answers["answers"].as_array_mut().unwrap().pop();

    // 5 answers but two of them correct
    let mut two_correct = question_body("Ambiguous question", 0);
    two_correct["answers"][1]["is_correct"] = serde_json::json!(true);

    for question in [four_answers, two_correct] {
        // Act
        let response = client
            .post(format!("{}/api/quizzes", address))
            .bearer_auth(&token)
            .json(&serde_json::json!({
                "title": "Broken quiz",
                "description": "Should not be accepted",
                "questions": [question]
            }))
            .send()
            .await
            .expect("Create quiz failed");

        // Assert
        assert_eq!(response.status().as_u16(), 400);
    }
}

#[tokio::test]
async fn guest_score_is_computed_and_upserted() {
    // Arrange
    let Some((address, pool)) = spawn_app().await else { return };
    let client = reqwest::Client::new();
    let (token, _) = register_and_login(&client, &address).await;
    let quiz_id = create_quiz(&client, &address, &token, "Scoring quiz").await;
    let key = answer_key(&pool, quiz_id).await;
    let guest_id = uuid::Uuid::new_v4().to_string();

    // Act: one correct pair, one wrong pair
    let first: serde_json::Value = client
        .post(format!("{}/api/results?quiz_id={}", address, quiz_id))
        .json(&serde_json::json!({
            "guest_id": guest_id,
            "user_answers": [
                { "question_id": key[0].0, "answer_id": key[0].1 },
                { "question_id": key[1].0, "answer_id": key[1].2 },
            ]
        }))
        .send()
        .await
        .expect("Submit failed")
        .json()
        .await
        .unwrap();

    // Assert
    assert_eq!(first["score"].as_i64(), Some(1));
    assert_eq!(first["guest_id"].as_str(), Some(guest_id.as_str()));
    assert_eq!(result_count(&pool, quiz_id).await, 1);

    // Act: resubmission with both answers correct overwrites in place
    let second: serde_json::Value = client
        .post(format!("{}/api/results?quiz_id={}", address, quiz_id))
        .json(&serde_json::json!({
            "guest_id": guest_id,
            "user_answers": [
                { "question_id": key[0].0, "answer_id": key[0].1 },
                { "question_id": key[1].0, "answer_id": key[1].1 },
            ]
        }))
        .send()
        .await
        .expect("Resubmit failed")
        .json()
        .await
        .unwrap();

    // Assert: same row, new score
    assert_eq!(second["score"].as_i64(), Some(2));
    assert_eq!(second["id"], first["id"]);
    assert_eq!(result_count(&pool, quiz_id).await, 1);

    // Act: retrieval returns the stored score with the corrections
    let stored: serde_json::Value = client
        .get(format!(
            "{}/api/results?quiz_id={}&guest_id={}",
            address, quiz_id, guest_id
        ))
        .send()
        .await
        .expect("Get score failed")
        .json()
        .await
        .unwrap();

    assert_eq!(stored["score"].as_i64(), Some(2));
    let corrections = stored["questions"].as_array().unwrap();
    assert_eq!(corrections.len(), 2);
    assert_eq!(corrections[0]["correct_answer"]["id"].as_i64(), Some(key[0].1));
}

#[tokio::test]
async fn authenticated_submission_is_keyed_by_the_user() {
    // Arrange
    let Some((address, pool)) = spawn_app().await else { return };
    let client = reqwest::Client::new();
    let (token, user_id) = register_and_login(&client, &address).await;
    let quiz_id = create_quiz(&client, &address, &token, "Member quiz").await;
    let key = answer_key(&pool, quiz_id).await;

    // Act
    let result: serde_json::Value = client
        .post(format!("{}/api/quizzes/{}/submit", address, quiz_id))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "user_answers": [
                { "question_id": key[0].0, "answer_id": key[0].1 },
                { "question_id": key[1].0, "answer_id": key[1].1 },
            ]
        }))
        .send()
        .await
        .expect("Submit failed")
        .json()
        .await
        .unwrap();

    // Assert
    assert_eq!(result["score"].as_i64(), Some(2));
    assert_eq!(result["user_id"].as_i64(), Some(user_id));
    assert!(result["guest_id"].is_null());

    // Act: the caller reads back their own score
    let stored: serde_json::Value = client
        .get(format!("{}/api/quizzes/{}/score", address, quiz_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Get score failed")
        .json()
        .await
        .unwrap();

    assert_eq!(stored["score"].as_i64(), Some(2));
}

#[tokio::test]
async fn submission_for_a_missing_quiz_is_404() {
    // Arrange
    let Some((address, _pool)) = spawn_app().await else { return };
    let client = reqwest::Client::new();

    // Act
    let response = client
        .post(format!("{}/api/results?quiz_id={}", address, i64::MAX))
        .json(&serde_json::json!({
            "guest_id": "nobody",
            "user_answers": [{ "question_id": 1, "answer_id": 1 }]
        }))
        .send()
        .await
        .expect("Submit failed");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn in_place_update_keeps_questions_and_results() {
    // Arrange
    let Some((address, pool)) = spawn_app().await else { return };
    let client = reqwest::Client::new();
    let (token, _) = register_and_login(&client, &address).await;
    let quiz_id = create_quiz(&client, &address, &token, "Stable quiz").await;
    let key = answer_key(&pool, quiz_id).await;

    // A guest result that an in-place edit must not disturb
    client
        .post(format!("{}/api/results?quiz_id={}", address, quiz_id))
        .json(&serde_json::json!({
            "guest_id": uuid::Uuid::new_v4().to_string(),
            "user_answers": [{ "question_id": key[0].0, "answer_id": key[0].1 }]
        }))
        .send()
        .await
        .expect("Submit failed");
    assert_eq!(result_count(&pool, quiz_id).await, 1);

    // Act: both questions keep their ids, only texts and answers change
    let mut q1 = question_body("First question, reworded", 2);
    q1["id"] = serde_json::json!(key[0].0);
    let mut q2 = question_body("Second question, reworded", 3);
    q2["id"] = serde_json::json!(key[1].0);

    let response = client
        .put(format!("{}/api/quizzes/{}", address, quiz_id))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "title": "Stable quiz v2",
            "description": "Edited in place",
            "questions": [q1, q2]
        }))
        .send()
        .await
        .expect("Update failed");
    assert_eq!(response.status().as_u16(), 200);
    let updated: serde_json::Value = response.json().await.unwrap();
    assert_eq!(updated["title"], "Stable quiz v2");

    // Assert: question ids survived, results untouched
    let current_ids: Vec<i64> =
        sqlx::query_scalar("SELECT id FROM questions WHERE quiz_id = $1 ORDER BY id")
            .bind(quiz_id)
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(current_ids, vec![key[0].0, key[1].0]);
    assert_eq!(result_count(&pool, quiz_id).await, 1);
}

#[tokio::test]
async fn structural_update_invalidates_results() {
    // Arrange
    let Some((address, pool)) = spawn_app().await else { return };
    let client = reqwest::Client::new();
    let (token, _) = register_and_login(&client, &address).await;
    let quiz_id = create_quiz(&client, &address, &token, "Shifting quiz").await;
    let key = answer_key(&pool, quiz_id).await;

    client
        .post(format!("{}/api/results?quiz_id={}", address, quiz_id))
        .json(&serde_json::json!({
            "guest_id": uuid::Uuid::new_v4().to_string(),
            "user_answers": [{ "question_id": key[0].0, "answer_id": key[0].1 }]
        }))
        .send()
        .await
        .expect("Submit failed");
    assert_eq!(result_count(&pool, quiz_id).await, 1);

    // Act: keep the first question, replace the second with a fresh one
    let mut kept = question_body("First question, kept", 0);
    kept["id"] = serde_json::json!(key[0].0);

    let response = client
        .put(format!("{}/api/quizzes/{}", address, quiz_id))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "title": "Shifting quiz v2",
            "description": "The question set changed",
            "questions": [kept, question_body("Brand new question", 4)]
        }))
        .send()
        .await
        .expect("Update failed");
    assert_eq!(response.status().as_u16(), 200);

    // Assert: stale results are gone, old second question deleted
    assert_eq!(result_count(&pool, quiz_id).await, 0);

    let current_ids: Vec<i64> =
        sqlx::query_scalar("SELECT id FROM questions WHERE quiz_id = $1 ORDER BY id")
            .bind(quiz_id)
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(current_ids.len(), 2);
    assert!(current_ids.contains(&key[0].0), "matched id survives in place");
    assert!(!current_ids.contains(&key[1].0), "unmatched id is deleted");
}

#[tokio::test]
async fn update_is_scoped_to_the_owner() {
    // Arrange
    let Some((address, pool)) = spawn_app().await else { return };
    let client = reqwest::Client::new();
    let (owner_token, _) = register_and_login(&client, &address).await;
    let (other_token, _) = register_and_login(&client, &address).await;
    let quiz_id = create_quiz(&client, &address, &owner_token, "Private quiz").await;
    let key = answer_key(&pool, quiz_id).await;

    let mut q1 = question_body("Hijacked question", 0);
    q1["id"] = serde_json::json!(key[0].0);

    // Act: a different user tries to edit the quiz
    let response = client
        .put(format!("{}/api/quizzes/{}", address, quiz_id))
        .bearer_auth(&other_token)
        .json(&serde_json::json!({
            "title": "Hijacked",
            "description": "Should not happen",
            "questions": [q1]
        }))
        .send()
        .await
        .expect("Update failed");

    // Assert: not found for the outside scope, nothing mutated
    assert_eq!(response.status().as_u16(), 404);
    let title: String = sqlx::query_scalar("SELECT title FROM quizzes WHERE id = $1")
        .bind(quiz_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(title, "Private quiz");
}

#[tokio::test]
async fn owner_listing_uses_offset_pagination() {
    // Arrange
    let Some((address, _pool)) = spawn_app().await else { return };
    let client = reqwest::Client::new();
    let (token, _) = register_and_login(&client, &address).await;

    let mut created = Vec::new();
    for i in 0..3 {
        created.push(create_quiz(&client, &address, &token, &format!("Mine {}", i)).await);
    }

    // Act: skip the newest, take one
    let page: serde_json::Value = client
        .get(format!(
            "{}/api/quizzes/user-quizzes?offset=1&limit=1",
            address
        ))
        .bearer_auth(&token)
        .send()
        .await
        .expect("List failed")
        .json()
        .await
        .unwrap();

    // Assert: a fresh user owns exactly the three quizzes created above
    assert_eq!(page["total"].as_i64(), Some(3));
    let data = page["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["id"].as_i64(), Some(created[1]));
}

#[tokio::test]
async fn cursor_pagination_walks_newest_to_oldest() {
    // Arrange
    let Some((address, _pool)) = spawn_app().await else { return };
    let client = reqwest::Client::new();
    let (token, _) = register_and_login(&client, &address).await;

    // A unique marker keeps this walk independent of quizzes created by
    // other tests sharing the database.
    let marker = format!("cursor-{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let mut created = Vec::new();
    for i in 0..3 {
        created.push(create_quiz(&client, &address, &token, &format!("{} {}", marker, i)).await);
    }

    // Act: first page, no cursor
    let first: serde_json::Value = client
        .get(format!(
            "{}/api/quizzes?limit=2&search={}",
            address, marker
        ))
        .send()
        .await
        .expect("List failed")
        .json()
        .await
        .unwrap();

    // Assert: newest first, continuation cursor points at the page's last row
    assert_eq!(first["total"].as_i64(), Some(3));
    let data = first["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["id"].as_i64(), Some(created[2]));
    assert_eq!(data[1]["id"].as_i64(), Some(created[1]));
    assert_eq!(first["next_cursor"].as_i64(), Some(created[1]));

    // Act: walk the remaining pages to exhaustion
    let mut collected: Vec<i64> = data.iter().map(|q| q["id"].as_i64().unwrap()).collect();
    let mut cursor = first["next_cursor"].as_i64();
    for _ in 0..10 {
        let Some(c) = cursor else { break };
        let page: serde_json::Value = client
            .get(format!(
                "{}/api/quizzes?limit=2&search={}&cursor={}",
                address, marker, c
            ))
            .send()
            .await
            .expect("List failed")
            .json()
            .await
            .unwrap();

        collected.extend(
            page["data"]
                .as_array()
                .unwrap()
                .iter()
                .map(|q| q["id"].as_i64().unwrap()),
        );
        cursor = page["next_cursor"].as_i64();
    }

    // Assert: every marked quiz seen exactly once, newest to oldest
    assert_eq!(collected, vec![created[2], created[1], created[0]]);
    assert!(cursor.is_none());
}

#[tokio::test]
async fn delete_quiz_cascades_and_reports_missing() {
    // Arrange
    let Some((address, pool)) = spawn_app().await else { return };
    let client = reqwest::Client::new();
    let (token, _) = register_and_login(&client, &address).await;
    let quiz_id = create_quiz(&client, &address, &token, "Doomed quiz").await;
    let key = answer_key(&pool, quiz_id).await;

    client
        .post(format!("{}/api/results?quiz_id={}", address, quiz_id))
        .json(&serde_json::json!({
            "guest_id": uuid::Uuid::new_v4().to_string(),
            "user_answers": [{ "question_id": key[0].0, "answer_id": key[0].1 }]
        }))
        .send()
        .await
        .expect("Submit failed");

    // Act
    let response = client
        .delete(format!("{}/api/quizzes/{}", address, quiz_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Delete failed");

    // Assert
    assert_eq!(response.status().as_u16(), 204);
    assert_eq!(result_count(&pool, quiz_id).await, 0);

    let detail = client
        .get(format!("{}/api/quizzes/{}", address, quiz_id))
        .send()
        .await
        .expect("Get failed");
    assert_eq!(detail.status().as_u16(), 404);

    // Deleting again reports not found
    let again = client
        .delete(format!("{}/api/quizzes/{}", address, quiz_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Delete failed");
    assert_eq!(again.status().as_u16(), 404);
}
