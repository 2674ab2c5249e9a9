//! API tests against a running server with the default bootstrap administrator

use reqwest::{multipart, Client, StatusCode};
use serde_json::{json, Value};
use tokio::task::JoinSet;

const BASE_URL: &str = "http://localhost:8080/api/v1";

/// Helper to get an authenticated client
async fn get_auth_token(client: &Client) -> String {
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "username": "admin",
            "password": "admin123"
        }))
        .send()
        .await
        .expect("Failed to send login request");

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

/// Suffix that keeps usernames unique across runs against the same database
fn unique_suffix() -> String {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .to_string()
}

async fn login_as(client: &Client, username: &str, password: &str) -> String {
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Failed to send login request");
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

/// Create a regular user through the admin API and log in as them
async fn create_reader(client: &Client, admin_token: &str, username: &str) -> String {
    let response = client
        .post(format!("{}/admin/users", BASE_URL))
        .bearer_auth(admin_token)
        .json(&json!({
            "username": username,
            "name": username,
            "email": format!("{}@example.com", username),
            "password": "reader-password",
            "role": "user"
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 201);

    login_as(client, username, "reader-password").await
}

async fn create_book(client: &Client, admin_token: &str, title: &str, stock: i32) -> i64 {
    let form = multipart::Form::new()
        .text("title", title.to_string())
        .text("author", "Test Author")
        .text("genre", "Testing")
        .text("stock", stock.to_string());

    let response = client
        .post(format!("{}/admin/books", BASE_URL))
        .bearer_auth(admin_token)
        .multipart(form)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 201);

    let book: Value = response.json().await.expect("Failed to parse response");
    book["id"].as_i64().expect("No book ID")
}

async fn book_stock(client: &Client, token: &str, book_id: i64) -> i64 {
    let response = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to send request");
    let detail: Value = response.json().await.expect("Failed to parse response");
    detail["book"]["stock"].as_i64().expect("No stock")
}

/// POST a loan request, returning the status and the error code if any
async fn loan_request(client: Client, token: String, action: &'static str, book_id: i64) -> (StatusCode, Value) {
    let response = client
        .post(format!("{}/loans/{}", BASE_URL, action))
        .bearer_auth(&token)
        .json(&json!({ "book_id": book_id }))
        .send()
        .await
        .expect("Failed to send request");
    let status = response.status();
    let body: Value = response.json().await.expect("Failed to parse response");
    (status, body)
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_readiness_reaches_database() {
    let client = Client::new();

    let response = client
        .get(format!("{}/ready", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "username": "admin",
            "password": "wrong"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_get_current_user() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .get(format!("{}/auth/me", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["role"], "admin");
}

#[tokio::test]
#[ignore]
async fn test_dashboard() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .get(format!("{}/admin/dashboard", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["user_count"].as_i64().unwrap_or(0) >= 1);
    assert!(body["books"].is_array());
}

#[tokio::test]
#[ignore]
async fn test_create_book_borrow_and_return() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let form = multipart::Form::new()
        .text("title", "Integration Test Book")
        .text("author", "Test Author")
        .text("genre", "Testing")
        .text("stock", "1")
        .part(
            "pdf_file",
            multipart::Part::bytes(b"%PDF-1.4 test".to_vec()).file_name("test.pdf"),
        );

    let response = client
        .post(format!("{}/admin/books", BASE_URL))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 201);
    let book: Value = response.json().await.expect("Failed to parse response");
    let book_id = book["id"].as_i64().expect("No book ID");
    assert!(book["pdf_file_path"].as_str().unwrap().ends_with("-test.pdf"));

    let response = client
        .post(format!("{}/loans/borrow", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "book_id": book_id }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 201);

    let response = client
        .post(format!("{}/loans/borrow", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "book_id": book_id }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 409);

    let response = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    let detail: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(detail["user_has_loan"], true);
    assert_eq!(detail["book"]["stock"], 0);
    assert!(detail["flash"]["error"].is_string());

    let response = client
        .post(format!("{}/loans/return", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "book_id": book_id }))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let response = client
        .get(format!("{}/loans/mine", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    let mine: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(mine["flash"]["success"], "Book returned successfully!");
    assert_eq!(mine["loans"][0]["book_id"], book_id);
    assert_eq!(mine["loans"][0]["status"], "returned");
}

#[tokio::test]
#[ignore]
async fn test_create_and_delete_user() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .post(format!("{}/admin/users", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({
            "username": "integration-user",
            "name": "Integration User",
            "email": "integration@example.com",
            "password": "a-longer-password",
            "role": "user"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse response");
    let user_id = body["id"].as_i64().expect("No user ID");
    assert!(body.get("password_hash").is_none());

    let response = client
        .delete(format!("{}/admin/users/{}", BASE_URL, user_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 204);
}

#[tokio::test]
#[ignore]
async fn test_concurrent_borrows_of_last_copy() {
    let client = Client::new();
    let admin = get_auth_token(&client).await;
    let run = unique_suffix();
    let book_id = create_book(&client, &admin, &format!("Last Copy {}", run), 1).await;

    let mut tokens = Vec::new();
    for i in 0..10 {
        tokens.push(create_reader(&client, &admin, &format!("racer-{}-{}", run, i)).await);
    }

    let mut set = JoinSet::new();
    for token in tokens {
        set.spawn(loan_request(client.clone(), token, "borrow", book_id));
    }

    let mut created = 0;
    while let Some(joined) = set.join_next().await {
        let (status, body) = joined.unwrap();
        if status == StatusCode::CREATED {
            created += 1;
        } else {
            assert_eq!(status, StatusCode::CONFLICT);
            assert_eq!(body["error"], "OutOfStock");
        }
    }

    assert_eq!(created, 1);
    assert_eq!(book_stock(&client, &admin, book_id).await, 0);
}

#[tokio::test]
#[ignore]
async fn test_concurrent_borrows_by_one_user() {
    let client = Client::new();
    let admin = get_auth_token(&client).await;
    let run = unique_suffix();
    let book_id = create_book(&client, &admin, &format!("Plenty {}", run), 10).await;
    let token = create_reader(&client, &admin, &format!("eager-{}", run)).await;

    let mut set = JoinSet::new();
    for _ in 0..10 {
        set.spawn(loan_request(client.clone(), token.clone(), "borrow", book_id));
    }

    let mut created = 0;
    while let Some(joined) = set.join_next().await {
        let (status, body) = joined.unwrap();
        if status == StatusCode::CREATED {
            created += 1;
        } else {
            assert_eq!(status, StatusCode::CONFLICT);
            assert_eq!(body["error"], "AlreadyBorrowed");
        }
    }

    assert_eq!(created, 1);
    assert_eq!(book_stock(&client, &admin, book_id).await, 9);
}

#[tokio::test]
#[ignore]
async fn test_concurrent_returns_restock_once() {
    let client = Client::new();
    let admin = get_auth_token(&client).await;
    let run = unique_suffix();
    let book_id = create_book(&client, &admin, &format!("Returned Twice {}", run), 1).await;
    let token = create_reader(&client, &admin, &format!("returner-{}", run)).await;

    let (status, _) = loan_request(client.clone(), token.clone(), "borrow", book_id).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(book_stock(&client, &admin, book_id).await, 0);

    let mut set = JoinSet::new();
    for _ in 0..2 {
        set.spawn(loan_request(client.clone(), token.clone(), "return", book_id));
    }

    let mut returned = 0;
    while let Some(joined) = set.join_next().await {
        let (status, body) = joined.unwrap();
        if status == StatusCode::OK {
            returned += 1;
        } else {
            // The loser either saw the loan already closed or lost the
            // conditional close after reading it as active
            assert_eq!(status, StatusCode::CONFLICT);
            let code = body["error"].as_str().unwrap_or_default();
            assert!(code == "NoActiveLoan" || code == "AlreadyReturned", "unexpected {}", code);
        }
    }

    assert_eq!(returned, 1);
    assert_eq!(book_stock(&client, &admin, book_id).await, 1);
}

#[tokio::test]
#[ignore]
async fn test_deleted_account_session_cannot_borrow() {
    let client = Client::new();
    let admin = get_auth_token(&client).await;
    let run = unique_suffix();
    let book_id = create_book(&client, &admin, &format!("Orphaned {}", run), 1).await;
    let username = format!("leaver-{}", run);
    let token = create_reader(&client, &admin, &username).await;

    let response = client
        .get(format!("{}/auth/me", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    let me: Value = response.json().await.expect("Failed to parse response");
    let user_id = me["user_id"].as_i64().expect("No user ID");

    let response = client
        .delete(format!("{}/admin/users/{}", BASE_URL, user_id))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 204);

    let (status, body) = loan_request(client.clone(), token, "borrow", book_id).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["retryable"], false);
    assert_eq!(book_stock(&client, &admin, book_id).await, 1);
}
