mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn protected_routes_need_a_token() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/api/reports")).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await?;
    assert_eq!(body["error"]["message"], "Access token required");

    let res = client
        .get(server.url("/api/auth/me"))
        .bearer_auth("not-a-jwt")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn demo_engineer_logs_in() -> Result<()> {
    let server = common::ensure_server().await?;
    if !server.database_up().await? {
        eprintln!("skipping: database unavailable");
        return Ok(());
    }

    let token = server.login("engineer@test.com").await?;
    let res = reqwest::Client::new()
        .get(server.url("/api/auth/me"))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await?;
    assert_eq!(body["data"]["email"], "engineer@test.com");
    assert_eq!(body["data"]["role"], "ENGINEER");
    assert!(body["data"].get("passwordHash").is_none());
    Ok(())
}

#[tokio::test]
async fn wrong_password_is_rejected() -> Result<()> {
    let server = common::ensure_server().await?;
    if !server.database_up().await? {
        eprintln!("skipping: database unavailable");
        return Ok(());
    }

    let res = reqwest::Client::new()
        .post(server.url("/api/auth/login"))
        .json(&json!({ "email": "engineer@test.com", "password": "nope" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await?;
    assert_eq!(body["error"]["message"], "Invalid credentials");
    Ok(())
}

#[tokio::test]
async fn registration_waits_for_approval() -> Result<()> {
    let server = common::ensure_server().await?;
    if !server.database_up().await? {
        eprintln!("skipping: database unavailable");
        return Ok(());
    }
    let client = reqwest::Client::new();
    let email = format!("new-{}@test.com", uuid::Uuid::new_v4().simple());

    let res = client
        .post(server.url("/api/auth/register"))
        .json(&json!({ "email": email, "fullName": "New Engineer", "role": "ENGINEER" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await?;
    assert_eq!(body["data"]["user"]["status"], "PENDING");

    let res = client
        .post(server.url("/api/auth/register"))
        .json(&json!({ "email": email, "fullName": "New Engineer", "role": "ENGINEER" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let admin = server.login("admin@test.com").await?;
    let res = client
        .get(server.url("/api/users/pending/count"))
        .bearer_auth(&admin)
        .send()
        .await?;
    let body: Value = res.json().await?;
    assert!(body["data"]["count"].as_i64().unwrap_or(0) >= 1);

    // Non-admins cannot see the admin tier
    let engineer = server.login("engineer@test.com").await?;
    let res = client
        .get(server.url("/api/users"))
        .bearer_auth(&engineer)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    Ok(())
}
