mod common;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

struct Session<'a> {
    server: &'a common::TestServer,
    client: Client,
    token: String,
}

impl<'a> Session<'a> {
    async fn open(server: &'a common::TestServer, email: &str) -> Result<Self> {
        Ok(Self {
            server,
            client: Client::new(),
            token: server.login(email).await?,
        })
    }

    async fn send(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut req = self.client.request(method, self.server.url(path)).bearer_auth(&self.token);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let res = req.send().await?;
        let status = res.status();
        let body = res.json().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    async fn get(&self, path: &str) -> Result<(StatusCode, Value)> {
        self.send(reqwest::Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.send(reqwest::Method::POST, path, Some(body)).await
    }

    async fn put(&self, path: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.send(reqwest::Method::PUT, path, Some(body)).await
    }
}

/// Create a draft assigned to the demo managers, with a unique document ref
async fn draft(engineer: &Session<'_>, admin: &Session<'_>) -> Result<String> {
    let server = engineer.server;
    let tm_id = server.user_id(&admin.token, "tm@test.com").await?;
    let pm_id = server.user_id(&admin.token, "pm@test.com").await?;

    let (status, body) = engineer
        .post(
            "/api/reports",
            json!({
                "title": "Pump Station Controls",
                "projectRef": "PRJ-IT",
                "documentRef": format!("SAT-IT-{}", uuid::Uuid::new_v4().simple()),
                "revision": "1.0",
                "tmId": tm_id,
                "pmId": pm_id,
            }),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["data"]["id"].as_str().map(str::to_string).context("report id")
}

#[tokio::test]
async fn report_walks_from_draft_to_completed() -> Result<()> {
    let server = common::ensure_server().await?;
    if !server.database_up().await? {
        eprintln!("skipping: database unavailable");
        return Ok(());
    }
    let engineer = Session::open(server, "engineer@test.com").await?;
    let tm = Session::open(server, "tm@test.com").await?;
    let pm = Session::open(server, "pm@test.com").await?;
    let admin = Session::open(server, "admin@test.com").await?;

    let id = draft(&engineer, &admin).await?;

    let (status, body) = engineer
        .put(
            &format!("/api/reports/{}/steps", id),
            json!({
                "stepName": "pre_configuration",
                "data": {
                    "digitalModules": [{ "rackNo": "1", "modulePosition": "2", "channelCount": 8 }],
                    "analogModules": [{ "rackNo": "1", "modulePosition": "3", "defaultRange": "4-20mA" }],
                }
            }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, body) = engineer
        .post(&format!("/api/reports/{}/steps/signal_tests/generate", id), json!({}))
        .await?;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["digitalSignals"].as_array().map(Vec::len), Some(8));

    let (status, _) = engineer.get(&format!("/api/reports/{}/completion", id)).await?;
    assert_eq!(status, StatusCode::OK);

    // Only the assigned TM may act on a freshly submitted report
    let (status, body) = engineer
        .post(&format!("/api/reports/{}/submit", id), json!({ "signatureData": "data:image/png;base64,AAAA" }))
        .await?;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, _) = pm.post(&format!("/api/reports/{}/approve", id), json!({})).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = tm.post(&format!("/api/reports/{}/approve", id), json!({})).await?;
    assert_eq!(status, StatusCode::OK, "{}", body);

    // Editing is closed once the report leaves DRAFT
    let (status, _) = engineer
        .put(&format!("/api/reports/{}", id), json!({ "title": "Late edit" }))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = pm.post(&format!("/api/reports/{}/approve", id), json!({})).await?;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, body) = engineer.get(&format!("/api/reports/{}", id)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "COMPLETED");
    assert_eq!(body["data"]["signatures"].as_array().map(Vec::len), Some(3));

    let (status, _) = tm.post(&format!("/api/reports/{}/approve", id), json!({})).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn rejection_needs_a_reason_and_reopens_the_draft() -> Result<()> {
    let server = common::ensure_server().await?;
    if !server.database_up().await? {
        eprintln!("skipping: database unavailable");
        return Ok(());
    }
    let engineer = Session::open(server, "engineer@test.com").await?;
    let tm = Session::open(server, "tm@test.com").await?;
    let admin = Session::open(server, "admin@test.com").await?;

    let id = draft(&engineer, &admin).await?;
    let (status, _) = engineer.post(&format!("/api/reports/{}/submit", id), json!({})).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = tm.post(&format!("/api/reports/{}/reject", id), json!({ "reason": "  " })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = tm
        .post(&format!("/api/reports/{}/reject", id), json!({ "reason": "Alarm list incomplete" }))
        .await?;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (_, body) = engineer.get(&format!("/api/reports/{}", id)).await?;
    assert_eq!(body["data"]["status"], "REJECTED");
    let rejected = body["data"]["comments"]
        .as_array()
        .map(|comments| comments.iter().any(|c| c["content"] == "Rejected: Alarm list incomplete"))
        .unwrap_or(false);
    assert!(rejected, "rejection comment missing: {}", body);

    // A rejected report can be edited and resubmitted by its creator
    let (status, _) = engineer
        .put(&format!("/api/reports/{}", id), json!({ "title": "Pump Station Controls (rev)" }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = engineer.post(&format!("/api/reports/{}/submit", id), json!({})).await?;
    assert_eq!(status, StatusCode::OK);

    // Audit trail picked up the transitions
    let (status, body) = admin.get(&format!("/api/audit?reportId={}", id)).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["pagination"]["total"].as_i64().unwrap_or(0) >= 1);
    Ok(())
}

#[tokio::test]
async fn deleting_a_draft_is_audited() -> Result<()> {
    let server = common::ensure_server().await?;
    if !server.database_up().await? {
        eprintln!("skipping: database unavailable");
        return Ok(());
    }
    let engineer = Session::open(server, "engineer@test.com").await?;
    let admin = Session::open(server, "admin@test.com").await?;

    let id = draft(&engineer, &admin).await?;
    let (status, _) = engineer
        .send(reqwest::Method::DELETE, &format!("/api/reports/{}", id), None)
        .await?;
    assert_eq!(status, StatusCode::OK);

    // Entries are written off the request path
    for _ in 0..20 {
        let (_, body) = admin.get("/api/audit?action=report_delete&limit=200").await?;
        let found = body["data"]["logs"]
            .as_array()
            .map(|logs| logs.iter().any(|l| l["details"]["reportId"] == id.as_str()))
            .unwrap_or(false);
        if found {
            return Ok(());
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    anyhow::bail!("no report_delete entry for {}", id)
}
