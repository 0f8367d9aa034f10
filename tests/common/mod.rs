use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub const DEMO_PASSWORD: &str = "Test123!";

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Demo users back the login tests; a missing database just leaves them absent
        let _ = Command::new("target/debug/sat")
            .args(["db", "seed"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .status();

        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        // Assumes the debug profile has been built
        let mut cmd = Command::new("target/debug/sat-report-api");
        cmd.env("SAT_API_PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = client.get(self.url("/api/health")).send().await {
                if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// True when the server can reach its database
    pub async fn database_up(&self) -> Result<bool> {
        let res = reqwest::Client::new().get(self.url("/api/health")).send().await?;
        Ok(res.status() == StatusCode::OK)
    }

    /// Log in as a seeded demo user and return the bearer token
    pub async fn login(&self, email: &str) -> Result<String> {
        let res = reqwest::Client::new()
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": DEMO_PASSWORD }))
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::OK, "login for {} failed: {}", email, res.status());

        let body: Value = res.json().await?;
        body["data"]["token"]
            .as_str()
            .map(str::to_string)
            .context("login response carried no token")
    }

    /// Id of a seeded demo user, looked up through the admin listing
    pub async fn user_id(&self, admin_token: &str, email: &str) -> Result<String> {
        let body: Value = reqwest::Client::new()
            .get(self.url("/api/users"))
            .bearer_auth(admin_token)
            .send()
            .await?
            .json()
            .await?;
        body["data"]
            .as_array()
            .and_then(|users| users.iter().find(|u| u["email"] == email))
            .and_then(|u| u["id"].as_str())
            .map(str::to_string)
            .with_context(|| format!("{} not in user listing", email))
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}
