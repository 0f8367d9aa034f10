use serde_json::Value;
use std::time::Duration;

use crate::cli::utils::{output_detail, output_error, output_success};
use crate::cli::OutputFormat;
use crate::config;

pub async fn handle(url: Option<String>, output_format: OutputFormat) -> anyhow::Result<()> {
    let base = url.unwrap_or_else(|| format!("http://localhost:{}", config::config().api.port));
    let endpoint = format!("{}/api/health", base.trim_end_matches('/'));

    let client = reqwest::Client::builder().timeout(Duration::from_secs(5)).build()?;

    let response = match client.get(&endpoint).send().await {
        Ok(response) => response,
        Err(e) => {
            output_error(output_format, &format!("{} unreachable: {}", base, e), Some("UNREACHABLE"))?;
            anyhow::bail!("server unreachable");
        }
    };

    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    if status.is_success() {
        output_success(output_format, &format!("{} is up", base), Some(body.clone()))?;
        if let Some(version) = body.get("version").and_then(Value::as_str) {
            output_detail(output_format, &format!("version: {}", version));
        }
        Ok(())
    } else {
        output_error(
            output_format,
            &format!("{} responded {} (database: {})", base, status, body["database"]),
            Some("UNHEALTHY"),
        )?;
        anyhow::bail!("server unhealthy: {}", status)
    }
}
