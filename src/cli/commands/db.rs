use clap::Subcommand;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::cli::utils::{output_detail, output_success};
use crate::cli::OutputFormat;
use crate::database::DatabaseManager;
use crate::services::report_service::NewReport;
use crate::services::settings_service::SettingKey;
use crate::services::{ReportService, SettingsService, UserService};
use crate::types::Role;
use crate::workflow::Actor;

const DEMO_FIXTURE: &str = include_str!("../../../fixtures/demo.yaml");

#[derive(Subcommand)]
pub enum DbCommands {
    #[command(about = "Apply pending migrations")]
    Migrate,

    #[command(about = "Load demo users, a sample report and default settings")]
    Seed {
        #[arg(long, help = "Fixture file to load instead of the bundled demo data")]
        file: Option<PathBuf>,
    },
}

#[derive(Debug, Deserialize)]
struct Fixture {
    password: String,
    #[serde(default)]
    users: Vec<FixtureUser>,
    #[serde(default)]
    reports: Vec<FixtureReport>,
    #[serde(default)]
    settings: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct FixtureUser {
    email: String,
    full_name: String,
    role: Role,
}

#[derive(Debug, Deserialize)]
struct FixtureReport {
    title: String,
    project_ref: String,
    document_ref: String,
    revision: String,
    creator: String,
    tm: Option<String>,
    pm: Option<String>,
    #[serde(default)]
    steps: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct SeedSummary {
    users_created: Vec<String>,
    users_skipped: Vec<String>,
    reports_created: Vec<String>,
    reports_skipped: Vec<String>,
    settings_written: Vec<String>,
}

impl SeedSummary {
    fn to_json(&self) -> Value {
        json!({
            "usersCreated": self.users_created,
            "usersSkipped": self.users_skipped,
            "reportsCreated": self.reports_created,
            "reportsSkipped": self.reports_skipped,
            "settingsWritten": self.settings_written,
        })
    }
}

pub async fn handle(cmd: DbCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        DbCommands::Migrate => {
            DatabaseManager::migrate().await?;
            output_success(output_format, "Migrations applied", None)
        }
        DbCommands::Seed { file } => {
            let source = match &file {
                Some(path) => std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", path.display(), e))?,
                None => DEMO_FIXTURE.to_string(),
            };
            let fixture: Fixture = serde_yaml::from_str(&source)?;

            DatabaseManager::migrate().await?;
            let summary = seed(fixture).await?;

            output_success(
                output_format,
                &format!(
                    "Seeded {} user(s), {} report(s), {} setting(s)",
                    summary.users_created.len(),
                    summary.reports_created.len(),
                    summary.settings_written.len()
                ),
                Some(summary.to_json()),
            )?;
            for email in &summary.users_skipped {
                output_detail(output_format, &format!("user exists: {}", email));
            }
            for document in &summary.reports_skipped {
                output_detail(output_format, &format!("report exists: {}", document));
            }
            Ok(())
        }
    }
}

async fn seed(fixture: Fixture) -> anyhow::Result<SeedSummary> {
    let users = UserService::new().await?;
    let reports = ReportService::new().await?;
    let settings = SettingsService::new().await?;
    let mut summary = SeedSummary::default();

    for user in &fixture.users {
        if users.find_by_email(&user.email).await?.is_some() {
            summary.users_skipped.push(user.email.clone());
            continue;
        }
        users
            .create(&user.email, &user.full_name, user.role, &fixture.password)
            .await?;
        summary.users_created.push(user.email.clone());
    }

    for spec in fixture.reports {
        let label = format!("{} rev {}", spec.document_ref, spec.revision);
        if reports.find_by_document(&spec.document_ref, &spec.revision).await?.is_some() {
            summary.reports_skipped.push(label);
            continue;
        }

        let creator = users
            .find_by_email(&spec.creator)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Report creator {} is not a user", spec.creator))?;
        let tm_id = lookup_id(&users, spec.tm.as_deref()).await?;
        let pm_id = lookup_id(&users, spec.pm.as_deref()).await?;
        let actor = Actor { id: creator.id, role: creator.role };

        let report = reports
            .create(
                actor,
                NewReport {
                    title: spec.title,
                    project_ref: spec.project_ref,
                    document_ref: spec.document_ref,
                    revision: spec.revision,
                    tm_id,
                    pm_id,
                },
            )
            .await?;

        for (step_name, data) in spec.steps {
            reports.save_step(report.id, actor, &step_name, data).await?;
        }
        summary.reports_created.push(label);
    }

    for (key, value) in fixture.settings {
        let key: SettingKey = key.parse()?;
        if settings.insert_default(key, &value).await? {
            summary.settings_written.push(key.as_str().to_string());
        }
    }

    Ok(summary)
}

async fn lookup_id(users: &UserService, email: Option<&str>) -> anyhow::Result<Option<uuid::Uuid>> {
    let Some(email) = email else {
        return Ok(None);
    };
    let user = users
        .find_by_email(email)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Assignee {} is not a user", email))?;
    Ok(Some(user.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_fixture_parses() {
        let fixture: Fixture = serde_yaml::from_str(DEMO_FIXTURE).unwrap();

        assert_eq!(fixture.users.len(), 4);
        assert!(fixture.users.iter().any(|u| u.role == Role::Admin));
        assert_eq!(fixture.reports[0].document_ref, "SAT-001");
        assert_eq!(fixture.reports[0].revision, "1.0");
        assert!(fixture.reports[0].steps.contains_key("document_info"));
    }

    #[test]
    fn bundled_settings_are_valid() {
        let fixture: Fixture = serde_yaml::from_str(DEMO_FIXTURE).unwrap();

        for (key, value) in &fixture.settings {
            let key: SettingKey = key.parse().unwrap();
            assert!(key.validate(value).is_ok(), "{} failed validation", key.as_str());
        }
    }

    #[test]
    fn bundled_steps_have_known_names() {
        let fixture: Fixture = serde_yaml::from_str(DEMO_FIXTURE).unwrap();

        for name in fixture.reports[0].steps.keys() {
            assert!(name.parse::<crate::steps::StepName>().is_ok(), "unknown step {}", name);
        }
    }
}
