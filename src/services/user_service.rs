use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::auth::password;
use crate::config;
use crate::database::manager::DatabaseManager;
use crate::database::models::{User, UserSummary};
use crate::error::ApiError;
use crate::types::{Role, UserStatus};

const USER_COLUMNS: &str =
    "id, email, full_name, role, status, password_hash, last_login_at, created_at, updated_at";

/// Report counts attached to each user in the admin listing
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserReportCounts {
    pub created_reports: i64,
    pub tm_assigned_reports: i64,
    pub pm_assigned_reports: i64,
}

impl UserReportCounts {
    pub fn total(&self) -> i64 {
        self.created_reports + self.tm_assigned_reports + self.pm_assigned_reports
    }
}

#[derive(Debug, FromRow)]
struct UserWithCountsRow {
    #[sqlx(flatten)]
    user: User,
    #[sqlx(flatten)]
    counts: UserReportCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserListItem {
    #[serde(flatten)]
    pub user: User,
    #[serde(rename = "_count")]
    pub count: UserReportCounts,
}

/// Approver option for report assignment pickers
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Assignee {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Default)]
pub struct UserChanges {
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
}

pub struct UserService {
    pool: PgPool,
}

impl UserService {
    pub async fn new() -> Result<Self, ApiError> {
        let pool = DatabaseManager::pool().await?;
        Ok(Self { pool })
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn get(&self, id: Uuid) -> Result<User, ApiError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE lower(email) = lower($1)",
            USER_COLUMNS
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Self-registration: the account starts PENDING with an unusable random password
    pub async fn register(&self, email: &str, full_name: &str, role: Role) -> Result<User, ApiError> {
        let email = normalize_email(email)?;
        let full_name = validate_full_name(full_name)?;
        if !role.is_self_registrable() {
            return Err(ApiError::invalid_field("role", "Role must be ENGINEER, TECHNICAL_MANAGER or PROJECT_MANAGER"));
        }

        let password_hash = hash_blocking(password::temporary_password()).await?;
        let user = self
            .insert(&email, &full_name, role, UserStatus::Pending, &password_hash)
            .await?;

        tracing::info!("User registered and pending approval: {} ({})", user.email, user.id);
        Ok(user)
    }

    /// Admin-created account, active immediately
    pub async fn create(
        &self,
        email: &str,
        full_name: &str,
        role: Role,
        password: &str,
    ) -> Result<User, ApiError> {
        let email = normalize_email(email)?;
        let full_name = validate_full_name(full_name)?;
        validate_password(password)?;

        let password_hash = hash_blocking(password.to_string()).await?;
        let user = self
            .insert(&email, &full_name, role, UserStatus::Active, &password_hash)
            .await?;

        tracing::info!("User created: {} ({}) as {}", user.email, user.id, user.role);
        Ok(user)
    }

    async fn insert(
        &self,
        email: &str,
        full_name: &str,
        role: Role,
        status: UserStatus,
        password_hash: &str,
    ) -> Result<User, ApiError> {
        if self.find_by_email(email).await?.is_some() {
            return Err(ApiError::conflict("User with this email already exists"));
        }

        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, email, full_name, role, status, password_hash)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(full_name)
        .bind(role)
        .bind(status)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    /// Check credentials and record the login. Only ACTIVE accounts may sign in.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let invalid = || ApiError::unauthorized("Invalid credentials");

        let user = self.find_by_email(email).await?.ok_or_else(invalid)?;

        let stored = user.password_hash.clone();
        let candidate = password.to_string();
        let matches = tokio::task::spawn_blocking(move || password::verify_password(&candidate, &stored))
            .await
            .map_err(|e| ApiError::internal_server_error(format!("Password check aborted: {}", e)))??;
        if !matches {
            tracing::warn!("Failed login for {}", user.email);
            return Err(invalid());
        }

        if !user.is_active() {
            return Err(ApiError::unauthorized(
                "Your account is not active. Please contact an administrator.",
            ));
        }

        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET last_login_at = now() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user.id)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn list(&self, status: Option<UserStatus>) -> Result<Vec<UserListItem>, ApiError> {
        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT u.id, u.email, u.full_name, u.role, u.status, u.password_hash, u.last_login_at,
                    u.created_at, u.updated_at,
                    (SELECT COUNT(*) FROM reports r WHERE r.creator_id = u.id) AS created_reports,
                    (SELECT COUNT(*) FROM reports r WHERE r.tm_id = u.id) AS tm_assigned_reports,
                    (SELECT COUNT(*) FROM reports r WHERE r.pm_id = u.id) AS pm_assigned_reports
             FROM users u",
        );
        if let Some(status) = status {
            query.push(" WHERE u.status = ").push_bind(status);
        }
        query.push(" ORDER BY u.created_at DESC");

        let rows = query.build_query_as::<UserWithCountsRow>().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|row| UserListItem { user: row.user, count: row.counts })
            .collect())
    }

    pub async fn pending_count(&self) -> Result<i64, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE status = $1")
            .bind(UserStatus::Pending)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Activate a pending registration with an admin-chosen password
    pub async fn approve(&self, id: Uuid, role: Option<Role>, password: &str) -> Result<User, ApiError> {
        validate_password(password)?;

        let user = self.get(id).await?;
        if user.status != UserStatus::Pending {
            return Err(ApiError::conflict("User is not pending approval"));
        }

        let password_hash = hash_blocking(password.to_string()).await?;
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users
             SET status = $2, role = $3, password_hash = $4, updated_at = now()
             WHERE id = $1
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(UserStatus::Active)
        .bind(role.unwrap_or(user.role))
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("User approved: {} as {}", user.email, user.role);
        Ok(user)
    }

    pub async fn update(&self, id: Uuid, changes: UserChanges) -> Result<User, ApiError> {
        let current = self.get(id).await?;

        let full_name = match changes.full_name {
            Some(name) => validate_full_name(&name)?,
            None => current.full_name,
        };

        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users
             SET full_name = $2, role = $3, status = $4, updated_at = now()
             WHERE id = $1
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(full_name)
        .bind(changes.role.unwrap_or(current.role))
        .bind(changes.status.unwrap_or(current.status))
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn delete(&self, id: Uuid, acting_user_id: Uuid) -> Result<User, ApiError> {
        if id == acting_user_id {
            return Err(ApiError::bad_request("You cannot delete your own account"));
        }

        let user = self.get(id).await?;

        let counts = self.report_counts(id).await?;
        if counts.total() > 0 {
            return Err(ApiError::conflict(
                "User owns or is assigned to reports and cannot be deleted. Deactivate the account instead.",
            ));
        }

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        tracing::info!("User deleted: {} ({})", user.email, user.id);
        Ok(user)
    }

    async fn report_counts(&self, id: Uuid) -> Result<UserReportCounts, ApiError> {
        let counts = sqlx::query_as::<_, UserReportCounts>(
            "SELECT
                (SELECT COUNT(*) FROM reports WHERE creator_id = $1) AS created_reports,
                (SELECT COUNT(*) FROM reports WHERE tm_id = $1) AS tm_assigned_reports,
                (SELECT COUNT(*) FROM reports WHERE pm_id = $1) AS pm_assigned_reports",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(counts)
    }

    /// Active users who can be assigned as approvers in `role`
    pub async fn by_role(&self, role: Role) -> Result<Vec<Assignee>, ApiError> {
        if !role.is_approver() {
            return Err(ApiError::bad_request(
                "Role must be TECHNICAL_MANAGER or PROJECT_MANAGER",
            ));
        }

        let users = sqlx::query_as::<_, Assignee>(
            "SELECT id, full_name, email, role FROM users
             WHERE role = $1 AND status = $2
             ORDER BY full_name",
        )
        .bind(role)
        .bind(UserStatus::Active)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    /// Confirm `id` is an active user holding `role`, for report assignment
    pub async fn require_assignee(&self, id: Uuid, role: Role, field: &str) -> Result<(), ApiError> {
        match self.find_by_id(id).await? {
            Some(user) if user.role == role && user.is_active() => Ok(()),
            _ => Err(ApiError::invalid_field(
                field,
                format!("Must reference an active user with role {}", role),
            )),
        }
    }

    /// Summaries for a set of ids, in no particular order
    pub async fn summaries(&self, ids: &[Uuid]) -> Result<Vec<UserSummary>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let users = sqlx::query_as::<_, UserSummary>(
            "SELECT id, full_name, email FROM users WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }
}

async fn hash_blocking(password: String) -> Result<String, ApiError> {
    let hash = tokio::task::spawn_blocking(move || password::hash_password(&password))
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Password hashing aborted: {}", e)))??;
    Ok(hash)
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    let min = config::config().security.min_password_length;
    if password.chars().count() < min {
        return Err(ApiError::invalid_field(
            "password",
            format!("Password must be at least {} characters", min),
        ));
    }
    if password.len() > password::MAX_PASSWORD_LENGTH {
        return Err(ApiError::invalid_field("password", "Password is too long"));
    }
    Ok(())
}

fn validate_full_name(full_name: &str) -> Result<String, ApiError> {
    let trimmed = full_name.trim();
    if trimmed.chars().count() < 2 {
        return Err(ApiError::invalid_field("fullName", "Full name must be at least 2 characters"));
    }
    Ok(trimmed.to_string())
}

/// Lower-cased, trimmed address if it looks like `local@domain.tld`
pub fn normalize_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(email)
    } else {
        Err(ApiError::invalid_field("email", "Invalid email format"))
    }
}
