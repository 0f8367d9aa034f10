use serde_json::{Map, Value};
use sqlx::PgPool;
use std::str::FromStr;

use crate::database::manager::DatabaseManager;
use crate::database::models::SystemSetting;
use crate::error::ApiError;

/// Settings an admin may change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    CompanyInfo,
    FinalStorageLocations,
}

impl SettingKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::CompanyInfo => "company_info",
            SettingKey::FinalStorageLocations => "final_storage_locations",
        }
    }

    /// Check the value's shape for this key
    pub fn validate(&self, value: &Value) -> Result<(), ApiError> {
        match self {
            SettingKey::CompanyInfo => {
                let object = value
                    .as_object()
                    .ok_or_else(|| ApiError::invalid_field("value", "company_info must be an object"))?;

                match object.get("name").and_then(Value::as_str) {
                    Some(name) if !name.trim().is_empty() => {}
                    _ => return Err(ApiError::invalid_field("value.name", "Company name is required")),
                }
                for optional in ["logo", "primaryColor"] {
                    match object.get(optional) {
                        None | Some(Value::Null) | Some(Value::String(_)) => {}
                        Some(_) => {
                            return Err(ApiError::invalid_field(
                                &format!("value.{}", optional),
                                format!("{} must be a string", optional),
                            ))
                        }
                    }
                }
                Ok(())
            }
            SettingKey::FinalStorageLocations => {
                let items = value.as_array().ok_or_else(|| {
                    ApiError::invalid_field("value", "final_storage_locations must be an array")
                })?;
                if items.is_empty() {
                    return Err(ApiError::invalid_field("value", "At least one storage location is required"));
                }
                let all_named = items
                    .iter()
                    .all(|item| item.as_str().map(|s| !s.trim().is_empty()).unwrap_or(false));
                if !all_named {
                    return Err(ApiError::invalid_field("value", "Storage locations must be non-empty strings"));
                }
                Ok(())
            }
        }
    }
}

impl FromStr for SettingKey {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "company_info" => Ok(SettingKey::CompanyInfo),
            "final_storage_locations" => Ok(SettingKey::FinalStorageLocations),
            other => Err(ApiError::bad_request(format!("Unknown setting '{}'", other))),
        }
    }
}

pub struct SettingsService {
    pool: PgPool,
}

impl SettingsService {
    pub async fn new() -> Result<Self, ApiError> {
        let pool = DatabaseManager::pool().await?;
        Ok(Self { pool })
    }

    pub async fn all(&self) -> Result<Map<String, Value>, ApiError> {
        let rows = sqlx::query_as::<_, SystemSetting>(
            "SELECT key, value, updated_at FROM system_settings ORDER BY key",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|s| (s.key, s.value)).collect())
    }

    pub async fn get(&self, key: SettingKey) -> Result<Option<Value>, ApiError> {
        let value: Option<Value> = sqlx::query_scalar("SELECT value FROM system_settings WHERE key = $1")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn update(&self, key: &str, value: Value) -> Result<SystemSetting, ApiError> {
        let key: SettingKey = key.parse()?;
        key.validate(&value)?;

        let setting = sqlx::query_as::<_, SystemSetting>(
            "INSERT INTO system_settings (key, value, updated_at) VALUES ($1, $2, now())
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()
             RETURNING key, value, updated_at",
        )
        .bind(key.as_str())
        .bind(&value)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("Setting updated: {}", key.as_str());
        Ok(setting)
    }

    /// Write `value` only when the key has never been set
    pub async fn insert_default(&self, key: SettingKey, value: &Value) -> Result<bool, ApiError> {
        key.validate(value)?;
        let result = sqlx::query(
            "INSERT INTO system_settings (key, value) VALUES ($1, $2) ON CONFLICT (key) DO NOTHING",
        )
        .bind(key.as_str())
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Locations a completed report may be filed under
    pub async fn storage_locations(&self) -> Result<Vec<String>, ApiError> {
        let locations = self
            .get(SettingKey::FinalStorageLocations)
            .await?
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        Ok(locations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_key_is_a_bad_request() {
        let err = "theme".parse::<SettingKey>().unwrap_err();
        assert_eq!(err.error_code(), "BAD_REQUEST");
    }

    #[test]
    fn company_info_requires_name() {
        let key = SettingKey::CompanyInfo;
        assert!(key.validate(&json!({ "name": "Cully Engineering", "primaryColor": "#3B82F6" })).is_ok());
        assert!(key.validate(&json!({ "name": "  " })).is_err());
        assert!(key.validate(&json!({ "name": "X", "logo": 7 })).is_err());
        assert!(key.validate(&json!("Cully")).is_err());
    }

    #[test]
    fn storage_locations_must_be_non_empty_strings() {
        let key = SettingKey::FinalStorageLocations;
        assert!(key.validate(&json!(["/storage/archive/2025"])).is_ok());
        assert!(key.validate(&json!([])).is_err());
        assert!(key.validate(&json!(["/a", ""])).is_err());
        assert!(key.validate(&json!(["/a", 3])).is_err());
        assert!(key.validate(&json!({ "path": "/a" })).is_err());
    }
}
