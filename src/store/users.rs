use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{Record, RecordStore};
use crate::error::ApiError;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for User {
    fn id(&self) -> u64 {
        self.id
    }

    fn unique_key(&self) -> String {
        self.email.to_lowercase()
    }
}

/// `POST /api/users` body.
#[derive(Debug, Default, Deserialize)]
pub struct NewUser {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl NewUser {
    /// Returns the trimmed `(name, email)` pair.
    pub fn validate(self) -> Result<(String, String), ApiError> {
        let name = self.name.map(|n| n.trim().to_string()).unwrap_or_default();
        let email = self.email.map(|e| e.trim().to_string()).unwrap_or_default();
        if name.is_empty() || email.is_empty() {
            return Err(ApiError::validation("name and email are required"));
        }
        if !is_valid_email(&email) {
            return Err(ApiError::validation(format!("invalid email address: {email}")));
        }
        Ok((name, email))
    }
}

/// Partial update; absent or blank fields are left as they are.
#[derive(Debug, Default, Deserialize)]
pub struct UserPatch {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UserPatch {
    pub fn validate(&self) -> Result<(), ApiError> {
        match self.email.as_deref().map(str::trim) {
            Some(email) if !email.is_empty() && !is_valid_email(email) => Err(
                ApiError::validation(format!("invalid email address: {email}")),
            ),
            _ => Ok(()),
        }
    }

    pub fn apply(&self, user: &mut User) {
        if let Some(name) = non_blank(&self.name) {
            user.name = name;
        }
        if let Some(email) = non_blank(&self.email) {
            user.email = email;
        }
        user.updated_at = Some(Utc::now());
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UserFilter {
    pub search: Option<String>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        match non_blank(&self.search) {
            Some(needle) => {
                let needle = needle.to_lowercase();
                user.name.to_lowercase().contains(&needle)
                    || user.email.to_lowercase().contains(&needle)
            }
            None => true,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn build_user(id: u64, name: String, email: String) -> User {
    User {
        id,
        name,
        email,
        created_at: Utc::now(),
        updated_at: None,
    }
}

/// Demo users present at startup.
pub fn seeded() -> RecordStore<User> {
    RecordStore::with_records(vec![
        build_user(1, "张三".into(), "zhangsan@example.com".into()),
        build_user(2, "李四".into(), "lisi@example.com".into()),
    ])
}
