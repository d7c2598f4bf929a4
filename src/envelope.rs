use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// Uniform JSON envelope returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: message.into(),
            timestamp: Some(timestamp()),
        }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(code.into()),
            message: message.into(),
            timestamp: Some(timestamp()),
        }
    }
}

/// Current time as RFC 3339 UTC with millisecond precision.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

impl Pagination {
    pub const MAX_LIMIT: usize = 100;

    pub fn new(page: usize, limit: usize) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    /// Lenient query parsing: anything that is not an integer takes the default.
    pub fn from_query(page: Option<&str>, limit: Option<&str>) -> Self {
        let defaults = Self::default();
        let page = page
            .and_then(|p| p.trim().parse::<i64>().ok())
            .map(|p| p.max(1) as usize)
            .unwrap_or(defaults.page);
        let limit = limit
            .and_then(|l| l.trim().parse::<i64>().ok())
            .map(|l| l.max(1) as usize)
            .unwrap_or(defaults.limit);
        Self::new(page, limit)
    }

    /// Saturates, so a page far past the end just yields nothing.
    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Serialize)]
pub struct PageInfo {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub pages: usize,
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: usize, pagination: Pagination) -> Self {
        Self {
            items,
            pagination: PageInfo {
                page: pagination.page,
                limit: pagination.limit,
                total,
                pages: total.div_ceil(pagination.limit),
            },
        }
    }
}
