//! Relay-style cursor pagination rules.
//!
//! A cursor is an opaque, reversible encoding of an entity id. Both rules
//! fetch one lookahead row past the requested page size to detect whether
//! another page exists; the lookahead row is trimmed before results reach
//! the caller, and reverse pages are re-reversed so output ordering is
//! always ascending by id.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use service_core::error::AppError;
use uuid::Uuid;

use super::{HasId, Param, Rule};

pub fn encode_cursor(id: Uuid) -> String {
    URL_SAFE_NO_PAD.encode(format!("id:{id}"))
}

pub fn decode_cursor(cursor: &str) -> Result<Uuid, AppError> {
    let decoded = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| AppError::Validation(format!("malformed cursor: {cursor}")))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| AppError::Validation(format!("malformed cursor: {cursor}")))?;
    let id = decoded
        .strip_prefix("id:")
        .ok_or_else(|| AppError::Validation(format!("malformed cursor: {cursor}")))?;
    Uuid::parse_str(id).map_err(|_| AppError::Validation(format!("malformed cursor: {cursor}")))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

/// A page of results in ascending-id order.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_info: PageInfo,
}

impl<T: HasId> Page<T> {
    fn build(items: Vec<T>, has_next_page: bool, has_previous_page: bool) -> Self {
        let page_info = PageInfo {
            has_next_page,
            has_previous_page,
            start_cursor: items.first().map(|i| encode_cursor(i.id())),
            end_cursor: items.last().map(|i| encode_cursor(i.id())),
        };
        Self { items, page_info }
    }

    /// All rows with no cursor rule applied.
    pub fn unbounded(items: Vec<T>) -> Self {
        Self::build(items, false, false)
    }
}

/// Forward pagination: `first` rows after an optional cursor.
#[derive(Debug, Clone)]
pub struct ForwardCursorRule {
    first: i64,
    after: Option<Uuid>,
}

impl ForwardCursorRule {
    pub fn new(first: i64, after: Option<&str>) -> Result<Self, AppError> {
        if first <= 0 {
            return Err(AppError::Validation(format!(
                "first must be positive, got {first}"
            )));
        }
        let after = after.map(decode_cursor).transpose()?;
        Ok(Self { first, after })
    }

    /// Trim the lookahead row and build page info from rows returned by
    /// [`super::run_query`] under this rule.
    pub fn page<T: HasId>(&self, mut rows: Vec<T>) -> Page<T> {
        let has_next_page = rows.len() as i64 > self.first;
        rows.truncate(self.first as usize);
        Page::build(rows, has_next_page, false)
    }
}

impl Rule for ForwardCursorRule {
    fn to_sql_where(&self) -> Option<String> {
        self.after.map(|_| "entity_id > :after".to_string())
    }

    fn to_sql_order(&self) -> Option<String> {
        Some("ORDER BY entity_id ASC".to_string())
    }

    fn to_sql_limit(&self) -> Option<String> {
        Some("LIMIT :page_limit".to_string())
    }

    fn to_sql_params(&self) -> Vec<(String, Param)> {
        let mut params = Vec::new();
        if let Some(after) = self.after {
            params.push(("after".to_string(), Param::Uuid(after)));
        }
        // one lookahead row to detect a following page
        params.push(("page_limit".to_string(), Param::Int(self.first + 1)));
        params
    }
}

/// Reverse pagination: `last` rows before an optional cursor.
#[derive(Debug, Clone)]
pub struct ReverseCursorRule {
    last: i64,
    before: Option<Uuid>,
}

impl ReverseCursorRule {
    pub fn new(last: i64, before: Option<&str>) -> Result<Self, AppError> {
        if last <= 0 {
            return Err(AppError::Validation(format!(
                "last must be positive, got {last}"
            )));
        }
        let before = before.map(decode_cursor).transpose()?;
        Ok(Self { last, before })
    }

    /// Trim the lookahead row and restore ascending order.
    pub fn page<T: HasId>(&self, mut rows: Vec<T>) -> Page<T> {
        let has_previous_page = rows.len() as i64 > self.last;
        rows.truncate(self.last as usize);
        rows.reverse();
        Page::build(rows, false, has_previous_page)
    }
}

impl Rule for ReverseCursorRule {
    fn to_sql_where(&self) -> Option<String> {
        self.before.map(|_| "entity_id < :before".to_string())
    }

    fn to_sql_order(&self) -> Option<String> {
        Some("ORDER BY entity_id DESC".to_string())
    }

    fn to_sql_limit(&self) -> Option<String> {
        Some("LIMIT :page_limit".to_string())
    }

    fn to_sql_params(&self) -> Vec<(String, Param)> {
        let mut params = Vec::new();
        if let Some(before) = self.before {
            params.push(("before".to_string(), Param::Uuid(before)));
        }
        params.push(("page_limit".to_string(), Param::Int(self.last + 1)));
        params
    }
}
