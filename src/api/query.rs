//! List query parameters shared by the paginated endpoints
//!
//! `?page=2&limit=20&sort=-createdAt,title&fields=title,price`

use crate::db::PageRequest;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 100;
const MAX_PAGE: i64 = 100_000;
const DEFAULT_ORDER: &str = "created_at DESC";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
    pub fields: Option<String>,
    /// Parent filters
    pub course: Option<Uuid>,
    pub module: Option<Uuid>,
}

impl ListQuery {
    /// Build the page request, accepting only sort keys in `sortable`
    pub fn page_request(&self, sortable: &[&str]) -> Result<PageRequest, AppError> {
        let page = self.page.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        let mut order = Vec::new();
        for key in self.sort.as_deref().unwrap_or_default().split(',') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let (name, direction) = match key.strip_prefix('-') {
                Some(name) => (name, "DESC"),
                None => (key, "ASC"),
            };
            let column = to_snake_case(name);
            if !sortable.contains(&column.as_str()) {
                return Err(AppError::bad_request(format!("Cannot sort by '{}'", name)));
            }
            order.push(format!("{} {}", column, direction));
        }

        let order_by = if order.is_empty() {
            DEFAULT_ORDER.to_string()
        } else {
            order.join(", ")
        };

        Ok(PageRequest {
            page,
            limit,
            order_by,
        })
    }

    /// Value of the parent filter named `param`
    pub fn parent(&self, param: &str) -> Option<Uuid> {
        match param {
            "course" => self.course,
            "module" => self.module,
            _ => None,
        }
    }

    /// Serialize the items, keeping only the requested fields (plus `id`)
    pub fn project<T: Serialize>(&self, items: &[T]) -> Result<Vec<Value>, AppError> {
        let fields: Option<Vec<&str>> = self.fields.as_deref().map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .collect()
        });

        items
            .iter()
            .map(|item| {
                let value = serde_json::to_value(item)
                    .map_err(|e| AppError::internal(format!("Failed to serialize response: {}", e)))?;
                Ok(match (&fields, value) {
                    (Some(fields), Value::Object(map)) if !fields.is_empty() => Value::Object(
                        map.into_iter()
                            .filter(|(key, _)| key == "id" || fields.contains(&key.as_str()))
                            .collect(),
                    ),
                    (_, value) => value,
                })
            })
            .collect()
    }
}

/// `createdAt` -> `created_at`
fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SORTABLE: &[&str] = &["created_at", "title", "price"];

    #[test]
    fn test_defaults() {
        let page = ListQuery::default().page_request(SORTABLE).unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, 10);
        assert_eq!(page.order_by, "created_at DESC");
    }

    #[test]
    fn test_limit_and_page_are_clamped() {
        let query = ListQuery {
            page: Some(0),
            limit: Some(1000),
            ..Default::default()
        };
        let page = query.page_request(SORTABLE).unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, 100);

        let query = ListQuery {
            page: Some(i64::MAX),
            limit: Some(100),
            ..Default::default()
        };
        let page = query.page_request(SORTABLE).unwrap();
        assert_eq!(page.page, MAX_PAGE);
        assert_eq!(page.offset(), (MAX_PAGE - 1) * 100);
    }

    #[test]
    fn test_sort_keys() {
        let query = ListQuery {
            sort: Some("-createdAt, title".to_string()),
            ..Default::default()
        };
        let page = query.page_request(SORTABLE).unwrap();
        assert_eq!(page.order_by, "created_at DESC, title ASC");

        let query = ListQuery {
            sort: Some("title;DROP TABLE courses".to_string()),
            ..Default::default()
        };
        let err = query.page_request(SORTABLE).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_field_projection_keeps_id() {
        let items = vec![json!({"id": "a", "title": "Intro", "price": "10", "tags": []})];
        let query = ListQuery {
            fields: Some("title, price".to_string()),
            ..Default::default()
        };
        let projected = query.project(&items).unwrap();
        assert_eq!(projected[0], json!({"id": "a", "title": "Intro", "price": "10"}));

        let untouched = ListQuery::default().project(&items).unwrap();
        assert_eq!(untouched[0], items[0]);
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("durationMinutes"), "duration_minutes");
        assert_eq!(to_snake_case("title"), "title");
    }
}
