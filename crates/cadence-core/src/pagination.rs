//! Page-based and offset-based list windows.
//!
//! A query uses either `page`/`pageSize` or `start`/`limit`; mixing the two is
//! rejected. Missing values fall back to the configured default limit and a
//! configured `max_limit` caps whatever the caller asks for.

use serde::{Deserialize, Serialize};

use crate::config::ApiConfig;
use crate::error::{CadenceError, Result};

/// Raw pagination parameters as they arrive in a query string.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub page_size: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub with_count: Option<String>,
}

impl PageQuery {
    pub fn paged(page: u64, page_size: u64) -> Self {
        Self {
            page: Some(page.to_string()),
            page_size: Some(page_size.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Paged { page: u64, page_size: u64 },
    /// `limit: None` returns everything from `start`.
    Offset { start: u64, limit: Option<u64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub window: Window,
    pub with_count: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PaginationMeta {
    #[serde(rename_all = "camelCase")]
    Paged {
        page: u64,
        page_size: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        page_count: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
    },
    Offset {
        start: u64,
        /// `-1` when unlimited.
        limit: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
    },
}

fn number(field: &str, raw: &Option<String>) -> Result<Option<i64>> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse::<i64>().map(Some).map_err(|_| {
            CadenceError::Validation(format!("Invalid pagination parameter {field}: expected a number"))
        }),
    }
}

/// Boolean query flag: `true`/`t`/`1` or `false`/`f`/`0`.
pub fn parse_flag(field: &str, raw: &str) -> Result<bool> {
    match raw.trim() {
        "true" | "t" | "1" => Ok(true),
        "false" | "f" | "0" => Ok(false),
        _ => Err(CadenceError::Validation(format!(
            r#"Invalid {field} parameter. Expected "t","1","true","false","0","f""#
        ))),
    }
}

fn parse_with_count(raw: Option<&str>, default: bool) -> Result<bool> {
    raw.map_or(Ok(default), |v| parse_flag("withCount", v))
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

impl Pagination {
    pub fn from_query(query: &PageQuery, api: &ApiConfig) -> Result<Self> {
        let with_count = parse_with_count(query.with_count.as_deref(), api.with_count)?;
        let page = number("page", &query.page)?;
        let page_size = number("pageSize", &query.page_size)?;
        let start = number("start", &query.start)?;
        let limit = number("limit", &query.limit)?;

        let is_paged = page.is_some() || page_size.is_some();
        let is_offset = start.is_some() || limit.is_some();
        let default_limit = api.default_limit.max(1);
        let max_limit = api.max_limit;

        let window = match (is_paged, is_offset) {
            (true, true) => {
                return Err(CadenceError::Validation(
                    "Invalid pagination parameters. Expected either start/limit or page/pageSize"
                        .into(),
                ))
            }
            (false, false) => Window::Paged {
                page: 1,
                page_size: default_limit,
            },
            (true, false) => {
                let size = page_size.map_or(default_limit, |s| s.max(1) as u64);
                Window::Paged {
                    page: page.unwrap_or(1).max(1) as u64,
                    page_size: max_limit.map_or(size, |max| size.min(max)),
                }
            }
            (false, true) => {
                let limit = match limit.unwrap_or(default_limit as i64) {
                    -1 => max_limit,
                    n => {
                        let n = n.max(1) as u64;
                        Some(max_limit.map_or(n, |max| n.min(max)))
                    }
                };
                Window::Offset {
                    start: start.unwrap_or(0).max(0) as u64,
                    limit,
                }
            }
        };
        Ok(Self { window, with_count })
    }

    /// Everything in one window.
    pub fn unbounded() -> Self {
        Self {
            window: Window::Offset {
                start: 0,
                limit: None,
            },
            with_count: true,
        }
    }

    pub fn offset(&self) -> usize {
        match self.window {
            Window::Paged { page, page_size } => {
                to_usize(page.saturating_sub(1).saturating_mul(page_size))
            }
            Window::Offset { start, .. } => to_usize(start),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        match self.window {
            Window::Paged { page_size, .. } => Some(to_usize(page_size)),
            Window::Offset { limit, .. } => limit.map(to_usize),
        }
    }

    /// Cut the window out of a full, already ordered result set.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset());
        match self.limit() {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }

    pub fn meta(&self, total: usize) -> PaginationMeta {
        let total = total as u64;
        let counted = self.with_count.then_some(total);
        match self.window {
            Window::Paged { page, page_size } => PaginationMeta::Paged {
                page,
                page_size,
                page_count: counted.map(|t| t.div_ceil(page_size)),
                total: counted,
            },
            Window::Offset { start, limit } => PaginationMeta::Offset {
                start,
                limit: limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX)),
                total: counted,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(max: Option<u64>) -> ApiConfig {
        ApiConfig {
            default_limit: 25,
            max_limit: max,
            with_count: true,
        }
    }

    fn q(pairs: &[(&str, &str)]) -> PageQuery {
        let mut query = PageQuery::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "page" => query.page = v,
                "pageSize" => query.page_size = v,
                "start" => query.start = v,
                "limit" => query.limit = v,
                "withCount" => query.with_count = v,
                _ => unreachable!(),
            }
        }
        query
    }

    #[test]
    fn defaults_to_first_page() {
        let p = Pagination::from_query(&q(&[]), &api(None)).unwrap();
        assert_eq!(p.window, Window::Paged { page: 1, page_size: 25 });
    }

    #[test]
    fn mixing_styles_is_rejected() {
        let err = Pagination::from_query(&q(&[("page", "2"), ("limit", "5")]), &api(None)).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn page_values_are_clamped_and_capped() {
        let p = Pagination::from_query(&q(&[("page", "0"), ("pageSize", "500")]), &api(Some(100))).unwrap();
        assert_eq!(p.window, Window::Paged { page: 1, page_size: 100 });

        let p = Pagination::from_query(&q(&[("pageSize", "-3")]), &api(None)).unwrap();
        assert_eq!(p.window, Window::Paged { page: 1, page_size: 1 });
    }

    #[test]
    fn minus_one_limit_is_unlimited_unless_capped() {
        let p = Pagination::from_query(&q(&[("limit", "-1")]), &api(None)).unwrap();
        assert_eq!(p.window, Window::Offset { start: 0, limit: None });

        let p = Pagination::from_query(&q(&[("limit", "-1"), ("start", "-4")]), &api(Some(50))).unwrap();
        assert_eq!(p.window, Window::Offset { start: 0, limit: Some(50) });
    }

    #[test]
    fn with_count_accepts_only_known_spellings() {
        for (raw, expected) in [("t", true), ("1", true), ("false", false), ("0", false)] {
            let p = Pagination::from_query(&q(&[("withCount", raw)]), &api(None)).unwrap();
            assert_eq!(p.with_count, expected, "withCount={raw}");
        }
        assert!(Pagination::from_query(&q(&[("withCount", "yes")]), &api(None)).is_err());
    }

    #[test]
    fn apply_and_meta_for_pages() {
        let p = Pagination::from_query(&q(&[("page", "2"), ("pageSize", "2")]), &api(None)).unwrap();
        assert_eq!(p.apply((1..=5).collect::<Vec<_>>()), vec![3, 4]);
        let json = serde_json::to_value(p.meta(5)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "page": 2, "pageSize": 2, "pageCount": 3, "total": 5 })
        );
    }

    #[test]
    fn offset_meta_reports_unlimited_as_minus_one() {
        let p = Pagination::from_query(&q(&[("start", "1"), ("limit", "-1")]), &api(None)).unwrap();
        assert_eq!(p.apply(vec!['a', 'b', 'c']), vec!['b', 'c']);
        let json = serde_json::to_value(p.meta(3)).unwrap();
        assert_eq!(json, serde_json::json!({ "start": 1, "limit": -1, "total": 3 }));
    }

    #[test]
    fn without_count_omits_totals() {
        let p = Pagination::from_query(&q(&[("withCount", "f")]), &api(None)).unwrap();
        let json = serde_json::to_value(p.meta(10)).unwrap();
        assert_eq!(json, serde_json::json!({ "page": 1, "pageSize": 25 }));
    }

    #[test]
    fn huge_page_yields_empty_window() {
        let p = Pagination::from_query(&PageQuery::paged(i64::MAX as u64, 25), &api(None)).unwrap();
        assert!(p.apply(vec![1, 2, 3]).is_empty());

        let p = Pagination::from_query(&q(&[("start", &i64::MAX.to_string())]), &api(None)).unwrap();
        assert!(p.apply(vec![1, 2, 3]).is_empty());
    }

    #[test]
    fn flags_share_one_spelling() {
        assert!(parse_flag("released", "t").unwrap());
        assert!(!parse_flag("released", " false ").unwrap());
        let err = parse_flag("released", "yes").unwrap_err();
        assert!(err.to_string().contains("Invalid released parameter"));
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        assert!(Pagination::from_query(&q(&[("page", "two")]), &api(None)).is_err());
    }
}
