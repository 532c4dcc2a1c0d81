//! Pagination helpers for list operations.

use serde::Serialize;

const DEFAULT_PAGE_SIZE: usize = 30;
const MAX_PAGE_SIZE: usize = 100;

/// 1-based page selection. Invalid input silently falls back to defaults and
/// oversized pages are clamped rather than erroring.
#[derive(Debug, Clone, Copy)]
pub struct PageParams {
    pub page: usize,
    pub size: usize,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: 1,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageParams {
    pub fn new(page: usize, size: usize) -> Self {
        Self {
            page: page.max(1),
            size: size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Build from raw query-string values; anything unparsable falls back to
    /// the defaults.
    pub fn from_raw(page: Option<&str>, size: Option<&str>) -> Self {
        let page = page
            .and_then(|p| p.parse::<usize>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1);
        let size = size
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|s| *s >= 1)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        Self { page, size }
    }
}

/// One page of an ordered listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}

impl<T> Page<T> {
    /// Slice a full, already-ordered result set.
    pub fn slice(all: Vec<T>, params: PageParams) -> Self {
        let total = all.len();
        let start = params.page.saturating_sub(1).saturating_mul(params.size);
        let items = if start >= total {
            Vec::new()
        } else {
            all.into_iter().skip(start).take(params.size).collect()
        };
        Self {
            items,
            page: params.page,
            size: params.size,
            total,
        }
    }
}
