use serde::{Deserialize, Serialize};

pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl Pagination {
    /// For query structs that carry `limit`/`offset` next to their own filters.
    pub fn from_parts(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit.unwrap_or_else(default_limit),
            offset: offset.unwrap_or(0),
        }
        .clamped()
    }

    /// Limit in `1..=MAX_LIMIT`, offset never negative.
    pub fn clamped(self) -> Self {
        Self {
            limit: self.limit.clamp(1, MAX_LIMIT),
            offset: self.offset.max(0),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, p: Pagination) -> Self {
        Self {
            items,
            total,
            limit: p.limit,
            offset: p.offset,
        }
    }
}

/// 1-based page selection over an in-memory list; out-of-range pages clamp to the last page.
#[derive(Debug, Serialize)]
pub struct PageNumbered<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub num_pages: usize,
    pub total: usize,
}

pub fn paginate_numbered<T>(items: Vec<T>, page: usize, per_page: usize) -> PageNumbered<T> {
    let per_page = per_page.max(1);
    let total = items.len();
    let num_pages = total.div_ceil(per_page).max(1);
    let page = page.clamp(1, num_pages);
    let items = items
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .collect();
    PageNumbered {
        items,
        page,
        per_page,
        num_pages,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_limit_and_offset() {
        let p = Pagination {
            limit: 1000,
            offset: -5,
        }
        .clamped();
        assert_eq!(p.limit, MAX_LIMIT);
        assert_eq!(p.offset, 0);

        let p = Pagination { limit: 0, offset: 3 }.clamped();
        assert_eq!(p.limit, 1);
        assert_eq!(p.offset, 3);
    }

    #[test]
    fn numbered_pages_clamp_to_last() {
        let page = paginate_numbered((1..=7).collect::<Vec<_>>(), 9, 3);
        assert_eq!(page.num_pages, 3);
        assert_eq!(page.page, 3);
        assert_eq!(page.items, vec![7]);

        let page = paginate_numbered((1..=7).collect::<Vec<_>>(), 0, 3);
        assert_eq!(page.page, 1);
        assert_eq!(page.items, vec![1, 2, 3]);
    }

    #[test]
    fn empty_list_has_one_page() {
        let page = paginate_numbered(Vec::<i32>::new(), 2, 3);
        assert_eq!(page.num_pages, 1);
        assert_eq!(page.page, 1);
        assert!(page.items.is_empty());
    }
}
