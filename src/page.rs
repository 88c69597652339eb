/*!
Pagination of list endpoints.
*/
use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// `page` and `limit` query parameters, as requested.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// A validated page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, limit: DEFAULT_LIMIT }
    }
}

impl Page {
    pub fn from_query(q: PageQuery) -> Result<Page, String> {
        let page = q.page.unwrap_or(1);
        let limit = q.limit.unwrap_or(DEFAULT_LIMIT);

        if page < 1 {
            return Err(format!("page must be at least 1 (got {}).", page));
        }
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(format!(
                "limit must be between 1 and {} (got {}).", MAX_LIMIT, limit
            ));
        }

        if (page - 1).checked_mul(limit).is_none() {
            return Err(format!("page {} is out of range.", page));
        }

        Ok(Page { page, limit })
    }

    /// Rows to skip. Pages from `from_query` never overflow this.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        total / self.limit + i64::from(total % self.limit != 0)
    }

    pub fn wrap<T>(&self, items: Vec<T>, total: i64) -> Paged<T> {
        Paged {
            items,
            total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages(total),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let p = Page::from_query(PageQuery::default()).unwrap();
        assert_eq!(p, Page::default());
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn bounds() {
        assert!(Page::from_query(PageQuery { page: Some(0), limit: None }).is_err());
        assert!(Page::from_query(PageQuery { page: None, limit: Some(0) }).is_err());
        assert!(Page::from_query(PageQuery { page: None, limit: Some(101) }).is_err());
        let p = Page::from_query(PageQuery { page: Some(3), limit: Some(100) }).unwrap();
        assert_eq!(p.offset(), 200);

        assert!(Page::from_query(PageQuery { page: Some(i64::MAX), limit: Some(100) }).is_err());
        let last = i64::MAX / 100 + 1;
        let p = Page::from_query(PageQuery { page: Some(last), limit: Some(100) }).unwrap();
        assert_eq!(p.offset(), (last - 1) * 100);
        assert!(Page::from_query(PageQuery { page: Some(last + 1), limit: Some(100) }).is_err());
    }

    #[test]
    fn page_counts_round_up() {
        let p = Page { page: 1, limit: 20 };
        assert_eq!(p.total_pages(0), 0);
        assert_eq!(p.total_pages(1), 1);
        assert_eq!(p.total_pages(20), 1);
        assert_eq!(p.total_pages(21), 2);
        assert_eq!(p.total_pages(i64::MAX), i64::MAX / 20 + 1);

        let wrapped = p.wrap(vec!["a", "b"], 41);
        assert_eq!(wrapped.total_pages, 3);
        assert_eq!(wrapped.items.len(), 2);
    }
}
