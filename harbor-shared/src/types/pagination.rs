use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 { 1 }
fn default_per_page() -> u64 { 20 }

impl PaginationParams {
    pub fn offset(&self) -> u64 {
        (self.page.saturating_sub(1)) * self.per_page
    }

    pub fn limit(&self) -> u64 {
        self.per_page.min(100)
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { page: 1, per_page: 20 }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T: Serialize> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

impl<T: Serialize> Paginated<T> {
    pub fn new(items: Vec<T>, total: u64, params: &PaginationParams) -> Self {
        let per_page = params.limit();
        let total_pages = if total == 0 { 0 } else { (total + per_page - 1) / per_page };
        Self {
            items,
            total,
            page: params.page,
            per_page,
            total_pages,
        }
    }
}

/// Cursor-paginated page. The cursor is the id of the last row of the
/// previous page, used as an exclusive bound on the id ordering.
#[derive(Debug, Serialize, Deserialize)]
pub struct CursorPage<T: Serialize> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Uuid>,
    pub has_more: bool,
}

impl<T: Serialize> CursorPage<T> {
    /// Build a page from rows fetched with `limit + 1`: the extra row only
    /// signals that another page exists and is not returned.
    pub fn from_rows(mut rows: Vec<T>, limit: usize, id_of: impl Fn(&T) -> Uuid) -> Self {
        let has_more = rows.len() > limit;
        if has_more {
            rows.truncate(limit);
        }
        let next_cursor = if has_more {
            rows.last().map(&id_of)
        } else {
            None
        };
        Self {
            items: rows,
            next_cursor,
            has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row(Uuid);

    fn rows(n: usize) -> Vec<Row> {
        (0..n).map(|_| Row(Uuid::now_v7())).collect()
    }

    #[test]
    fn offset_is_zero_based_from_page_one() {
        let params = PaginationParams { page: 1, per_page: 20 };
        assert_eq!(params.offset(), 0);
        let params = PaginationParams { page: 3, per_page: 10 };
        assert_eq!(params.offset(), 20);
    }

    #[test]
    fn per_page_is_capped_at_100() {
        let params = PaginationParams { page: 1, per_page: 5000 };
        assert_eq!(params.limit(), 100);
    }

    #[test]
    fn total_pages_rounds_up() {
        let params = PaginationParams { page: 1, per_page: 20 };
        assert_eq!(Paginated::new(rows(20), 41, &params).total_pages, 3);
        assert_eq!(Paginated::<Row>::new(vec![], 0, &params).total_pages, 0);
    }

    #[test]
    fn full_fetch_signals_more_and_drops_sentinel_row() {
        let page = CursorPage::from_rows(rows(51), 50, |r| r.0);
        assert_eq!(page.items.len(), 50);
        assert!(page.has_more);
        assert_eq!(page.next_cursor, Some(page.items.last().unwrap().0));
    }

    #[test]
    fn short_fetch_is_the_last_page() {
        let page = CursorPage::from_rows(rows(7), 50, |r| r.0);
        assert_eq!(page.items.len(), 7);
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn exact_fetch_without_sentinel_is_the_last_page() {
        let page = CursorPage::from_rows(rows(50), 50, |r| r.0);
        assert_eq!(page.items.len(), 50);
        assert!(!page.has_more);
    }
}
