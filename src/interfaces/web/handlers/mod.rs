pub mod drafts;
pub mod error_logs;
pub mod platforms;
pub mod scheduled;
pub mod scheduling;

use serde::Deserialize;

pub(crate) const DEFAULT_PAGE_LIMIT: i64 = 20;
pub(crate) const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    /// Clamped (limit, offset) with defaults applied.
    pub fn bounds(&self) -> (i64, i64) {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

/// Offsets for the neighbouring pages; `None` marks an exhausted direction.
pub(crate) fn page_links(total: i64, limit: i64, offset: i64) -> (Option<i64>, Option<i64>) {
    let next = if offset + limit < total {
        Some(offset + limit)
    } else {
        None
    };
    let prev = if offset > 0 {
        Some((offset - limit).max(0))
    } else {
        None
    };
    (next, prev)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_links_mark_exhausted_directions() {
        assert_eq!(page_links(5, 2, 0), (Some(2), None));
        assert_eq!(page_links(5, 2, 2), (Some(4), Some(0)));
        assert_eq!(page_links(5, 2, 4), (None, Some(2)));
        assert_eq!(page_links(0, 2, 0), (None, None));
    }

    #[test]
    fn bounds_clamp_limit_and_offset() {
        let q = PageQuery {
            limit: Some(10_000),
            offset: Some(-3),
        };
        assert_eq!(q.bounds(), (MAX_PAGE_LIMIT, 0));
        assert_eq!(PageQuery::default().bounds(), (DEFAULT_PAGE_LIMIT, 0));
    }
}
