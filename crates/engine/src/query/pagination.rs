//! Page/limit normalization and page metadata.

/// Page size used when a resource does not declare its own.
pub const DEFAULT_LIMIT: u32 = 20;

/// Hard upper bound on page size for every resource.
pub const MAX_LIMIT: u32 = 100;

/// Normalized pagination for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based page number.
    pub page: u32,
    /// Items per page, within `[1, max]`.
    pub limit: u32,
}

impl Pagination {
    /// Normalize raw input before any query runs.
    ///
    /// A missing or non-positive page becomes 1. A missing or non-positive
    /// limit becomes `default_limit`; a limit above `max_limit` is clamped to it.
    pub fn normalize(
        page: Option<i64>,
        limit: Option<i64>,
        default_limit: u32,
        max_limit: u32,
    ) -> Self {
        let max_limit = max_limit.max(1);
        let default_limit = default_limit.clamp(1, max_limit);

        let page = match page {
            Some(p) if p >= 1 => u32::try_from(p).unwrap_or(u32::MAX),
            _ => 1,
        };

        let limit = match limit {
            Some(l) if l >= 1 => {
                let requested = u32::try_from(l).unwrap_or(u32::MAX);
                if requested > max_limit {
                    tracing::warn!(
                        requested = requested,
                        capped = max_limit,
                        "limit exceeds maximum, capping"
                    );
                    max_limit
                } else {
                    requested
                }
            }
            _ => default_limit,
        };

        Self { page, limit }
    }

    /// Rows to skip: `(page - 1) * limit`.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    /// `ceil(total / limit)`, and 0 when there is nothing.
    pub fn total_pages(&self, total: u64) -> u32 {
        if total == 0 || self.limit == 0 {
            return 0;
        }
        let pages = total.div_ceil(u64::from(self.limit));
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    /// How many items a page must hold for a given total.
    pub fn expected_len(&self, total: u64) -> u64 {
        total
            .saturating_sub(self.offset())
            .min(u64::from(self.limit))
    }
}
