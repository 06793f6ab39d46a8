//! Offset pagination over job-run listings.

use crate::DEFAULT_PAGE_SIZE;

/// Parameters for one page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    pub offset: u32,
}

/// Tracks progress through a paginated listing.
///
/// The offset advances by the number of runs actually returned, and the
/// listing ends when the platform reports no further pages or a page comes
/// back empty.
#[derive(Debug, Clone)]
pub struct Pager {
    limit: u32,
    offset: u32,
    done: bool,
}

impl Pager {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            offset: 0,
            done: false,
        }
    }

    /// The next page to request, or `None` once the listing is exhausted.
    pub fn next_request(&self) -> Option<PageRequest> {
        (!self.done).then_some(PageRequest {
            limit: self.limit,
            offset: self.offset,
        })
    }

    /// Record the result of the last requested page.
    pub fn advance(&mut self, returned: usize, has_more: bool) {
        if !has_more || returned == 0 {
            self.done = true;
            return;
        }
        let returned = u32::try_from(returned).unwrap_or(u32::MAX);
        self.offset = self.offset.saturating_add(returned);
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl Default for Pager {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}
