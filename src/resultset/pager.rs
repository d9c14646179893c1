//! Page arithmetic for paged resultsets

use serde::Serialize;

/// Where one page sits within a paged result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pager {
    pub total_entries: u64,
    pub entries_per_page: u64,
    /// 1-based
    pub current_page: u64,
}

impl Pager {
    pub fn new(total_entries: u64, entries_per_page: u64, current_page: u64) -> Self {
        Self {
            total_entries,
            entries_per_page: entries_per_page.max(1),
            current_page: current_page.max(1),
        }
    }

    /// Number of the last page; an empty result still has page 1
    pub fn last_page(&self) -> u64 {
        self.total_entries.div_ceil(self.entries_per_page).max(1)
    }

    /// 1-based index of the first entry on this page, 0 when the page is empty
    pub fn first(&self) -> u64 {
        if self.entries_on_this_page() == 0 {
            0
        } else {
            self.skipped() + 1
        }
    }

    /// 1-based index of the last entry on this page, 0 when the page is empty
    pub fn last(&self) -> u64 {
        if self.entries_on_this_page() == 0 {
            0
        } else {
            self.current_page.saturating_mul(self.entries_per_page).min(self.total_entries)
        }
    }

    pub fn entries_on_this_page(&self) -> u64 {
        self.total_entries.saturating_sub(self.skipped()).min(self.entries_per_page)
    }

    /// Entries on the pages before this one
    fn skipped(&self) -> u64 {
        (self.current_page - 1).saturating_mul(self.entries_per_page)
    }

    pub fn previous_page(&self) -> Option<u64> {
        (self.current_page > 1).then(|| self.current_page - 1)
    }

    pub fn next_page(&self) -> Option<u64> {
        (self.current_page < self.last_page()).then(|| self.current_page + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_middle_page() {
        let pager = Pager::new(25, 10, 2);
        assert_eq!(pager.last_page(), 3);
        assert_eq!((pager.first(), pager.last()), (11, 20));
        assert_eq!(pager.previous_page(), Some(1));
        assert_eq!(pager.next_page(), Some(3));
    }

    #[test]
    fn test_last_partial_page() {
        let pager = Pager::new(25, 10, 3);
        assert_eq!((pager.first(), pager.last()), (21, 25));
        assert_eq!(pager.entries_on_this_page(), 5);
        assert_eq!(pager.next_page(), None);
    }

    #[test]
    fn test_empty_and_out_of_range() {
        let empty = Pager::new(0, 10, 0);
        assert_eq!(empty.current_page, 1);
        assert_eq!(empty.last_page(), 1);
        assert_eq!((empty.first(), empty.last()), (0, 0));
        assert_eq!(empty.previous_page(), None);

        let beyond = Pager::new(5, 10, 4);
        assert_eq!(beyond.entries_on_this_page(), 0);
        assert_eq!(beyond.previous_page(), Some(3));
    }

    #[test]
    fn test_extreme_sizes() {
        let one_page = Pager::new(4, u64::MAX, 1);
        assert_eq!(one_page.last_page(), 1);
        assert_eq!((one_page.first(), one_page.last()), (1, 4));

        let far = Pager::new(u64::MAX, 2, u64::MAX);
        assert_eq!(far.last_page(), u64::MAX / 2 + 1);
        assert_eq!(far.entries_on_this_page(), 0);
        assert_eq!((far.first(), far.last()), (0, 0));
        assert_eq!(far.next_page(), None);
    }
}
