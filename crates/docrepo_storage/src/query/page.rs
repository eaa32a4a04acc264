//! Counting and pagination of query results.

/// How a query computes its total size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountMode {
    /// Always count precisely.
    #[default]
    Exact,
    /// Do not count.
    Skip,
    /// Count precisely up to the bound; beyond it report truncation.
    UpTo(usize),
}

impl CountMode {
    /// Maps the integer `countUpTo` convention: `-1` exact, `0` skip,
    /// positive values bound the count. Other negatives count exactly.
    #[must_use]
    pub fn from_count_up_to(count_up_to: i64) -> Self {
        match count_up_to {
            0 => Self::Skip,
            n if n > 0 => Self::UpTo(usize::try_from(n).unwrap_or(usize::MAX)),
            _ => Self::Exact,
        }
    }

    /// Computes the reported total for `matched` results.
    #[must_use]
    pub fn total(self, matched: usize) -> TotalSize {
        match self {
            Self::Exact => TotalSize::Exact(matched),
            Self::Skip => TotalSize::NotCounted,
            Self::UpTo(bound) if matched > bound => TotalSize::Truncated,
            Self::UpTo(_) => TotalSize::Exact(matched),
        }
    }
}

/// Total size reported alongside a page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalSize {
    /// Number of matches before pagination.
    Exact(usize),
    /// Counting was skipped.
    NotCounted,
    /// More matches than the counting bound.
    Truncated,
}

impl TotalSize {
    /// Integer form: the count, `-1` when not counted, `-2` when truncated.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Exact(n) => i64::try_from(n).unwrap_or(i64::MAX),
            Self::NotCounted => -1,
            Self::Truncated => -2,
        }
    }
}

/// A page of results with the total size of the full result set.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialList<T> {
    /// Results in this page, in order.
    pub items: Vec<T>,
    /// Size of the full result set, per the query's [`CountMode`].
    pub total_size: TotalSize,
}

impl<T> PartialList<T> {
    /// Returns the number of results in this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if this page is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Transforms every item, keeping the total size.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PartialList<U> {
        PartialList {
            items: self.items.into_iter().map(f).collect(),
            total_size: self.total_size,
        }
    }
}

impl<T> IntoIterator for PartialList<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Applies `limit`/`offset` in place.
///
/// A zero `limit` means no limit, and the offset is then ignored as well.
/// An offset past the end leaves an empty page.
pub fn paginate<T>(items: &mut Vec<T>, limit: usize, offset: usize) {
    if limit == 0 {
        return;
    }
    let skip = offset.min(items.len());
    items.drain(..skip);
    items.truncate(limit);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_tri_state() {
        let n = 5;
        assert_eq!(CountMode::from_count_up_to(-1).total(n).as_i64(), 5);
        assert_eq!(CountMode::from_count_up_to(0).total(n).as_i64(), -1);
        assert_eq!(CountMode::from_count_up_to(3).total(n).as_i64(), -2);
        assert_eq!(CountMode::from_count_up_to(10).total(n).as_i64(), 5);
        assert_eq!(CountMode::from_count_up_to(5).total(n).as_i64(), 5);
    }

    #[test]
    fn paginate_window() {
        let mut items: Vec<u32> = (1..=10).collect();
        paginate(&mut items, 3, 2);
        assert_eq!(items, vec![3, 4, 5]);
    }

    #[test]
    fn paginate_zero_limit_ignores_offset() {
        let mut items: Vec<u32> = (1..=4).collect();
        paginate(&mut items, 0, 3);
        assert_eq!(items, vec![1, 2, 3, 4]);
    }

    #[test]
    fn paginate_offset_past_end() {
        let mut items: Vec<u32> = (1..=4).collect();
        paginate(&mut items, 2, 9);
        assert!(items.is_empty());
    }
}
