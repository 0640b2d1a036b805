//! Page-number pagination over an ordered scope.

use serde::Serialize;

use tally_core::{DomainError, DomainResult};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Validated `page` / `page_size` query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Parse raw query values. Missing values take defaults; anything that is
    /// not a positive integer is rejected. `page_size` is capped at
    /// [`MAX_PAGE_SIZE`].
    pub fn parse(page: Option<&str>, page_size: Option<&str>) -> DomainResult<Self> {
        let page = match page {
            Some(raw) => positive(raw)?,
            None => 1,
        };
        let page_size = match page_size {
            Some(raw) => positive(raw)?.min(MAX_PAGE_SIZE),
            None => DEFAULT_PAGE_SIZE,
        };
        Ok(Self { page, page_size })
    }

    /// Resolve this request against a scope of `count` items.
    ///
    /// The first page always exists (possibly empty); any page past the last
    /// one is an error rather than an empty page.
    pub fn window(&self, count: u64) -> DomainResult<PageWindow> {
        let size = u64::from(self.page_size);
        let num_pages = count.div_ceil(size).max(1);
        let page = u64::from(self.page);
        if page > num_pages {
            return Err(DomainError::validation("Invalid page number"));
        }
        Ok(PageWindow {
            page: self.page,
            page_size: self.page_size,
            offset: (page - 1) * size,
            limit: size,
            num_pages,
        })
    }
}

fn positive(raw: &str) -> DomainResult<u32> {
    match raw.trim().parse::<u32>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(DomainError::validation("Invalid page parameters")),
    }
}

/// A resolved slice of the scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u32,
    pub page_size: u32,
    pub offset: u64,
    pub limit: u64,
    pub num_pages: u64,
}

impl PageWindow {
    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn next_link(&self) -> Option<String> {
        self.has_next().then(|| self.link(self.page + 1))
    }

    pub fn previous_link(&self) -> Option<String> {
        self.has_previous().then(|| self.link(self.page - 1))
    }

    fn link(&self, page: u32) -> String {
        format!("?page={page}&page_size={}", self.page_size)
    }
}

/// One page of results plus navigation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(count: u64, window: &PageWindow, results: Vec<T>) -> Self {
        Self {
            count,
            next: window.next_link(),
            previous: window.previous_link(),
            results,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twenty_five_items_in_pages_of_ten() {
        let req = |p: &str| PageRequest::parse(Some(p), Some("10")).unwrap();

        let first = req("1").window(25).unwrap();
        assert_eq!((first.offset, first.limit), (0, 10));
        assert_eq!(first.next_link().as_deref(), Some("?page=2&page_size=10"));
        assert_eq!(first.previous_link(), None);

        let third = req("3").window(25).unwrap();
        assert_eq!(third.offset, 20);
        assert_eq!(third.next_link(), None);
        assert!(third.has_previous());

        assert!(req("4").window(25).is_err());
    }

    #[test]
    fn first_page_of_empty_scope_exists() {
        let w = PageRequest::default().window(0).unwrap();
        assert!(!w.has_next() && !w.has_previous());
        assert!(PageRequest::parse(Some("2"), None).unwrap().window(0).is_err());
    }

    #[test]
    fn rejects_non_positive_and_non_numeric() {
        for bad in ["0", "-1", "abc", "1.5", ""] {
            assert!(PageRequest::parse(Some(bad), None).is_err(), "page={bad}");
            assert!(PageRequest::parse(None, Some(bad)).is_err(), "page_size={bad}");
        }
    }

    #[test]
    fn page_size_is_capped() {
        let req = PageRequest::parse(None, Some("5000")).unwrap();
        assert_eq!(req.page_size, MAX_PAGE_SIZE);
    }
}
