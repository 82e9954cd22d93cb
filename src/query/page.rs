use std::cmp::Ordering;

use serde::Serialize;

use crate::error::ValidationError;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 1000;

/// Zero-based page coordinates, validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
}

impl PageRequest {
    pub fn new(page: i64, size: i64) -> Result<Self, ValidationError> {
        let mut errors = ValidationError::default();
        if page < 0 {
            errors.push("page", "Page must be >= 0");
        }
        if !(1..=MAX_PAGE_SIZE).contains(&size) {
            errors.push("size", format!("Size must be between 1 and {MAX_PAGE_SIZE}"));
        }
        errors.into_result()?;
        Ok(Self {
            page: page as usize,
            size: size as usize,
        })
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE as usize,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    /// `ASC` in any case is ascending; anything else is descending.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }

    pub fn apply(self, ord: Ordering) -> Ordering {
        match self {
            Self::Asc => ord,
            Self::Desc => ord.reverse(),
        }
    }
}

/// One page of results plus the metadata a table UI needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total_elements: u64,
    pub total_pages: u64,
    pub first: bool,
    pub last: bool,
}

impl<T> Page<T> {
    /// Cut `page` out of the already ordered `items`.
    pub fn slice(items: Vec<T>, page: PageRequest) -> Self {
        let total = items.len() as u64;
        let size = page.size.max(1) as u64;
        let total_pages = total.div_ceil(size);
        let content = items
            .into_iter()
            .skip(page.page.saturating_mul(page.size))
            .take(page.size)
            .collect();
        Self {
            content,
            page: page.page,
            size: page.size,
            total_elements: total,
            total_pages,
            first: page.page == 0,
            last: page.page as u64 + 1 >= total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            first: self.first,
            last: self.last,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_rows_two_per_page() {
        let page = Page::slice((1..=5).collect(), PageRequest::new(0, 2).unwrap());
        assert_eq!(page.content, vec![1, 2]);
        assert_eq!(page.total_elements, 5);
        assert_eq!(page.total_pages, 3);
        assert!(page.first);
        assert!(!page.last);

        let tail = Page::slice((1..=5).collect(), PageRequest::new(2, 2).unwrap());
        assert_eq!(tail.content, vec![5]);
        assert!(!tail.first);
        assert!(tail.last);
    }

    #[test]
    fn empty_and_past_the_end_pages() {
        let empty = Page::<u8>::slice(vec![], PageRequest::default());
        assert_eq!(empty.total_pages, 0);
        assert!(empty.first && empty.last);

        let beyond = Page::slice(vec![1, 2, 3], PageRequest::new(7, 2).unwrap());
        assert!(beyond.content.is_empty());
        assert!(beyond.last);
    }

    #[test]
    fn bad_coordinates_are_field_errors() {
        let err = PageRequest::new(-1, 0).unwrap_err();
        assert!(err.fields.contains_key("page"));
        assert!(err.fields.contains_key("size"));
        assert!(PageRequest::new(0, 1001).is_err());
        assert!(PageRequest::new(0, 1000).is_ok());
    }

    #[test]
    fn direction_falls_back_to_desc() {
        assert_eq!(SortDirection::parse("asc"), SortDirection::Asc);
        assert_eq!(SortDirection::parse("ASC"), SortDirection::Asc);
        assert_eq!(SortDirection::parse("DESC"), SortDirection::Desc);
        assert_eq!(SortDirection::parse("sideways"), SortDirection::Desc);
    }
}
