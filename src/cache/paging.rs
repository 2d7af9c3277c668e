//! Pagination over catalog snapshots
//!
//! Regular pages are stable slices of the stored order. Slideshow pages come
//! from a fresh uniform shuffle of the whole collection on every request.

use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use super::types::Items;
use crate::error::CatalogError;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const DEFAULT_SLIDESHOW_SIZE: usize = 5;

/// How slideshow requests treat the page number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlideshowPaging {
    /// Every page returns the head of a fresh shuffle
    #[default]
    FirstPage,
    /// Page N returns the N-th slideshow-sized window of a fresh shuffle
    Sequential,
}

impl FromStr for SlideshowPaging {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first-page" => Ok(SlideshowPaging::FirstPage),
            "sequential" => Ok(SlideshowPaging::Sequential),
            other => Err(CatalogError::InvalidArgument(format!(
                "slideshow paging must be 'first-page' or 'sequential', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for SlideshowPaging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlideshowPaging::FirstPage => f.write_str("first-page"),
            SlideshowPaging::Sequential => f.write_str("sequential"),
        }
    }
}

/// Response body for item counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCount {
    pub item_count: usize,
    pub total_pages: usize,
}

/// Coerce a raw page parameter to a 1-based page number.
///
/// Anything that is not a positive integer is page 1. Positive numbers too
/// large for `usize` saturate, so they land past the last page.
pub fn parse_page(raw: Option<&str>) -> usize {
    let Some(value) = raw.map(str::trim) else {
        return 1;
    };
    let digits = value.strip_prefix('+').unwrap_or(value);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return 1;
    }
    match digits.parse::<usize>() {
        Ok(0) => 1,
        Ok(page) => page,
        // only overflow is left once the input is all digits
        Err(_) => usize::MAX,
    }
}

/// Items `[(page-1)*size, page*size)`, empty when out of range
pub fn page_slice<T: Clone>(items: &[T], page: usize, size: usize) -> Vec<T> {
    let start = page.saturating_sub(1).saturating_mul(size);
    if size == 0 || start >= items.len() {
        return Vec::new();
    }
    let end = start.saturating_add(size).min(items.len());
    items[start..end].to_vec()
}

pub fn total_pages(count: usize, size: usize) -> usize {
    if size == 0 {
        return 0;
    }
    count.div_ceil(size)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    pub page_size: usize,
    pub slideshow_size: usize,
    pub slideshow_paging: SlideshowPaging,
}

impl Default for Pager {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            slideshow_size: DEFAULT_SLIDESHOW_SIZE,
            slideshow_paging: SlideshowPaging::default(),
        }
    }
}

impl Pager {
    pub fn count(&self, count: usize) -> ItemCount {
        ItemCount {
            item_count: count,
            total_pages: total_pages(count, self.page_size),
        }
    }

    pub fn page<T: Clone>(&self, items: &[T], page: usize) -> Vec<T> {
        page_slice(items, page, self.page_size)
    }

    /// Shuffle the whole collection, then take the slideshow window for `page`
    pub fn slideshow<T: Clone, R: Rng + ?Sized>(&self, items: &[T], page: usize, rng: &mut R) -> Vec<T> {
        let mut shuffled = items.to_vec();
        shuffled.shuffle(rng);
        let page = match self.slideshow_paging {
            SlideshowPaging::FirstPage => 1,
            SlideshowPaging::Sequential => page,
        };
        page_slice(&shuffled, page, self.slideshow_size)
    }

    /// Page a snapshot, shuffled when `slideshow` is set
    pub fn paginate(&self, items: Items, page: usize, slideshow: bool) -> Items {
        let mut rng = rand::thread_rng();
        match items {
            Items::Recipes(all) if slideshow => Items::Recipes(self.slideshow(&all, page, &mut rng)),
            Items::Recipes(all) => Items::Recipes(self.page(&all, page)),
            Items::Pictures(all) if slideshow => Items::Pictures(self.slideshow(&all, page, &mut rng)),
            Items::Pictures(all) => Items::Pictures(self.page(&all, page)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_parse_page_coerces_bad_input() {
        assert_eq!(parse_page(None), 1);
        assert_eq!(parse_page(Some("3")), 3);
        assert_eq!(parse_page(Some(" 2 ")), 2);
        assert_eq!(parse_page(Some("0")), 1);
        assert_eq!(parse_page(Some("-4")), 1);
        assert_eq!(parse_page(Some("two")), 1);
        assert_eq!(parse_page(Some("")), 1);
        assert_eq!(parse_page(Some("+")), 1);
        assert_eq!(parse_page(Some("1.5")), 1);
    }

    #[test]
    fn test_parse_page_overflow_is_out_of_range() {
        let page = parse_page(Some("99999999999999999999"));
        assert_eq!(page, usize::MAX);
        assert!(page_slice(&[1, 2, 3], page, DEFAULT_PAGE_SIZE).is_empty());
        assert_eq!(parse_page(Some("-99999999999999999999")), 1);
    }

    #[test]
    fn test_pages_partition_collection() {
        for size in 1..=7usize {
            for len in 0..=23usize {
                let items: Vec<usize> = (0..len).collect();
                let pages = total_pages(len, size);
                let mut seen = Vec::new();
                for page in 1..=pages {
                    let slice = page_slice(&items, page, size);
                    assert!(!slice.is_empty());
                    assert!(slice.len() <= size);
                    seen.extend(slice);
                }
                assert_eq!(seen, items, "size={size} len={len}");
                assert!(page_slice(&items, pages + 1, size).is_empty());
            }
        }
    }

    #[test]
    fn test_huge_page_is_empty() {
        let items = vec![1, 2, 3];
        assert!(page_slice(&items, usize::MAX, 10).is_empty());
    }

    #[test]
    fn test_count_empty_collection() {
        let pager = Pager::default();
        assert_eq!(pager.count(0), ItemCount { item_count: 0, total_pages: 0 });
        assert_eq!(pager.count(21), ItemCount { item_count: 21, total_pages: 3 });
    }

    #[test]
    fn test_slideshow_empty_collection() {
        let pager = Pager::default();
        let mut rng = StdRng::seed_from_u64(7);
        let empty: Vec<u32> = Vec::new();
        assert!(pager.slideshow(&empty, 1, &mut rng).is_empty());
        assert!(pager.slideshow(&empty, 4, &mut rng).is_empty());
    }

    #[test]
    fn test_slideshow_returns_distinct_subset() {
        let pager = Pager::default();
        let mut rng = StdRng::seed_from_u64(42);
        let items: Vec<u32> = (0..20).collect();

        let picked = pager.slideshow(&items, 1, &mut rng);
        assert_eq!(picked.len(), DEFAULT_SLIDESHOW_SIZE);
        let unique: HashSet<_> = picked.iter().collect();
        assert_eq!(unique.len(), picked.len());
        assert!(picked.iter().all(|item| items.contains(item)));
    }

    #[test]
    fn test_slideshow_first_page_policy_ignores_page() {
        let pager = Pager::default();
        let items: Vec<u32> = (0..20).collect();

        let first = pager.slideshow(&items, 1, &mut StdRng::seed_from_u64(3));
        let later = pager.slideshow(&items, 3, &mut StdRng::seed_from_u64(3));
        assert_eq!(first, later);
    }

    #[test]
    fn test_slideshow_sequential_policy_windows() {
        let pager = Pager {
            slideshow_paging: SlideshowPaging::Sequential,
            ..Pager::default()
        };
        let items: Vec<u32> = (0..12).collect();

        let third = pager.slideshow(&items, 3, &mut StdRng::seed_from_u64(9));
        assert_eq!(third.len(), 2);
        assert!(pager.slideshow(&items, 4, &mut StdRng::seed_from_u64(9)).is_empty());
    }

    #[test]
    fn test_paginate_keeps_kind() {
        let pager = Pager { page_size: 2, ..Pager::default() };
        let page = pager.paginate(Items::Pictures(Vec::new()), 1, false);
        assert_eq!(page, Items::Pictures(Vec::new()));
    }

    #[test]
    fn test_slideshow_paging_parse() {
        assert_eq!("first-page".parse::<SlideshowPaging>().unwrap(), SlideshowPaging::FirstPage);
        assert_eq!("sequential".parse::<SlideshowPaging>().unwrap(), SlideshowPaging::Sequential);
        assert!("random".parse::<SlideshowPaging>().is_err());
    }
}
