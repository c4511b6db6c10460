use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

/// One-based page request, as sent by the admin console.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

impl PageRequest {
    pub fn limit(&self) -> i64 {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        (self.page.unwrap_or(1).max(1) - 1).saturating_mul(self.limit())
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: Some(1),
            page_size: Some(DEFAULT_PAGE_SIZE),
        }
    }
}

/// A page of results together with the unpaged total.
#[derive(Debug, Clone, Serialize)]
pub struct Paged<T> {
    pub list: Vec<T>,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_requests() {
        let req = PageRequest {
            page: Some(0),
            page_size: Some(10_000),
        };
        assert_eq!(req.limit(), MAX_PAGE_SIZE);
        assert_eq!(req.offset(), 0);
    }

    #[test]
    fn offsets_are_one_based() {
        let req = PageRequest {
            page: Some(3),
            page_size: Some(20),
        };
        assert_eq!(req.offset(), 40);
    }

    #[test]
    fn huge_page_numbers_saturate() {
        let req = PageRequest {
            page: Some(i64::MAX),
            page_size: Some(10),
        };
        assert_eq!(req.offset(), i64::MAX);
        let req = PageRequest {
            page: Some(i64::MIN),
            page_size: None,
        };
        assert_eq!(req.offset(), 0);
    }
}
