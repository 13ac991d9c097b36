use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        ApiResponse {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        MessageResponse {
            success: true,
            message: message.into(),
        }
    }
}

/// Page/limit pair resolved from query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u64 = 20;
    pub const MAX_LIMIT: u64 = 100;
    /// Largest page whose skip still fits a signed 64-bit Mongo offset.
    pub const MAX_PAGE: u64 = i64::MAX as u64 / Self::MAX_LIMIT;

    pub fn new(page: Option<u64>, limit: Option<u64>) -> Self {
        Pagination {
            page: page.unwrap_or(1).clamp(1, Self::MAX_PAGE),
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub success: bool,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
    pub data: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn all(data: Vec<T>) -> Self {
        ListResponse {
            success: true,
            count: data.len(),
            page: None,
            limit: None,
            total: None,
            total_pages: None,
            data,
        }
    }

    pub fn paged(data: Vec<T>, pagination: Pagination, total: u64) -> Self {
        ListResponse {
            success: true,
            count: data.len(),
            page: Some(pagination.page),
            limit: Some(pagination.limit),
            total: Some(total),
            total_pages: Some(pagination.total_pages(total)),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_clamps_and_skips() {
        let p = Pagination::new(Some(3), Some(10));
        assert_eq!(p.skip(), 20);
        assert_eq!(p.total_pages(21), 3);

        let p = Pagination::new(Some(0), Some(10_000));
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, Pagination::MAX_LIMIT);
        assert_eq!(p.total_pages(0), 0);
    }

    #[test]
    fn huge_page_is_capped_without_overflow() {
        let p = Pagination::new(Some(u64::MAX), Some(20));
        assert_eq!(p.page, Pagination::MAX_PAGE);
        assert!(p.skip() <= i64::MAX as u64);

        let p = Pagination::new(Some(u64::MAX), Some(10_000));
        assert!(p.skip() <= i64::MAX as u64);
        assert_eq!(p.total_pages(u64::MAX), u64::MAX.div_ceil(Pagination::MAX_LIMIT));
    }

    #[test]
    fn paged_list_serializes_camel_case_meta() {
        let body = ListResponse::paged(vec![1, 2], Pagination::new(Some(1), Some(2)), 5);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["count"], 2);
        assert_eq!(json["totalPages"], 3);
        assert_eq!(json["success"], true);

        let json = serde_json::to_value(ListResponse::all(vec!["a"])).unwrap();
        assert!(json.get("page").is_none());
    }
}
