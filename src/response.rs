use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema, Clone, PartialEq)]
pub struct Meta {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub total: Option<i64>,
    pub total_pages: Option<i64>,
    pub has_next_page: Option<bool>,
}

impl Meta {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };
        Self {
            page: Some(page),
            per_page: Some(per_page),
            total: Some(total),
            total_pages: Some(total_pages),
            has_next_page: Some(page < total_pages),
        }
    }

    pub fn empty() -> Self {
        Self {
            page: None,
            per_page: None,
            total: None,
            total_pages: None,
            has_next_page: None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub message: String,
    pub data: Option<T>,
    pub meta: Option<Meta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T, meta: Option<Meta>) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
            meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Meta;

    #[test]
    fn meta_reports_page_count_and_next_page() {
        let meta = Meta::new(1, 12, 30);
        assert_eq!(meta.total_pages, Some(3));
        assert_eq!(meta.has_next_page, Some(true));

        let last = Meta::new(3, 12, 30);
        assert_eq!(last.has_next_page, Some(false));

        let empty = Meta::new(1, 12, 0);
        assert_eq!(empty.total_pages, Some(0));
        assert_eq!(empty.has_next_page, Some(false));
    }
}
