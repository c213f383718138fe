use serde::Deserialize;
use utoipa::IntoParams;

/// Query parameters shared by every paginated listing.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Normalized page window: both values floored at 1, defaults 1/10.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn from_query(query: &PageQuery) -> Self {
        Self {
            page: query.page.unwrap_or(1).max(1),
            limit: query.limit.unwrap_or(10).max(1),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        (total + self.limit - 1) / self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_floors() {
        let page = Page::from_query(&PageQuery::default());
        assert_eq!((page.page, page.limit), (1, 10));

        let page = Page::from_query(&PageQuery {
            page: Some(0),
            limit: Some(-5),
        });
        assert_eq!((page.page, page.limit), (1, 1));
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = Page { page: 1, limit: 10 };
        assert_eq!(page.total_pages(0), 0);
        assert_eq!(page.total_pages(10), 1);
        assert_eq!(page.total_pages(11), 2);
    }
}
