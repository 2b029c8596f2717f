//! Page-number pagination for list endpoints.
//!
//! Clients pick a page with `page` (1-based, or `last`) and may override the
//! page size with `pageSize`. Responses are wrapped in [`Page`].

use serde::Serialize;
use thiserror::Error;
use url::form_urlencoded;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaginationError {
    #[error("Invalid page.")]
    InvalidPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageNumberPagination {
    pub page_size: i64,
    pub page_query_param: &'static str,
    pub page_size_query_param: &'static str,
    pub last_page_string: &'static str,
}

/// Default policy for every list endpoint.
pub const STANDARD_RESULTS_SET_PAGINATION: PageNumberPagination = PageNumberPagination {
    page_size: 100,
    page_query_param: "page",
    page_size_query_param: "pageSize",
    last_page_string: "last",
};

impl Default for PageNumberPagination {
    fn default() -> Self {
        STANDARD_RESULTS_SET_PAGINATION
    }
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

impl PageNumberPagination {
    /// Falls back to the default unless the override is a positive integer.
    pub fn get_page_size(&self, params: &[(String, String)]) -> i64 {
        param(params, self.page_size_query_param)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(self.page_size)
    }

    pub fn paginate(
        &self,
        params: &[(String, String)],
        count: i64,
    ) -> Result<PageWindow, PaginationError> {
        let size = self.get_page_size(params);
        let num_pages = if count <= 0 { 1 } else { (count - 1) / size + 1 };
        let number = match param(params, self.page_query_param) {
            None => 1,
            Some(v) if v == self.last_page_string => num_pages,
            Some(v) => v.trim().parse::<i64>().map_err(|_| PaginationError::InvalidPage)?,
        };
        if number < 1 || number > num_pages {
            return Err(PaginationError::InvalidPage);
        }
        Ok(PageWindow {
            number,
            size,
            num_pages,
            count,
            page_query_param: self.page_query_param,
        })
    }
}

/// One resolved page of a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: i64,
    pub size: i64,
    pub num_pages: i64,
    pub count: i64,
    page_query_param: &'static str,
}

impl PageWindow {
    pub fn offset(&self) -> i64 {
        (self.number - 1) * self.size
    }

    pub fn limit(&self) -> i64 {
        self.size
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    fn link(&self, base: &str, params: &[(String, String)], page: Option<i64>) -> String {
        let mut ser = form_urlencoded::Serializer::new(String::new());
        for (k, v) in params.iter().filter(|(k, _)| k != self.page_query_param) {
            ser.append_pair(k, v);
        }
        if let Some(page) = page {
            ser.append_pair(self.page_query_param, &page.to_string());
        }
        let query = ser.finish();
        if query.is_empty() {
            base.to_string()
        } else {
            format!("{base}?{query}")
        }
    }

    pub fn next_link(&self, base: &str, params: &[(String, String)]) -> Option<String> {
        self.has_next()
            .then(|| self.link(base, params, Some(self.number + 1)))
    }

    /// The link to page 1 carries no page parameter.
    pub fn previous_link(&self, base: &str, params: &[(String, String)]) -> Option<String> {
        if !self.has_previous() {
            return None;
        }
        let page = self.number - 1;
        Some(self.link(base, params, (page > 1).then_some(page)))
    }

    pub fn into_page<T>(self, base: &str, params: &[(String, String)], results: Vec<T>) -> Page<T> {
        Page {
            count: self.count,
            next: self.next_link(base, params),
            previous: self.previous_link(base, params),
            results,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}
