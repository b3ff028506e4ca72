use axum::http::Uri;
use serde::Serialize;

use crate::store::Page;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Paginated<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(results: Vec<T>, count: i64, page: Page, uri: &Uri) -> Self {
        let pages = (count + page.limit() - 1) / page.limit();
        let number = i64::from(page.number);

        Self {
            count,
            next: (number < pages).then(|| page_link(uri, page.number + 1)),
            previous: (number > 1).then(|| page_link(uri, page.number - 1)),
            results,
        }
    }
}

/// Same path and query, `page` replaced.
fn page_link(uri: &Uri, page: u32) -> String {
    let mut params: Vec<String> = uri
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|param| !param.is_empty() && !param.starts_with("page="))
        .map(str::to_owned)
        .collect();
    params.push(format!("page={page}"));

    format!("{}?{}", uri.path(), params.join("&"))
}

/// Positive integer query value; anything else means "use the default".
pub fn positive(value: &str) -> Option<u32> {
    value.parse().ok().filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn middle_page_links_both_ways() {
        let uri: Uri = "/api/recipes/?tags=lunch&page=2&limit=2".parse().unwrap();

        let page = Paginated::new(vec![1, 2], 5, Page::new(2, 2), &uri);

        assert_eq!(page.next.as_deref(), Some("/api/recipes/?tags=lunch&limit=2&page=3"));
        assert_eq!(page.previous.as_deref(), Some("/api/recipes/?tags=lunch&limit=2&page=1"));
    }

    #[rstest]
    fn single_page_has_no_links() {
        let uri: Uri = "/api/recipes/".parse().unwrap();

        let page = Paginated::new(vec![1], 1, Page::new(1, 6), &uri);

        assert_eq!(page.next, None);
        assert_eq!(page.previous, None);
    }

    #[rstest]
    #[case("3", Some(3))]
    #[case("0", None)]
    #[case("-1", None)]
    #[case("many", None)]
    fn positive_values(#[case] value: &str, #[case] expected: Option<u32>) {
        assert_eq!(positive(value), expected);
    }
}
