// Query-string remapping for proxied JSON requests.

use url::form_urlencoded;

/// Applies the backend pagination conventions to an inbound query string:
/// `page` defaults to 1, `limit` is renamed `page_size` (default 25),
/// `search` passes through only when non-empty, every other key passes
/// through verbatim.
pub fn remap_query(raw: Option<&str>) -> String {
    let mut page: Option<String> = None;
    let mut page_size: Option<String> = None;
    let mut search: Option<String> = None;
    let mut filters: Vec<(String, String)> = Vec::new();

    if let Some(raw) = raw {
        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            match key.as_ref() {
                "page" => page = Some(value.into_owned()),
                "limit" => page_size = Some(value.into_owned()),
                "search" => search = Some(value.into_owned()),
                _ => filters.push((key.into_owned(), value.into_owned())),
            }
        }
    }

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    serializer.append_pair("page", page.as_deref().unwrap_or("1"));
    serializer.append_pair("page_size", page_size.as_deref().unwrap_or("25"));
    if let Some(search) = search.filter(|s| !s.is_empty()) {
        serializer.append_pair("search", &search);
    }
    for (key, value) in &filters {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}
