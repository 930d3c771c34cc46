use url::Url;

/// Canonicalizes a URL for dedup purposes: lowercases scheme/host, strips a
/// trailing slash, drops the fragment, and drops common tracking query
/// parameters (anything starting with `utm_`, plus `fbclid`/`gclid`).
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        let query = kept
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    let mut canonical = url.to_string();
    if canonical.ends_with('/') && url.path() == "/" {
        canonical.pop();
    }
    Some(canonical)
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || key == "fbclid" || key == "gclid"
}

/// Extracts the registrable host (e.g. `example.com` from
/// `https://www.example.com/path`), stripping a leading `www.`.
pub fn registrable_domain(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}
