/// Normalize a URL for cache keying: strip tracking parameters and fragments
/// that would otherwise split one logical page across multiple cache entries.
pub fn normalize_url(url: &str) -> String {
    const TRACKING_PARAMS: &[&str] = &[
        "fbclid",
        "gclid",
        "msclkid",
        "utm_source",
        "utm_medium",
        "utm_campaign",
        "utm_term",
        "utm_content",
        "mc_cid",
        "mc_eid",
        "ref",
    ];

    let Ok(mut parsed) = url::Url::parse(url.trim()) else {
        return url.trim().to_string();
    };

    parsed.set_fragment(None);

    if parsed.query().is_some() {
        let clean_pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if clean_pairs.is_empty() {
            parsed.set_query(None);
        } else {
            parsed.query_pairs_mut().clear().extend_pairs(clean_pairs);
        }
    }

    parsed.to_string()
}
