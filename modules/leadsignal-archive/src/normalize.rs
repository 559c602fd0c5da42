// Readability extraction: raw HTML in, canonical markdown out.

use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};
use tracing::warn;

use leadsignal_common::{content_hash, normalize_whitespace};

/// Canonical text plus its hash. The hash is computed over the normalized
/// text so cosmetic markup churn does not defeat content dedup.
pub struct NormalizedContent {
    pub text: String,
    pub hash: String,
}

/// Reduce fetched HTML to canonical text: Readability extraction to
/// markdown, then whitespace normalization.
pub fn normalize_content(html: &str, url: &str) -> NormalizedContent {
    let markdown = html_to_markdown(html.as_bytes(), Some(url));
    if markdown.trim().is_empty() && !html.trim().is_empty() {
        warn!(url, "Empty content after Readability extraction");
    }
    let text = normalize_whitespace(&markdown);
    let hash = content_hash(&text);
    NormalizedContent { text, hash }
}

fn html_to_markdown(html: &[u8], url: Option<&str>) -> String {
    let parsed_url = url.and_then(|u| url::Url::parse(u).ok());
    let config = TransformConfig {
        readability: true,
        main_content: true,
        return_format: ReturnFormat::Markdown,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: html,
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };

    transform_content_input(input, &config)
}
