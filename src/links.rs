//! Encyclopedia article links for species names.

/// Default article base for the French-language encyclopedia.
pub const DEFAULT_ARTICLE_BASE: &str = "https://fr.wikipedia.org/wiki/";

/// Turn a scientific name into an article slug: runs of whitespace become `_`.
pub fn article_slug(sci_name: &str) -> String {
    sci_name.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Build the article URL for a species, or None for an empty name.
pub fn encyclopedia_article_url(base: &str, sci_name: &str) -> Option<String> {
    let name = sci_name.trim();
    if name.is_empty() {
        return None;
    }
    Some(format!("{}{}", base, urlencoding::encode(&article_slug(name))))
}
