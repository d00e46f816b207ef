//! Content extraction functionality for the crawler module
//!
//! Turns a fetched HTML document into Markdown and collects the links found in
//! the converted content. Parsing is tolerant: html5ever recovers from almost
//! any markup, so malformed pages still produce output.

use html2md::parse_html;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

use crate::crawler::error::TransformError;
use crate::crawler::links::resolve_link;

/// Markdown and outgoing links extracted from one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
    /// The converted content
    pub markdown: String,

    /// Absolute, normalized link targets in document order without duplicates
    pub links: Vec<Url>,
}

/// Convert a page to Markdown
///
/// # Arguments
///
/// * `html` - The raw HTML of the page
/// * `selector` - Optional CSS selector scoping the converted content
/// * `page_url` - The URL of the page, used to resolve relative links
/// * `strip_selectors` - CSS selectors for elements removed before conversion
///
/// # Returns
///
/// The Markdown and the discovered links, or the reason the page could not
/// be converted
pub fn transform(
    html: &str,
    selector: Option<&str>,
    page_url: &Url,
    strip_selectors: &[String],
) -> Result<Transformed, TransformError> {
    if html.contains('\0') {
        return Err(TransformError::Unparseable(
            "document contains NUL bytes".to_string(),
        ));
    }

    let document = clean_html(html, strip_selectors);

    let selected: Vec<ElementRef> = match selector {
        Some(selector_str) => {
            let selector =
                Selector::parse(selector_str).map_err(|e| TransformError::InvalidSelector {
                    selector: selector_str.to_string(),
                    reason: e.to_string(),
                })?;
            let elements: Vec<ElementRef> = document.select(&selector).collect();
            if elements.is_empty() {
                return Err(TransformError::SelectorNotFound(selector_str.to_string()));
            }
            elements
        }
        None => {
            let body = static_selector("body")?;
            vec![
                document
                    .select(&body)
                    .next()
                    .unwrap_or_else(|| document.root_element()),
            ]
        }
    };

    let fragment = selected
        .iter()
        .map(|element| element.html())
        .collect::<Vec<_>>()
        .join("\n");

    Ok(Transformed {
        markdown: html_to_markdown(&fragment),
        links: extract_links(&selected, page_url)?,
    })
}

/// Parse HTML and detach every element matching one of `strip_selectors`
///
/// Invalid selectors are logged and skipped.
pub fn clean_html(html: &str, strip_selectors: &[String]) -> Html {
    let mut document = Html::parse_document(html);

    for selector_str in strip_selectors {
        let selector = match Selector::parse(selector_str) {
            Ok(selector) => selector,
            Err(e) => {
                warn!("Failed to parse strip selector '{}': {}", selector_str, e);
                continue;
            }
        };

        let ids: Vec<_> = document.select(&selector).map(|element| element.id()).collect();
        for id in ids {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }
    }

    document
}

/// Convert HTML to Markdown
pub fn html_to_markdown(html: &str) -> String {
    parse_html(html).trim().to_string()
}

fn extract_links(elements: &[ElementRef], page_url: &Url) -> Result<Vec<Url>, TransformError> {
    let anchor = static_selector("a[href]")?;
    let mut links: Vec<Url> = Vec::new();

    for element in elements {
        let own = (element.value().name() == "a")
            .then_some(*element)
            .into_iter();
        for a in own.chain(element.select(&anchor)) {
            let Some(href) = a.value().attr("href") else {
                continue;
            };
            if let Some(url) = resolve_link(page_url, href) {
                if !links.contains(&url) {
                    links.push(url);
                }
            }
        }
    }

    Ok(links)
}

fn static_selector(selector: &str) -> Result<Selector, TransformError> {
    Selector::parse(selector)
        .map_err(|e| TransformError::Unparseable(format!("selector '{}': {}", selector, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://a.test/y").unwrap()
    }

    fn defaults() -> Vec<String> {
        vec!["script".to_string(), "style".to_string()]
    }

    #[test]
    fn test_relative_link_round_trip() {
        let html = r#"<html><body><p>See <a href="/x">text</a></p></body></html>"#;
        let out = transform(html, None, &page(), &defaults()).unwrap();

        assert_eq!(out.links, vec![Url::parse("https://a.test/x").unwrap()]);
        assert!(
            out.markdown.contains("[text](/x)") || out.markdown.contains("[text](https://a.test/x)"),
            "unexpected markdown: {}",
            out.markdown
        );
    }

    #[test]
    fn test_structure_is_preserved() {
        let html = r#"
            <html><body>
                <h3>Section</h3>
                <p>Some <em>emphasis</em> and <strong>weight</strong>.</p>
                <ul><li>first</li><li>second</li></ul>
            </body></html>
        "#;
        let out = transform(html, None, &page(), &defaults()).unwrap();

        assert!(out.markdown.contains("### Section"), "{}", out.markdown);
        assert!(out.markdown.contains("*emphasis*"), "{}", out.markdown);
        assert!(out.markdown.contains("**weight**"), "{}", out.markdown);
        assert!(out.markdown.contains("first"));
        assert!(out.markdown.contains("second"));
    }

    #[test]
    fn test_selector_scopes_content_and_links() {
        let html = r#"
            <html><body>
                <nav><a href="/nav-only">Menu</a></nav>
                <article><h1>Title</h1><a href="/docs/a">A</a></article>
            </body></html>
        "#;
        let out = transform(html, Some("article"), &page(), &defaults()).unwrap();

        assert!(out.markdown.contains("Title"));
        assert!(!out.markdown.contains("Menu"));
        assert_eq!(out.links, vec![Url::parse("https://a.test/docs/a").unwrap()]);
    }

    #[test]
    fn test_missing_selector_is_a_transform_error() {
        let html = "<html><body><p>no article here</p></body></html>";
        let err = transform(html, Some("article"), &page(), &defaults()).unwrap_err();
        assert_eq!(err, TransformError::SelectorNotFound("article".to_string()));
    }

    #[test]
    fn test_invalid_selector_is_reported() {
        let err = transform("<p>x</p>", Some("[[["), &page(), &defaults()).unwrap_err();
        assert!(matches!(err, TransformError::InvalidSelector { .. }));
    }

    #[test]
    fn test_scripts_and_styles_are_stripped() {
        let html = r#"
            <html><head><style>body { color: red; }</style></head>
            <body><script>var secret = 1;</script><p>Visible</p></body></html>
        "#;
        let out = transform(html, None, &page(), &defaults()).unwrap();

        assert!(out.markdown.contains("Visible"));
        assert!(!out.markdown.contains("secret"));
        assert!(!out.markdown.contains("color: red"));
    }

    #[test]
    fn test_malformed_html_is_tolerated() {
        let html = "<div><p>unclosed <b>bold <a href='/z'>link</div>";
        let out = transform(html, None, &page(), &defaults()).unwrap();
        assert!(out.markdown.contains("unclosed"));
        assert_eq!(out.links, vec![Url::parse("https://a.test/z").unwrap()]);
    }

    #[test]
    fn test_binary_payload_is_unparseable() {
        let err = transform("\0\0PNG", None, &page(), &defaults()).unwrap_err();
        assert!(matches!(err, TransformError::Unparseable(_)));
    }

    #[test]
    fn test_duplicate_and_anchor_links_are_collapsed() {
        let html = r##"
            <body>
                <a href="/x">one</a>
                <a href="/x#part">two</a>
                <a href="#top">top</a>
                <a href="mailto:a@a.test">mail</a>
                <a href="https://b.test/ext">ext</a>
            </body>
        "##;
        let out = transform(html, None, &page(), &defaults()).unwrap();
        assert_eq!(
            out.links,
            vec![
                Url::parse("https://a.test/x").unwrap(),
                Url::parse("https://b.test/ext").unwrap(),
            ]
        );
    }
}
