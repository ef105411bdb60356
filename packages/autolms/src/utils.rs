use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CACHE_CONTROL, CONNECTION, HeaderMap, HeaderValue,
};
use scraper::ElementRef;
use url::Url;

pub(crate) const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36";

pub(crate) fn default_header() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("deflate, br"));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("ko,en;q=0.9,en-US;q=0.8"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers
}

const BLOCK_ELEMENTS: [&str; 7] = ["p", "div", "li", "tr", "h1", "h2", "h3"];

pub(crate) trait ElementRefExt {
    fn to_string(&self, delimiter: &str) -> String;

    /// Text with `<br>` and block boundaries turned into newlines, one
    /// trimmed non-empty line per paragraph.
    fn normalized_text(&self) -> String;
}

impl ElementRefExt for ElementRef<'_> {
    fn to_string(&self, delimiter: &str) -> String {
        self.text()
            .collect::<Vec<_>>()
            .join(delimiter)
            .trim()
            .to_string()
    }

    fn normalized_text(&self) -> String {
        let mut raw = String::new();
        push_text(*self, &mut raw);
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(&text.replace('\u{a0}', " "));
        } else if let Some(child) = ElementRef::wrap(child) {
            match child.value().name() {
                "br" => out.push('\n'),
                "script" | "style" => {}
                name => {
                    push_text(child, out);
                    if BLOCK_ELEMENTS.contains(&name) {
                        out.push('\n');
                    }
                }
            }
        }
    }
}

/// Joins a portal-relative link onto the base URL; absolute links pass through.
pub(crate) fn absolutize(base: &Url, href: &str) -> Option<String> {
    base.join(href.trim()).ok().map(String::from)
}
