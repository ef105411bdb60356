use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::{
    model::AttachmentRef,
    utils::{ElementRefExt as _, absolutize},
};

use super::{Extracted, PageKind, ParseReport};

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("Failed to parse anchor selector"));
static SCRIPT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script").expect("Failed to parse script selector"));
static CONTENT_SEQ_INPUT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"input[name="CONTENT_SEQ"]"#).expect("Failed to parse CONTENT_SEQ selector")
});
static FILE_SEQ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"FILE_SEQ=([^&]+)").expect("valid FILE_SEQ pattern"));
static SCRIPT_CONTENT_SEQ: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"CONTENT_SEQ\s*:\s*["']([^"',]+)"#).expect("valid script CONTENT_SEQ pattern")
});
static QUERY_CONTENT_SEQ: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"CONTENT_SEQ=([^&"'\s]+)"#).expect("valid query CONTENT_SEQ pattern")
});

/// `CONTENT_SEQ` of a detail page, looked up in an inline script object,
/// then a hidden form field, then any `CONTENT_SEQ=` query in the markup.
pub fn find_content_seq(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    content_seq_in_document(&document, html)
}

pub(super) fn content_seq_in_document(document: &Html, raw: &str) -> Option<String> {
    document
        .select(&SCRIPT)
        .find_map(|script| {
            let source = script.text().collect::<String>();
            SCRIPT_CONTENT_SEQ
                .captures(&source)
                .map(|captures| captures[1].trim().to_string())
        })
        .or_else(|| {
            document
                .select(&CONTENT_SEQ_INPUT)
                .find_map(|input| input.attr("value"))
                .map(|value| value.trim().to_string())
        })
        .or_else(|| {
            QUERY_CONTENT_SEQ
                .captures(raw)
                .map(|captures| captures[1].to_string())
        })
        .filter(|seq| !seq.is_empty())
}

/// Download anchors of a page. Anchors without a `FILE_SEQ` are skipped.
pub(super) fn scan_anchors(
    document: &Html,
    content_seq: Option<&str>,
    base: &Url,
    download_pattern: &str,
    report: &mut ParseReport,
) -> Vec<AttachmentRef> {
    document
        .select(&ANCHOR)
        .filter_map(|anchor| {
            let href = anchor.attr("href")?;
            if !href.contains(download_pattern) {
                return None;
            }
            let Some(file_seq) = FILE_SEQ.captures(href).map(|c| c[1].to_string()) else {
                report.skip(
                    PageKind::AttachmentList,
                    format!("download link without FILE_SEQ: {href}"),
                );
                return None;
            };
            let Some(download_url) = absolutize(base, href) else {
                report.skip(
                    PageKind::AttachmentList,
                    format!("download link is not a valid URL: {href}"),
                );
                return None;
            };
            Some(AttachmentRef {
                file_seq,
                content_seq: content_seq.map(str::to_string),
                file_name: anchor.to_string(""),
                download_url,
            })
        })
        .collect()
}

/// Attachment listing (the `efile_list` AJAX response, or any page with
/// download anchors) for the given content sequence.
pub fn extract_attachments(
    html: &str,
    content_seq: Option<&str>,
    base: &Url,
    download_pattern: &str,
) -> Extracted<Vec<AttachmentRef>> {
    let document = Html::parse_document(html);
    let mut report = ParseReport::default();
    let attachments = scan_anchors(&document, content_seq, base, download_pattern, &mut report);
    Extracted::new(attachments, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://eclass.seoultech.ac.kr").unwrap()
    }

    #[test]
    fn content_seq_from_script() {
        let html = r#"<script type="text/javascript">
  var params = { ky : "A2024CS301", CONTENT_SEQ : "55", pf_st_flag : "2" };
  $.ajax({ url: "/ilos/co/efile_list.acl", data: params });
</script>
<td class="textviewer">본문</td>"#;
        assert_eq!(find_content_seq(html).as_deref(), Some("55"));
    }

    #[test]
    fn content_seq_from_hidden_input() {
        let html = r#"<form><input type="hidden" name="CONTENT_SEQ" value="abc123"></form>"#;
        assert_eq!(find_content_seq(html).as_deref(), Some("abc123"));
    }

    #[test]
    fn content_seq_missing() {
        assert_eq!(find_content_seq("<td class=\"textviewer\">본문</td>"), None);
    }

    #[test]
    fn attachments_from_listing() {
        let listing = r#"<ul>
  <li><a href="/ilos/co/efile_download.acl?FILE_SEQ=9&amp;CONTENT_SEQ=55">1주차.pdf</a> (1.2MB)</li>
  <li><a href="javascript:void(0)">미리보기</a></li>
</ul>"#;
        let Extracted { value, report } =
            extract_attachments(listing, Some("55"), &base(), "efile_download.acl");
        assert_eq!(
            value,
            vec![AttachmentRef {
                file_seq: "9".to_string(),
                content_seq: Some("55".to_string()),
                file_name: "1주차.pdf".to_string(),
                download_url:
                    "https://eclass.seoultech.ac.kr/ilos/co/efile_download.acl?FILE_SEQ=9&CONTENT_SEQ=55"
                        .to_string(),
            }]
        );
        assert!(report.is_clean());
    }
}
