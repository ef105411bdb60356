//! Notice, material and assignment boards: list pages and detail pages.
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::{
    model::{DetailRecord, EntryMeta, ListEntry},
    utils::{ElementRefExt as _, absolutize},
};

use super::{Extracted, PageKind, ParseReport, article_id, attachment, page_move_target};

static CLICKABLE_ROW: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"tr[style*="cursor: pointer"]"#).expect("Failed to parse row selector")
});
static TITLE_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.left").expect("Failed to parse title cell selector"));
static CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("Failed to parse cell selector"));
static SUBJECT_TOP: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".subjt_top").expect("Failed to parse subject selector"));
static SUBJECT_BOTTOM_SPAN: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".subjt_bottom span").expect("Failed to parse subject bottom selector")
});
static DATE_CELL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("td.number:last-child").expect("Failed to parse date cell selector")
});
static DOWNLOAD_ICON: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("img.download_icon").expect("Failed to parse download icon selector")
});
static TOPIC_TABLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("table.table_topic").expect("Failed to parse assignment table selector")
});
static ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("Failed to parse row selector"));
static TEXT_VIEWER: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("td.textviewer").expect("Failed to parse text viewer selector")
});
static BBS_VIEW_ROW: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("table.bbsview tr").expect("Failed to parse bbsview selector")
});
static DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("valid digits pattern"));

/// Pinned rows repeated at the top of material boards.
const PINNED_ROW_CLASSES: [&str; 2] = ["gongji", "notitop"];

/// Target URL and article id of a row's `pageMove(...)` navigation.
fn resolve_navigation(onclick: Option<&str>, base: &Url) -> Option<(String, String)> {
    let target = page_move_target(onclick?)?;
    let id = article_id(target)?;
    Some((absolutize(base, target)?, id))
}

/// The cell's wrapper `<div>` when it is the only element inside the cell.
fn sole_div(cell: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let mut children = cell.children().filter_map(ElementRef::wrap);
    let first = children.next()?;
    (first.value().name() == "div" && children.next().is_none()).then_some(first)
}

fn cell_text(cells: &[ElementRef<'_>], index: usize) -> String {
    cells
        .get(index)
        .map(|cell| cell.to_string(""))
        .unwrap_or_default()
}

/// 공지사항 목록. The board lists oldest first, so the result is reversed
/// into newest-first order.
pub fn extract_notice_list(html: &str, base: &Url) -> Extracted<Vec<ListEntry>> {
    let document = Html::parse_document(html);
    let mut report = ParseReport::default();
    let mut rows = 0usize;
    let mut unresolved = 0usize;
    let mut notices = Vec::new();

    for row in document.select(&CLICKABLE_ROW) {
        rows += 1;
        let onclick = row
            .select(&TITLE_CELL)
            .next()
            .and_then(|cell| cell.attr("onclick"));
        let Some((url, article_id)) = resolve_navigation(onclick, base) else {
            // Pinned notices carry no pageMove target.
            if onclick.is_some() {
                unresolved += 1;
            }
            tracing::warn!(row = rows, ?onclick, "Notice row has no resolvable pageMove target");
            continue;
        };
        let cells = row.select(&CELL).collect::<Vec<_>>();
        if cells.len() < 5 {
            report.skip(
                PageKind::NoticeList,
                format!("notice {article_id} has {} cells", cells.len()),
            );
            continue;
        }

        let subject = cells[2];
        let title = subject
            .select(&SUBJECT_TOP)
            .next()
            .map(|div| div.to_string(""))
            .unwrap_or_default();
        let spans = subject.select(&SUBJECT_BOTTOM_SPAN).collect::<Vec<_>>();
        let author = spans.first().map(|span| span.to_string("")).unwrap_or_default();
        let views = spans
            .iter()
            .skip(1)
            .last()
            .and_then(|span| {
                let text = span.to_string("");
                DIGITS.find(&text).and_then(|m| m.as_str().parse().ok())
            })
            .unwrap_or(0);

        notices.push(ListEntry {
            article_id,
            title,
            author,
            date: cell_text(&cells, 4),
            url,
            has_attachment_hint: row.select(&DOWNLOAD_ICON).next().is_some(),
            meta: EntryMeta::Notice {
                number: cell_text(&cells, 0),
                views,
            },
        });
    }

    if unresolved > 0 && notices.is_empty() {
        report.drift(PageKind::NoticeList, "page_move_article_id");
    }

    notices.reverse();
    Extracted::new(notices, report)
}

/// 강의자료 목록
pub fn extract_material_list(html: &str, base: &Url) -> Extracted<Vec<ListEntry>> {
    let document = Html::parse_document(html);
    let mut report = ParseReport::default();
    let mut rows = 0usize;
    let mut materials = Vec::new();

    for row in document.select(&CLICKABLE_ROW) {
        rows += 1;
        if row
            .value()
            .classes()
            .any(|class| PINNED_ROW_CLASSES.contains(&class))
        {
            continue;
        }
        let Some(title_cell) = row.select(&TITLE_CELL).next() else {
            report.skip(
                PageKind::MaterialList,
                format!("material row {rows} has no title cell"),
            );
            continue;
        };
        let Some((url, article_id)) = resolve_navigation(title_cell.attr("onclick"), base) else {
            report.skip(
                PageKind::MaterialList,
                format!("material row {rows} has no resolvable pageMove target"),
            );
            continue;
        };

        materials.push(ListEntry {
            article_id,
            title: title_cell
                .select(&SUBJECT_TOP)
                .next()
                .map(|div| div.to_string(""))
                .unwrap_or_default(),
            author: title_cell
                .select(&SUBJECT_BOTTOM_SPAN)
                .next()
                .map(|span| span.to_string(""))
                .unwrap_or_default(),
            date: row
                .select(&DATE_CELL)
                .next()
                .map(|cell| cell.to_string(""))
                .unwrap_or_default(),
            url,
            has_attachment_hint: row.select(&DOWNLOAD_ICON).next().is_some(),
            meta: EntryMeta::Material,
        });
    }

    if rows > 0 && materials.is_empty() && !report.skipped.is_empty() {
        report.drift(PageKind::MaterialList, "page_move_article_id");
    }
    tracing::debug!(count = materials.len(), "Parsed material list");
    Extracted::new(materials, report)
}

/// 과제 목록. Rows navigate through their own `onclick`.
pub fn extract_assignment_list(html: &str, base: &Url) -> Extracted<Vec<ListEntry>> {
    let document = Html::parse_document(html);
    let mut report = ParseReport::default();

    let Some(table) = document.select(&TOPIC_TABLE).next() else {
        report.drift(PageKind::AssignmentList, "table_topic");
        return Extracted::new(Vec::new(), report);
    };

    let mut rows = 0usize;
    let mut assignments = Vec::new();
    for (index, row) in table.select(&ROW).enumerate().skip(1) {
        let cells = row.select(&CELL).collect::<Vec<_>>();
        if cells.len() < 7 {
            continue;
        }
        rows += 1;
        let Some((url, article_id)) = resolve_navigation(row.attr("onclick"), base) else {
            report.skip(
                PageKind::AssignmentList,
                format!("assignment row {index} has no resolvable pageMove target"),
            );
            continue;
        };
        assignments.push(ListEntry {
            article_id,
            title: cell_text(&cells, 1),
            author: String::new(),
            date: cell_text(&cells, 3),
            url,
            has_attachment_hint: false,
            meta: EntryMeta::Assignment {
                start_date: cell_text(&cells, 3),
                end_date: cell_text(&cells, 4),
                status: cell_text(&cells, 5),
            },
        });
    }

    if rows > 0 && assignments.is_empty() {
        report.drift(PageKind::AssignmentList, "page_move_article_id");
    }
    Extracted::new(assignments, report)
}

/// Detail page of any board: body text, body markup and the attachment
/// anchors present on the page itself.
pub fn extract_detail(
    html: &str,
    article_id: &str,
    base: &Url,
    download_pattern: &str,
) -> Extracted<DetailRecord> {
    let document = Html::parse_document(html);
    let mut report = ParseReport::default();

    let viewer = document
        .select(&TEXT_VIEWER)
        .next()
        .map(|cell| (cell, cell))
        .or_else(|| {
            document
                .select(&BBS_VIEW_ROW)
                .last()
                .and_then(|row| row.select(&CELL).next())
                .map(|cell| (cell, sole_div(cell).unwrap_or(cell)))
        });

    let (content, content_html) = match viewer {
        Some((cell, body)) => (body.normalized_text(), Some(cell.html())),
        None => {
            report.drift(PageKind::Detail, "textviewer");
            (String::new(), None)
        }
    };

    let content_seq = attachment::content_seq_in_document(&document, html);
    let attachments = attachment::scan_anchors(
        &document,
        content_seq.as_deref(),
        base,
        download_pattern,
        &mut report,
    );

    Extracted::new(
        DetailRecord {
            article_id: article_id.to_string(),
            content,
            content_html,
            attachments,
        },
        report,
    )
}
