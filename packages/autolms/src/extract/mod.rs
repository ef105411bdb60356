//! Page extractors.
//!
//! Each extractor parses one document and always returns a value: rows or
//! sections that do not fit are skipped and noted in the [`ParseReport`],
//! and a structural rule that matched nothing on the whole page is reported
//! once as [`LayoutDrift`].
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

pub mod attachment;
pub mod board;
pub mod course;
pub mod syllabus;

pub use attachment::{extract_attachments, find_content_seq};
pub use board::{
    extract_assignment_list, extract_detail, extract_material_list, extract_notice_list,
};
pub use course::{extract_courses, extract_menu_map, split_course_name};
pub use syllabus::extract_syllabus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    CourseList,
    CourseMenu,
    Syllabus,
    NoticeList,
    MaterialList,
    AssignmentList,
    Detail,
    AttachmentList,
}

/// A structural assumption that matched nothing across a whole page,
/// usually meaning the portal changed its layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutDrift {
    pub page: PageKind,
    pub rule: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseReport {
    pub skipped: Vec<String>,
    pub drift: Vec<LayoutDrift>,
}

impl ParseReport {
    pub(crate) fn skip(&mut self, page: PageKind, reason: String) {
        tracing::warn!(?page, %reason, "Skipping item");
        self.skipped.push(reason);
    }

    pub(crate) fn drift(&mut self, page: PageKind, rule: &'static str) {
        tracing::warn!(target: "layout_drift", ?page, rule, "Nothing on the page matched, has the portal layout changed?");
        self.drift.push(LayoutDrift { page, rule });
    }

    pub fn merge(&mut self, other: ParseReport) {
        self.skipped.extend(other.skipped);
        self.drift.extend(other.drift);
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.drift.is_empty()
    }
}

/// An extractor result together with what had to be left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted<T> {
    pub value: T,
    pub report: ParseReport,
}

impl<T> Extracted<T> {
    pub(crate) fn new(value: T, report: ParseReport) -> Self {
        Self { value, report }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Extracted<U> {
        Extracted {
            value: f(self.value),
            report: self.report,
        }
    }
}

static PAGE_MOVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"pageMove\(\s*(?:'([^']*)'|"([^"]*)")"#).expect("valid pageMove pattern")
});

static ARTICLE_ID: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"\bARTL_NUM=(\d+)").expect("valid ARTL_NUM pattern"),
        Regex::new(r"\bNORCT_NUM=(\d+)").expect("valid NORCT_NUM pattern"),
    ]
});

/// First string argument of a `pageMove(...)` call in an `onclick` value.
pub fn page_move_target(onclick: &str) -> Option<&str> {
    let captures = PAGE_MOVE.captures(onclick)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str())
        .filter(|target| !target.is_empty())
}

/// Numeric `ARTL_NUM`, falling back to `NORCT_NUM`.
pub fn article_id(url: &str) -> Option<String> {
    ARTICLE_ID
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .map(|captures| captures[1].to_string())
}
