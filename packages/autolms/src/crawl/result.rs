use serde::{Serialize, Serializer};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    error::Error,
    extract::{LayoutDrift, ParseReport},
    model::{BoardKind, CourseSummary, CrawledArticle, MenuMap, SyllabusRecord},
};

/// New articles of one board, plus what was left out and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardCrawl {
    pub kind: BoardKind,
    /// Newly seen articles, in list order.
    pub articles: Vec<CrawledArticle>,
    /// Entries the store already had.
    pub known: usize,
    pub skipped: Vec<String>,
    pub drift: Vec<LayoutDrift>,
    /// Set when the list page itself could not be fetched.
    pub error: Option<String>,
}

impl BoardCrawl {
    pub(crate) fn new(kind: BoardKind) -> Self {
        Self {
            kind,
            articles: Vec::new(),
            known: 0,
            skipped: Vec::new(),
            drift: Vec::new(),
            error: None,
        }
    }

    pub(crate) fn absorb(&mut self, report: ParseReport) {
        self.skipped.extend(report.skipped);
        self.drift.extend(report.drift);
    }
}

/// Everything one course crawl produced.
///
/// `failure` holds the error that ended the crawl early (rejected login,
/// a session that expired again after re-login, or cancellation). Boards
/// finished before that point are still in `boards`.
#[derive(Debug, Serialize)]
pub struct CourseCrawl {
    pub course: CourseSummary,
    pub menu: MenuMap,
    pub syllabus: Option<SyllabusRecord>,
    pub boards: Vec<BoardCrawl>,
    /// Boards the course menu does not offer.
    pub unavailable: Vec<BoardKind>,
    pub skipped: Vec<String>,
    pub drift: Vec<LayoutDrift>,
    #[serde(serialize_with = "serialize_failure")]
    pub failure: Option<Error>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub crawled_at: OffsetDateTime,
}

impl CourseCrawl {
    pub(crate) fn new(course: CourseSummary, menu: MenuMap) -> Self {
        Self {
            course,
            menu,
            syllabus: None,
            boards: Vec::new(),
            unavailable: Vec::new(),
            skipped: Vec::new(),
            drift: Vec::new(),
            failure: None,
            crawled_at: OffsetDateTime::now_utc(),
        }
    }

    pub(crate) fn absorb(&mut self, report: ParseReport) {
        self.skipped.extend(report.skipped);
        self.drift.extend(report.drift);
    }

    pub(crate) fn fail(&mut self, err: Error) {
        tracing::error!(course = %self.course.id, "Course crawl stopped: {err}");
        self.failure = Some(err);
    }

    pub fn board(&self, kind: BoardKind) -> Option<&BoardCrawl> {
        self.boards.iter().find(|board| board.kind == kind)
    }

    pub fn new_articles(&self) -> usize {
        self.boards.iter().map(|board| board.articles.len()).sum()
    }

    /// Items dropped anywhere in the crawl. Non-zero means the result may
    /// be incomplete even when `failure` is `None`.
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
            + self
                .boards
                .iter()
                .map(|board| board.skipped.len())
                .sum::<usize>()
    }

    pub fn has_drift(&self) -> bool {
        !self.drift.is_empty() || self.boards.iter().any(|board| !board.drift.is_empty())
    }
}

fn serialize_failure<S>(failure: &Option<Error>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match failure {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

fn serialize_timestamp<S>(timestamp: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let formatted = timestamp
        .format(&Rfc3339)
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&formatted)
}
