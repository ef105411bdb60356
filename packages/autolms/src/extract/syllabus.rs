use std::{collections::HashSet, sync::LazyLock};

use indexmap::IndexMap;
use scraper::{ElementRef, Html, Selector};

use crate::{
    model::{SyllabusRecord, WeeklyPlan},
    utils::ElementRefExt as _,
};

use super::{Extracted, PageKind, ParseReport};

/// Bold section headers and tables, in document order.
static HEADER_OR_TABLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"div[style*="font-weight: bold"], table"#)
        .expect("Failed to parse syllabus section selector")
});
static ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("Failed to parse row selector"));
static KEY_VALUE_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th, td").expect("Failed to parse cell selector"));
static CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("Failed to parse cell selector"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    BasicInfo,
    Instructor,
    Plan,
    Weekly,
}

impl Section {
    const ALL: [Section; 4] = [
        Section::BasicInfo,
        Section::Instructor,
        Section::Plan,
        Section::Weekly,
    ];

    fn title(self) -> &'static str {
        match self {
            Section::BasicInfo => "[수업기본정보]",
            Section::Instructor => "[담당교수정보]",
            Section::Plan => "[강의계획]",
            Section::Weekly => "[주별강의계획]",
        }
    }

    fn from_header(text: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|section| text.contains(section.title()))
    }
}

/// 강의계획서. Each known section header is paired with the first table
/// after it.
pub fn extract_syllabus(html: &str) -> Extracted<SyllabusRecord> {
    let document = Html::parse_document(html);
    let mut report = ParseReport::default();
    let mut syllabus = SyllabusRecord::default();
    let mut pending: Option<Section> = None;
    let mut matched_sections = 0usize;

    for element in document.select(&HEADER_OR_TABLE) {
        if element.value().name() == "table" {
            let Some(section) = pending.take() else {
                continue;
            };
            match section {
                Section::BasicInfo => key_values(element, &mut syllabus.basic_info),
                Section::Instructor => key_values(element, &mut syllabus.instructor_info),
                Section::Plan => key_values(element, &mut syllabus.plan_info),
                Section::Weekly => weekly_plans(element, &mut syllabus.weekly_plans),
            }
        } else if let Some(section) = Section::from_header(&element.to_string("")) {
            matched_sections += 1;
            pending = Some(section);
        }
    }

    if let Some(section) = pending {
        report.skip(
            PageKind::Syllabus,
            format!("section {} has no table", section.title()),
        );
    }
    if matched_sections == 0 {
        report.drift(PageKind::Syllabus, "syllabus_section_header");
    }
    Extracted::new(syllabus, report)
}

/// Two-column rows as key/value pairs; later duplicate keys win.
fn key_values(table: ElementRef<'_>, info: &mut IndexMap<String, String>) {
    for row in table.select(&ROW) {
        let cells = row.select(&KEY_VALUE_CELL).collect::<Vec<_>>();
        if let [key, value, ..] = cells.as_slice() {
            info.insert(key.to_string(""), value.to_string(""));
        }
    }
}

/// Rows after the header as (week, content, note).
///
/// A week label already seen in this table is dropped. The portal repeats
/// rows through layout artifacts, but this can also hide a legitimate
/// multi-part week; it is a known approximation.
fn weekly_plans(table: ElementRef<'_>, plans: &mut Vec<WeeklyPlan>) {
    let mut seen_weeks = HashSet::new();
    for row in table.select(&ROW).skip(1) {
        let cells = row.select(&CELL).collect::<Vec<_>>();
        let [week, content, note, ..] = cells.as_slice() else {
            continue;
        };
        let week = week.to_string("");
        let content = content.to_string("");
        if week.is_empty() || content.is_empty() || !seen_weeks.insert(week.clone()) {
            continue;
        }
        plans.push(WeeklyPlan {
            week,
            content,
            note: note.to_string(""),
        });
    }
}
