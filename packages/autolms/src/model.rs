use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A course as listed on the portal's main page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSummary {
    /// The portal's opaque course key (`KJKEY`).
    pub id: String,
    pub name: String,
    pub code: String,
    pub time: String,
}

/// Logical entries of a course menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuCategory {
    Plan,
    OnlineLecture,
    Notice,
    LectureMaterial,
    Attendance,
    Assignment,
    TeamProject,
    Exam,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub name: String,
    pub url: String,
}

/// Per-course mapping from menu category to that course's navigation link.
///
/// A missing category means the course does not offer it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MenuMap(BTreeMap<MenuCategory, MenuEntry>);

impl MenuMap {
    pub fn get(&self, category: MenuCategory) -> Option<&MenuEntry> {
        self.0.get(&category)
    }

    pub fn insert(&mut self, category: MenuCategory, entry: MenuEntry) {
        self.0.insert(category, entry);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MenuCategory, &MenuEntry)> {
        self.0.iter()
    }
}

/// Content boards whose posts are crawled article by article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardKind {
    Notice,
    Material,
    Assignment,
}

impl BoardKind {
    pub const ALL: [BoardKind; 3] = [BoardKind::Notice, BoardKind::Material, BoardKind::Assignment];

    pub fn menu_category(self) -> MenuCategory {
        match self {
            BoardKind::Notice => MenuCategory::Notice,
            BoardKind::Material => MenuCategory::LectureMaterial,
            BoardKind::Assignment => MenuCategory::Assignment,
        }
    }
}

/// Fields only some boards show in their list rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryMeta {
    Notice {
        number: String,
        views: u32,
    },
    Material,
    Assignment {
        start_date: String,
        end_date: String,
        status: String,
    },
}

/// One row of a board list page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    /// `ARTL_NUM` / `NORCT_NUM` of the row; unique per course and board.
    pub article_id: String,
    pub title: String,
    pub author: String,
    pub date: String,
    /// Absolute URL of the detail page.
    pub url: String,
    pub has_attachment_hint: bool,
    pub meta: EntryMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub file_seq: String,
    pub content_seq: Option<String>,
    pub file_name: String,
    pub download_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailRecord {
    pub article_id: String,
    pub content: String,
    pub content_html: Option<String>,
    pub attachments: Vec<AttachmentRef>,
}

/// A newly discovered post: its list row and its detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawledArticle {
    pub entry: ListEntry,
    pub detail: DetailRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyPlan {
    pub week: String,
    pub content: String,
    pub note: String,
}

/// 강의계획서
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyllabusRecord {
    /// `[수업기본정보]`
    pub basic_info: IndexMap<String, String>,
    /// `[담당교수정보]`
    pub instructor_info: IndexMap<String, String>,
    /// `[강의계획]`
    pub plan_info: IndexMap<String, String>,
    /// `[주별강의계획]`
    pub weekly_plans: Vec<WeeklyPlan>,
}
