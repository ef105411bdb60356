use std::{collections::BTreeMap, sync::LazyLock};

use scraper::{Html, Selector};

use crate::{
    model::{CourseSummary, MenuCategory, MenuEntry, MenuMap},
    utils::ElementRefExt as _,
};

use super::{Extracted, PageKind, ParseReport};

static COURSE_ROW: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"li[style*="background: url"]"#).expect("Failed to parse course row selector")
});
static COURSE_NAME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("em.sub_open").expect("Failed to parse course name selector"));
static COURSE_TIME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span").expect("Failed to parse course time selector"));
static MENU_ITEM: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("li.course_menu_item").expect("Failed to parse menu item selector")
});
static MENU_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("Failed to parse menu link selector"));

/// Splits `"Algorithms (CS301)"` into name and code at the last `(`.
/// Without parentheses the code is empty.
pub fn split_course_name(full_name: &str) -> (String, String) {
    match full_name.rsplit_once('(') {
        Some((name, code)) => (
            name.trim().to_string(),
            code.trim_matches(|c: char| c == ')' || c.is_whitespace())
                .to_string(),
        ),
        None => (full_name.trim().to_string(), String::new()),
    }
}

/// 메인 페이지의 수강 강좌 목록
pub fn extract_courses(html: &str) -> Extracted<Vec<CourseSummary>> {
    let document = Html::parse_document(html);
    let mut report = ParseReport::default();
    let mut rows = document.select(&COURSE_ROW).peekable();

    if rows.peek().is_none() {
        report.drift(PageKind::CourseList, "course_row");
        return Extracted::new(Vec::new(), report);
    }

    let courses = rows
        .filter_map(|row| {
            let name_elem = row.select(&COURSE_NAME).next()?;
            let Some(id) = name_elem.attr("kj").filter(|id| !id.trim().is_empty()) else {
                report.skip(
                    PageKind::CourseList,
                    format!("course row without kj key: {}", name_elem.to_string("")),
                );
                return None;
            };
            let (name, code) = split_course_name(&name_elem.to_string(""));
            if name.is_empty() {
                report.skip(PageKind::CourseList, format!("course {id} has no name"));
                return None;
            }
            let time = row
                .select(&COURSE_TIME)
                .next()
                .map(|span| span.to_string(""))
                .unwrap_or_default();
            Some(CourseSummary {
                id: id.trim().to_string(),
                name,
                code,
                time,
            })
        })
        .collect::<Vec<_>>();

    tracing::debug!(count = courses.len(), "Parsed course list");
    Extracted::new(courses, report)
}

/// Course submain page → menu map. Menu ids missing from `menu_ids` are ignored.
pub fn extract_menu_map(html: &str, menu_ids: &BTreeMap<String, MenuCategory>) -> Extracted<MenuMap> {
    let document = Html::parse_document(html);
    let mut report = ParseReport::default();
    let mut menu = MenuMap::default();
    let mut seen_items = 0usize;

    for item in document.select(&MENU_ITEM) {
        seen_items += 1;
        let Some(category) = item.attr("id").and_then(|id| menu_ids.get(id)) else {
            continue;
        };
        let Some(link) = item.select(&MENU_LINK).next() else {
            report.skip(
                PageKind::CourseMenu,
                format!("menu item {category:?} has no link"),
            );
            continue;
        };
        menu.insert(
            *category,
            MenuEntry {
                name: link.to_string(""),
                url: link.attr("href").unwrap_or_default().trim().to_string(),
            },
        );
    }

    if seen_items == 0 || menu.is_empty() {
        report.drift(PageKind::CourseMenu, "course_menu_item");
    }
    Extracted::new(menu, report)
}

#[cfg(test)]
mod tests {
    use crate::config::PortalConfig;

    use super::*;

    const MAIN_PAGE: &str = r#"
<ul class="sub_open_list">
  <li style="background: url(/ilos/images/main/bul.gif) no-repeat 0 7px;">
    <em class="sub_open" kj="A2024CS301">Algorithms (CS301)</em>
    <span>월 3-4, 수 3</span>
  </li>
  <li style="background: url(/ilos/images/main/bul.gif) no-repeat 0 7px;">
    <em class="sub_open" kj="A2024SEM">Seminar</em>
  </li>
  <li style="background: url(/ilos/images/main/bul.gif) no-repeat 0 7px;">
    <em class="sub_open">Broken row</em>
  </li>
  <li style="background: url(/ilos/images/main/bul.gif) no-repeat 0 7px;">
    <span>no name element</span>
  </li>
</ul>"#;

    #[test]
    fn split_course_name_with_and_without_code() {
        assert_eq!(
            split_course_name("Algorithms (CS301)"),
            ("Algorithms".to_string(), "CS301".to_string())
        );
        assert_eq!(
            split_course_name("Seminar"),
            ("Seminar".to_string(), String::new())
        );
        assert_eq!(
            split_course_name("Data (Intro) Lab (CS100)"),
            ("Data (Intro) Lab".to_string(), "CS100".to_string())
        );
    }

    #[test]
    fn courses_from_main_page() {
        let Extracted { value, report } = extract_courses(MAIN_PAGE);
        assert_eq!(
            value,
            vec![
                CourseSummary {
                    id: "A2024CS301".to_string(),
                    name: "Algorithms".to_string(),
                    code: "CS301".to_string(),
                    time: "월 3-4, 수 3".to_string(),
                },
                CourseSummary {
                    id: "A2024SEM".to_string(),
                    name: "Seminar".to_string(),
                    code: String::new(),
                    time: String::new(),
                },
            ]
        );
        assert_eq!(report.skipped.len(), 1);
        assert!(report.drift.is_empty());
    }

    #[test]
    fn course_list_drift_when_no_rows() {
        let extracted = extract_courses("<html><body><div id=\"login\"></div></body></html>");
        assert!(extracted.value.is_empty());
        assert_eq!(extracted.report.drift.len(), 1);
        assert_eq!(extracted.report.drift[0].page, PageKind::CourseList);
    }

    #[test]
    fn menu_map_ignores_unknown_ids() {
        let html = r#"
<ul id="course_menu">
  <li class="course_menu_item" id="st_plan"><a href="/ilos/st/course/plan_form.acl">강의계획서</a></li>
  <li class="course_menu_item" id="st_notice"><a href="/ilos/st/course/notice_list_form.acl">공지사항</a></li>
  <li class="course_menu_item" id="st_lecture_material"><a href="/ilos/st/course/lecture_material_list_form.acl">강의자료</a></li>
  <li class="course_menu_item" id="st_report"><a href="/ilos/st/course/report_list_form.acl">과제</a></li>
  <li class="course_menu_item" id="st_survey"><a href="/ilos/st/course/survey_list_form.acl">설문</a></li>
</ul>"#;
        let config = PortalConfig::default();
        let Extracted { value, report } = extract_menu_map(html, &config.menu_ids);
        assert_eq!(value.len(), 4);
        assert_eq!(
            value.get(MenuCategory::Assignment),
            Some(&MenuEntry {
                name: "과제".to_string(),
                url: "/ilos/st/course/report_list_form.acl".to_string(),
            })
        );
        assert_eq!(value.get(MenuCategory::Exam), None);
        assert!(report.is_clean());
    }

    #[test]
    fn menu_map_drift_when_layout_changes() {
        let config = PortalConfig::default();
        let extracted = extract_menu_map(
            r#"<nav><a href="/ilos/st/course/notice_list_form.acl">공지사항</a></nav>"#,
            &config.menu_ids,
        );
        assert!(extracted.value.is_empty());
        assert_eq!(extracted.report.drift.len(), 1);
    }
}
