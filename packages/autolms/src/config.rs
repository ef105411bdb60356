use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::model::MenuCategory;

/// Everything the crawler assumes about the portal, kept as data so a
/// markup or endpoint change only needs a config update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub base_url: String,

    pub login_path: String,
    pub username_field: String,
    pub password_field: String,
    /// Static fields submitted along with the credentials.
    pub login_extra_fields: Vec<(String, String)>,
    /// Text present only on pages served to a logged-in user.
    pub logged_in_marker: String,
    /// Authenticated-only page used to refresh the logged-in flag.
    pub probe_path: String,

    /// Path of the login form the portal redirects to once a session is gone.
    pub login_form_path: String,
    /// Body fragments that only appear on the "please log in again" page.
    pub expiry_markers: Vec<String>,

    pub course_list_path: String,
    pub course_room_path: String,
    pub course_submain_path: String,
    pub attachment_list_path: String,
    /// Substring identifying attachment download anchors.
    pub download_pattern: String,

    pub request_timeout_secs: u64,
    /// Budget for one detail page plus its attachment listing.
    pub attachment_timeout_secs: u64,

    /// `li.course_menu_item` id → menu category. Ids outside this table are ignored.
    pub menu_ids: BTreeMap<String, MenuCategory>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        let menu_ids = [
            ("st_plan", MenuCategory::Plan),
            ("st_onlineclass", MenuCategory::OnlineLecture),
            ("st_notice", MenuCategory::Notice),
            ("st_lecture_material", MenuCategory::LectureMaterial),
            ("st_attendance", MenuCategory::Attendance),
            ("st_report", MenuCategory::Assignment),
            ("st_teamproject", MenuCategory::TeamProject),
            ("st_exam", MenuCategory::Exam),
        ]
        .into_iter()
        .map(|(id, category)| (id.to_string(), category))
        .collect();

        Self {
            base_url: "https://eclass.seoultech.ac.kr".to_string(),
            login_path: "/ilos/lo/login.acl".to_string(),
            username_field: "usr_id".to_string(),
            password_field: "usr_pwd".to_string(),
            login_extra_fields: vec![("returnURL".to_string(), String::new())],
            logged_in_marker: "/ilos/lo/logout.acl".to_string(),
            probe_path: "/ilos/main/main_form.acl".to_string(),
            login_form_path: "/ilos/main/member/login_form.acl".to_string(),
            expiry_markers: vec![
                "로그인 정보가 없습니다".to_string(),
                "세션이 만료".to_string(),
            ],
            course_list_path: "/ilos/main/main_form.acl".to_string(),
            course_room_path: "/ilos/st/course/eclass_room2.acl".to_string(),
            course_submain_path: "/ilos/st/course/submain_form.acl".to_string(),
            attachment_list_path: "/ilos/co/efile_list.acl".to_string(),
            download_pattern: "efile_download.acl".to_string(),
            request_timeout_secs: 20,
            attachment_timeout_secs: 60,
            menu_ids,
        }
    }
}

impl PortalConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn attachment_timeout(&self) -> Duration {
        Duration::from_secs(self.attachment_timeout_secs)
    }

    /// Whether a response is the portal's login page served in place of
    /// the requested content.
    ///
    /// The portal answers 200 either way, so this sniffs the landing URL and
    /// the body. It is a heuristic; keep every rule for it here.
    pub fn is_session_expired(&self, final_url: &str, body: &str) -> bool {
        final_url.contains(&self.login_form_path)
            || self
                .expiry_markers
                .iter()
                .any(|marker| body.contains(marker.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_menu_table_covers_known_ids() {
        let config = PortalConfig::default();
        assert_eq!(config.menu_ids.len(), 8);
        assert_eq!(config.menu_ids["st_report"], MenuCategory::Assignment);
        assert_eq!(
            config.menu_ids["st_lecture_material"],
            MenuCategory::LectureMaterial
        );
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PortalConfig = serde_json::from_str(
            r#"{ "base_url": "http://127.0.0.1:8080", "request_timeout_secs": 5 }"#,
        )
        .unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:8080");
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.login_path, PortalConfig::default().login_path);
    }

    #[test]
    fn session_expiry_predicate() {
        let config = PortalConfig::default();
        assert!(config.is_session_expired(
            "https://eclass.seoultech.ac.kr/ilos/main/member/login_form.acl",
            "<html></html>"
        ));
        assert!(config.is_session_expired(
            "https://eclass.seoultech.ac.kr/ilos/st/course/notice_list_form.acl",
            "<script>alert('로그인 정보가 없습니다.');</script>"
        ));
        assert!(!config.is_session_expired(
            "https://eclass.seoultech.ac.kr/ilos/st/course/notice_list_form.acl",
            "<table><tr><td>공지</td></tr></table>"
        ));
    }
}
