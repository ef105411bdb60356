//! Course crawl orchestration.
//!
//! A [`CourseCrawler`] owns one portal identity. It enters a course, reads
//! its menu, and walks the notice, material and assignment boards, keeping
//! only articles the [`ArticleStore`] has not seen.
use std::{fmt, sync::Arc};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    config::PortalConfig,
    error::{Error, Result},
    extract::{
        Extracted, extract_assignment_list, extract_attachments, extract_courses, extract_detail,
        extract_material_list, extract_menu_map, extract_notice_list, extract_syllabus,
        find_content_seq,
    },
    model::{
        BoardKind, CourseSummary, CrawledArticle, DetailRecord, ListEntry, MenuCategory, MenuMap,
        SyllabusRecord,
    },
    session::Portal,
    store::ArticleStore,
};

mod result;

pub use result::{BoardCrawl, CourseCrawl};

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A request the crawler may replay once after logging in again.
#[derive(Debug, Clone, Copy)]
enum PortalRequest<'a> {
    Get(&'a str),
    Post(&'a str, &'a [(&'a str, &'a str)]),
}

impl PortalRequest<'_> {
    fn url(&self) -> &str {
        match self {
            PortalRequest::Get(url) | PortalRequest::Post(url, _) => url,
        }
    }
}

pub struct CourseCrawler<P, S> {
    portal: P,
    store: S,
    config: Arc<PortalConfig>,
    base: Url,
    credentials: Credentials,
    /// Held for the duration of every public operation: one identity, one
    /// request at a time.
    identity: Mutex<()>,
}

impl<P: Portal, S: ArticleStore> CourseCrawler<P, S> {
    pub fn new(
        portal: P,
        store: S,
        config: Arc<PortalConfig>,
        credentials: Credentials,
    ) -> Result<Self> {
        let base = Url::parse(&config.base_url)?;
        Ok(Self {
            portal,
            store,
            config,
            base,
            credentials,
            identity: Mutex::new(()),
        })
    }

    pub fn portal(&self) -> &P {
        &self.portal
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    async fn login(&self) -> Result<()> {
        let Credentials { username, password } = &self.credentials;
        if self.portal.login(username, password).await? {
            Ok(())
        } else {
            Err(Error::AuthenticationFailed(username.clone()))
        }
    }

    async fn ensure_login(&self) -> Result<()> {
        if self.portal.is_logged_in().await? {
            return Ok(());
        }
        self.login().await
    }

    async fn send(&self, request: PortalRequest<'_>) -> Result<String> {
        match request {
            PortalRequest::Get(url) => self.portal.get(url).await,
            PortalRequest::Post(url, form) => self.portal.post(url, form).await,
        }
    }

    /// Sends `request`; if the session turns out to be gone, logs in again
    /// and replays the same request exactly once.
    async fn request(&self, request: PortalRequest<'_>) -> Result<String> {
        match self.send(request).await {
            Err(err) if err.is_session_expired() => {
                tracing::warn!(url = request.url(), "Session expired, logging in again");
                self.login().await?;
                self.send(request).await
            }
            other => other,
        }
    }

    /// Courses listed on the portal main page.
    pub async fn courses(&self) -> Result<Extracted<Vec<CourseSummary>>> {
        let _identity = self.identity.lock().await;
        self.ensure_login().await?;
        let html = self
            .request(PortalRequest::Get(&self.config.course_list_path))
            .await?;
        Ok(extract_courses(&html))
    }

    /// Enters the course room and reads the course menu.
    pub async fn enter_course(&self, course_id: &str) -> Result<Extracted<MenuMap>> {
        let _identity = self.identity.lock().await;
        self.ensure_login().await?;
        self.enter_course_locked(course_id).await
    }

    async fn enter_course_locked(&self, course_id: &str) -> Result<Extracted<MenuMap>> {
        let form = [
            ("KJKEY", course_id),
            ("returnData", "json"),
            ("encoding", "utf-8"),
        ];
        self.request(PortalRequest::Post(&self.config.course_room_path, &form))
            .await?;
        let html = self
            .request(PortalRequest::Get(&self.config.course_submain_path))
            .await?;
        Ok(extract_menu_map(&html, &self.config.menu_ids))
    }

    /// The course syllabus, or `None` when the course has no plan menu.
    pub async fn syllabus(
        &self,
        course: &CourseSummary,
    ) -> Result<Option<Extracted<SyllabusRecord>>> {
        let _identity = self.identity.lock().await;
        self.ensure_login().await?;
        let menu = self.enter_course_locked(&course.id).await?.value;
        self.syllabus_locked(&menu).await
    }

    async fn syllabus_locked(&self, menu: &MenuMap) -> Result<Option<Extracted<SyllabusRecord>>> {
        let Some(plan) = menu.get(MenuCategory::Plan) else {
            return Ok(None);
        };
        let html = self.request(PortalRequest::Get(&plan.url)).await?;
        Ok(Some(extract_syllabus(&html)))
    }

    /// Crawls one course: syllabus, then every board the menu offers.
    ///
    /// Returns `Err` only when nothing could be collected (cancelled before
    /// start, login rejected, course menu unreachable). Later fatal errors
    /// end the crawl but are reported in [`CourseCrawl::failure`] alongside
    /// the boards collected so far.
    #[tracing::instrument(skip(self, course, cancel), fields(course = %course.id))]
    pub async fn crawl_course(
        &self,
        course: &CourseSummary,
        cancel: &CancellationToken,
    ) -> Result<CourseCrawl> {
        let _identity = self.identity.lock().await;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.ensure_login().await?;

        let Extracted { value: menu, report } = self.enter_course_locked(&course.id).await?;
        let mut crawl = CourseCrawl::new(course.clone(), menu);
        crawl.absorb(report);

        match self.syllabus_locked(&crawl.menu).await {
            Ok(Some(Extracted { value, report })) => {
                crawl.absorb(report);
                crawl.syllabus = Some(value);
            }
            Ok(None) => tracing::debug!("Course has no syllabus menu"),
            Err(err) if err.is_fatal() => {
                crawl.fail(err);
                return Ok(crawl);
            }
            Err(err) => {
                tracing::warn!("Failed to fetch syllabus: {err}");
                crawl.skipped.push(format!("syllabus: {err}"));
            }
        }

        for kind in BoardKind::ALL {
            if cancel.is_cancelled() {
                crawl.fail(Error::Cancelled);
                break;
            }
            let Some(list_url) = crawl
                .menu
                .get(kind.menu_category())
                .map(|entry| entry.url.clone())
            else {
                tracing::debug!(?kind, "Board not offered by this course");
                crawl.unavailable.push(kind);
                continue;
            };

            let mut board = BoardCrawl::new(kind);
            let outcome = self
                .crawl_board(&mut board, &course.id, &list_url, cancel)
                .await;
            crawl.boards.push(board);
            if let Err(err) = outcome {
                crawl.fail(err);
                break;
            }
        }

        tracing::info!(
            new = crawl.new_articles(),
            skipped = crawl.skipped_count(),
            drift = crawl.has_drift(),
            "Course crawl finished"
        );
        Ok(crawl)
    }

    /// Fills `board` with the new articles of one list page. Only fatal
    /// errors are returned; everything else is recorded on the board.
    async fn crawl_board(
        &self,
        board: &mut BoardCrawl,
        course_id: &str,
        list_url: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let html = match self.request(PortalRequest::Get(list_url)).await {
            Ok(html) => html,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::warn!(kind = ?board.kind, "Failed to fetch list page: {err}");
                board.error = Some(err.to_string());
                return Ok(());
            }
        };

        let Extracted { value: entries, report } = match board.kind {
            BoardKind::Notice => extract_notice_list(&html, &self.base),
            BoardKind::Material => extract_material_list(&html, &self.base),
            BoardKind::Assignment => extract_assignment_list(&html, &self.base),
        };
        board.absorb(report);

        for entry in entries {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match self
                .store
                .exists(board.kind, course_id, &entry.article_id)
                .await
            {
                Ok(true) => {
                    board.known += 1;
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(article_id = %entry.article_id, "Existence check failed: {err}");
                    board
                        .skipped
                        .push(format!("article {}: {err}", entry.article_id));
                    continue;
                }
            }

            let detail = match board.kind {
                BoardKind::Material => self.material_detail(course_id, &entry).await,
                BoardKind::Notice | BoardKind::Assignment => self.detail(&entry).await,
            };
            match detail {
                Ok(Extracted { value, report }) => {
                    board.absorb(report);
                    tracing::info!(
                        target: "content_update",
                        course = course_id,
                        kind = ?board.kind,
                        article_id = %entry.article_id,
                        title = %entry.title,
                        attachments = value.attachments.len(),
                        "New article"
                    );
                    board.articles.push(CrawledArticle {
                        entry,
                        detail: value,
                    });
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    tracing::warn!(article_id = %entry.article_id, "Failed to fetch detail: {err}");
                    board
                        .skipped
                        .push(format!("article {}: {err}", entry.article_id));
                }
            }
        }
        Ok(())
    }

    async fn detail(&self, entry: &ListEntry) -> Result<Extracted<DetailRecord>> {
        let html = self.request(PortalRequest::Get(&entry.url)).await?;
        Ok(extract_detail(
            &html,
            &entry.article_id,
            &self.base,
            &self.config.download_pattern,
        ))
    }

    /// Detail page and attachment listing of a material, as one unit under
    /// its own timeout. If either step fails the entry contributes nothing.
    async fn material_detail(
        &self,
        course_id: &str,
        entry: &ListEntry,
    ) -> Result<Extracted<DetailRecord>> {
        tokio::time::timeout(
            self.config.attachment_timeout(),
            self.resolve_material(course_id, entry),
        )
        .await
        .map_err(|_| Error::Timeout {
            url: entry.url.clone(),
        })?
    }

    async fn resolve_material(
        &self,
        course_id: &str,
        entry: &ListEntry,
    ) -> Result<Extracted<DetailRecord>> {
        let html = self.request(PortalRequest::Get(&entry.url)).await?;
        let Extracted {
            value: mut detail,
            mut report,
        } = extract_detail(
            &html,
            &entry.article_id,
            &self.base,
            &self.config.download_pattern,
        );

        let Some(content_seq) = find_content_seq(&html) else {
            tracing::debug!(article_id = %entry.article_id, "No CONTENT_SEQ, attachments omitted");
            return Ok(Extracted::new(detail, report));
        };

        let form = [
            ("ky", course_id),
            ("pf_st_flag", "2"),
            ("CONTENT_SEQ", content_seq.as_str()),
            ("encoding", "utf-8"),
        ];
        let listing = self
            .request(PortalRequest::Post(&self.config.attachment_list_path, &form))
            .await?;
        let listed = extract_attachments(
            &listing,
            Some(&content_seq),
            &self.base,
            &self.config.download_pattern,
        );
        report.merge(listed.report);
        for attachment in listed.value {
            if !detail
                .attachments
                .iter()
                .any(|known| known.file_seq == attachment.file_seq)
            {
                detail.attachments.push(attachment);
            }
        }
        Ok(Extracted::new(detail, report))
    }
}
