use std::path::{Path, PathBuf};

use autolms::{CourseCrawl, PortalSession, model::AttachmentRef};
use tokio::io::AsyncWriteExt;

/// Writes `<out>/<course>/crawl.json` and one JSON file per new article
/// under `<out>/<course>/<board>/<article id>.json`.
pub(crate) async fn save_crawl(out_dir: &Path, crawl: &CourseCrawl) -> eyre::Result<PathBuf> {
    let course_dir = out_dir.join(file_name(&crawl.course.id));
    tokio::fs::create_dir_all(&course_dir).await?;

    let json = serde_json::to_string_pretty(crawl)?;
    let mut crawl_file = tokio::fs::File::create(course_dir.join("crawl.json")).await?;
    crawl_file.write_all(json.as_bytes()).await?;

    for board in &crawl.boards {
        if board.articles.is_empty() {
            continue;
        }
        let board_dir = course_dir.join(serde_json::to_value(board.kind)?.as_str().unwrap_or("board"));
        tokio::fs::create_dir_all(&board_dir).await?;
        for article in &board.articles {
            let path = board_dir.join(format!("{}.json", file_name(&article.entry.article_id)));
            tokio::fs::write(path, serde_json::to_string_pretty(article)?).await?;
        }
    }
    Ok(course_dir)
}

/// Downloads every attachment of the crawl into `<course dir>/files/<article id>/`.
/// Returns how many downloads failed; failures are logged and do not stop
/// the remaining downloads.
pub(crate) async fn download_attachments(
    session: &PortalSession,
    course_dir: &Path,
    crawl: &CourseCrawl,
) -> usize {
    let mut failed = 0;
    for article in crawl.boards.iter().flat_map(|board| &board.articles) {
        for attachment in &article.detail.attachments {
            let dir = course_dir
                .join("files")
                .join(file_name(&article.entry.article_id));
            if let Err(e) = download_one(session, &dir, attachment).await {
                tracing::error!(
                    course = %crawl.course.id,
                    file_seq = %attachment.file_seq,
                    "Failed to download {}: {e:?}",
                    attachment.file_name
                );
                failed += 1;
            }
        }
    }
    failed
}

async fn download_one(
    session: &PortalSession,
    dir: &Path,
    attachment: &AttachmentRef,
) -> eyre::Result<()> {
    let bytes = session.download(&attachment.download_url).await?;
    tokio::fs::create_dir_all(dir).await?;
    let name = attachment_file_name(attachment);
    tokio::fs::write(dir.join(&name), &bytes).await?;
    tracing::info!(file = %name, size = bytes.len(), "Saved attachment");
    Ok(())
}

/// `<file seq>_<file name>`, so same-named attachments of one article
/// do not overwrite each other.
fn attachment_file_name(attachment: &AttachmentRef) -> String {
    let seq = file_name(&attachment.file_seq);
    match file_name(&attachment.file_name) {
        name if name.is_empty() => seq,
        name => format!("{seq}_{name}"),
    }
}

/// Portal-provided text made safe to use as one path component.
fn file_name(raw: &str) -> String {
    let name = raw
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>();
    match name.as_str() {
        "." | ".." => name.replace('.', "_"),
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use autolms::model::{
        BoardKind, CourseSummary, CrawledArticle, DetailRecord, EntryMeta, ListEntry, MenuMap,
    };

    use super::*;

    #[test]
    fn file_names_are_single_components() {
        assert_eq!(file_name("1주차 자료.pdf"), "1주차 자료.pdf");
        assert_eq!(file_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(file_name(".."), "__");
        assert_eq!(file_name("  report?.hwp "), "report_.hwp");
    }

    #[test]
    fn same_named_attachments_get_distinct_files() {
        let attachment = |file_seq: &str, file_name: &str| AttachmentRef {
            file_seq: file_seq.to_string(),
            content_seq: Some("55".to_string()),
            file_name: file_name.to_string(),
            download_url: String::new(),
        };
        let first = attachment_file_name(&attachment("9", "과제.hwp"));
        let second = attachment_file_name(&attachment("10", "과제.hwp"));
        assert_eq!(first, "9_과제.hwp");
        assert_eq!(second, "10_과제.hwp");
        assert_eq!(attachment_file_name(&attachment("11", " ")), "11");
    }

    #[tokio::test]
    async fn crawl_is_written_per_course_and_article() {
        let dir = tempfile::tempdir().unwrap();
        let mut crawl = test_crawl(CourseSummary {
            id: "A2024CS301".to_string(),
            name: "Algorithms".to_string(),
            code: "CS301".to_string(),
            time: String::new(),
        });
        crawl.boards[0].articles.push(CrawledArticle {
            entry: ListEntry {
                article_id: "101".to_string(),
                title: "개강 안내".to_string(),
                author: "김교수".to_string(),
                date: "2025.03.04".to_string(),
                url: "https://eclass.seoultech.ac.kr/ilos/st/course/notice_view_form.acl?ARTL_NUM=101"
                    .to_string(),
                has_attachment_hint: false,
                meta: EntryMeta::Notice {
                    number: "1".to_string(),
                    views: 3,
                },
            },
            detail: DetailRecord {
                article_id: "101".to_string(),
                content: "첫 수업".to_string(),
                ..DetailRecord::default()
            },
        });

        let course_dir = save_crawl(dir.path(), &crawl).await.unwrap();
        assert_eq!(course_dir, dir.path().join("A2024CS301"));

        let summary: serde_json::Value = serde_json::from_str(
            &tokio::fs::read_to_string(course_dir.join("crawl.json"))
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(summary["course"]["id"], "A2024CS301");
        assert!(summary["failure"].is_null());

        let article = tokio::fs::read_to_string(course_dir.join("notice").join("101.json"))
            .await
            .unwrap();
        assert!(article.contains("첫 수업"));
    }

    fn test_crawl(course: CourseSummary) -> CourseCrawl {
        let mut crawl = CourseCrawl {
            course,
            menu: MenuMap::default(),
            syllabus: None,
            boards: Vec::new(),
            unavailable: Vec::new(),
            skipped: Vec::new(),
            drift: Vec::new(),
            failure: None,
            crawled_at: time::OffsetDateTime::UNIX_EPOCH,
        };
        crawl.boards.push(autolms::BoardCrawl {
            kind: BoardKind::Notice,
            articles: Vec::new(),
            known: 0,
            skipped: Vec::new(),
            drift: Vec::new(),
            error: None,
        });
        crawl
    }
}
