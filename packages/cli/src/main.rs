use std::{
    collections::HashSet,
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use autolms::{CourseCrawler, Credentials, PortalConfig, PortalSession};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{Layer, filter, layer::SubscriberExt as _, util::SubscriberInitExt};

use crate::cache::ArticleCache;

mod cache;
mod output;

#[derive(Parser, Debug)]
#[command(
    name = "autolms",
    about = "Collects new notices, lecture materials and assignments from Seoultech e-Class.",
    version
)]
struct AutoLmsOptions {
    /// The output directory for crawl results.
    #[arg(short = 'o', long = "out", default_value = "./out")]
    out_dir: PathBuf,

    /// The cache directory holding already collected article ids.
    #[arg(long = "cache", default_value = "./.cache")]
    cache_dir: PathBuf,

    /// A JSON file overriding the portal configuration.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// The e-Class account id.
    #[arg(long = "id", env = "ECLASS_ID")]
    id: String,

    /// The e-Class account password.
    #[arg(long = "password", env = "ECLASS_PASSWORD", hide_env_values = true)]
    password: String,

    /// The courses (course keys) to crawl. By default, every enrolled course is crawled.
    #[arg(short = 'i', long = "course", value_delimiter = ',')]
    courses: Vec<String>,

    /// Download the attachments of new articles.
    #[arg(short = 'd', long)]
    download: bool,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    setup_tracing()?;

    color_eyre::install()?;
    dotenvy::dotenv().ok();
    let options = AutoLmsOptions::parse();

    let config = Arc::new(load_config(options.config.as_deref()).await?);
    let cache = ArticleCache::new(&options.cache_dir);
    let session = PortalSession::new(config.clone())?;
    let crawler = CourseCrawler::new(
        session,
        cache.load().await,
        config,
        Credentials::new(options.id, options.password),
    )?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping after the current request");
                cancel.cancel();
            }
        }
    });

    let courses = crawler.courses().await?.value;
    let selected: HashSet<&str> = options.courses.iter().map(String::as_str).collect();
    let courses = courses
        .into_iter()
        .filter(|course| selected.is_empty() || selected.contains(course.id.as_str()))
        .collect::<Vec<_>>();
    if courses.is_empty() {
        tracing::warn!("No course to crawl");
    }

    let mut errors: Vec<eyre::Report> = Vec::new();
    for course in &courses {
        let crawl = match crawler.crawl_course(course, &cancel).await {
            Ok(crawl) => crawl,
            Err(err) if err.is_fatal() => {
                errors.push(eyre::eyre!("{} ({}): {err}", course.name, course.id));
                break;
            }
            Err(err) => {
                errors.push(eyre::eyre!("{} ({}): {err}", course.name, course.id));
                continue;
            }
        };

        let course_dir = output::save_crawl(&options.out_dir, &crawl).await?;
        if options.download {
            let failed =
                output::download_attachments(crawler.portal(), &course_dir, &crawl).await;
            if failed > 0 {
                errors.push(eyre::eyre!(
                    "{} ({}): {failed} attachment downloads failed",
                    course.name,
                    course.id
                ));
            }
        }
        crawler.store().remember_crawl(&crawl);

        if let Some(failure) = &crawl.failure {
            errors.push(eyre::eyre!("{} ({}): {failure}", course.name, course.id));
            if cancel.is_cancelled() {
                break;
            }
        }
    }

    cache.save(crawler.store()).await?;

    if errors.is_empty() {
        Ok(())
    } else {
        for err in &errors {
            tracing::error!("{err:?}");
        }
        Err(eyre::eyre!(
            "{} of {} course crawls failed",
            errors.len(),
            courses.len()
        ))
    }
}

async fn load_config(path: Option<&Path>) -> eyre::Result<PortalConfig> {
    let Some(path) = path else {
        return Ok(PortalConfig::default());
    };
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| eyre::eyre!("Failed to read config {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&contents)?)
}

fn setup_tracing() -> eyre::Result<()> {
    std::fs::create_dir_all("reports").or_else(|e| {
        if e.kind() == std::io::ErrorKind::AlreadyExists {
            Ok(())
        } else {
            Err(e)
        }
    })?;
    let stdout_log = tracing_subscriber::fmt::layer()
        .with_ansi(true)
        .with_level(true)
        .with_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        );

    let content_report_file = File::create("reports/content_report.json")
        .map_err(|e| eyre::eyre!("Failed to create log file: {e}"))?;
    let content_report_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_span_list(false)
        .with_writer(Arc::new(content_report_file))
        .with_filter(filter::filter_fn(|metadata| {
            metadata.target() == "content_update"
        }));

    let drift_report_file = File::create("reports/drift_report.json")
        .map_err(|e| eyre::eyre!("Failed to create drift log file: {e}"))?;
    let drift_report_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_span_list(false)
        .with_writer(Arc::new(drift_report_file))
        .with_filter(filter::filter_fn(|metadata| {
            metadata.target() == "layout_drift"
        }));

    let error_report_file = File::create("reports/error_report.json")
        .map_err(|e| eyre::eyre!("Failed to create error log file: {e}"))?;
    let error_report_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(Arc::new(error_report_file))
        .with_filter(LevelFilter::ERROR);

    tracing_subscriber::registry()
        .with(stdout_log)
        .with(content_report_layer)
        .with(drift_report_layer)
        .with(error_report_layer)
        .init();
    Ok(())
}
