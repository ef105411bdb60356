//! Course content crawler for the Seoultech e-Class portal.
//!
//! The portal exposes no API, so everything here works on the HTML it
//! serves to a logged-in browser: [`session`] keeps the authenticated
//! identity, [`extract`] turns pages into records and [`crawl`] walks a
//! course's boards and decides what is new.
pub mod config;
pub mod crawl;
pub mod error;
pub mod extract;
pub mod model;
pub mod session;
pub mod store;
mod utils;

pub use config::PortalConfig;
pub use crawl::{BoardCrawl, CourseCrawl, CourseCrawler, Credentials};
pub use error::{Error, Result};
pub use session::{Portal, PortalSession, SessionState};
pub use store::{ArticleStore, MemoryArticleStore};
