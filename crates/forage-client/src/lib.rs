pub mod browser;
pub mod downloader;
pub mod extractor;

pub use browser::{BrowserFactory, BrowserSession, DEFAULT_USER_AGENT};
pub use downloader::{DownloadOutcome, MediaDownloader};
pub use extractor::{FieldSpec, PageExtractor};
