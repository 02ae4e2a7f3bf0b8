//! Pure HTML helpers shared by the source plugins. Nothing here does I/O.

pub mod job_posting;
pub mod links;
pub mod text;

pub use job_posting::{find_job_posting, JobPosting};
pub use links::{dedup_offers, harvest_links, AlertLink};
pub use text::{html_to_text, normalize_whitespace, truncate_chars};
