//! Email Source port.
//!
//! Mailbox transport (IMAP/OAuth) lives outside this crate. A bridge drops
//! each unread alert into a folder as JSON; [`DirectoryEmailSource`] reads
//! that folder and archives by moving files into `archived/`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;

/// A notification email waiting to be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateEmail {
    /// Source-assigned identifier, passed back to `archive`.
    #[serde(default)]
    pub id: String,
    /// Raw `From` header, e.g. `LinkedIn <jobalerts-noreply@linkedin.com>`.
    pub from: String,
    #[serde(default)]
    pub subject: String,
    pub html: String,
    pub received_at: DateTime<Utc>,
}

#[async_trait]
pub trait EmailSource: Send + Sync {
    async fn list_candidate_emails(&self, mailbox: &str) -> Result<Vec<CandidateEmail>>;

    async fn archive(&self, ids: &[String]) -> Result<()>;
}

const ARCHIVE_DIR: &str = "archived";

/// Drop-folder email source: `<root>/<mailbox>/*.json`.
pub struct DirectoryEmailSource {
    root: PathBuf,
}

impl DirectoryEmailSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn read_email(path: &Path) -> Result<CandidateEmail> {
        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Malformed email file {}", path.display()))
    }

    async fn email_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(dir)
            .await
            .with_context(|| format!("Failed to list {}", dir.display()))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("Failed to list {}", dir.display()))?
        {
            let path = entry.path();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file && path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

#[async_trait]
impl EmailSource for DirectoryEmailSource {
    async fn list_candidate_emails(&self, mailbox: &str) -> Result<Vec<CandidateEmail>> {
        let dir = self.root.join(mailbox);
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            tracing::debug!("[MAILBOX] {} does not exist, no emails", dir.display());
            return Ok(Vec::new());
        }

        let paths = Self::email_files(&dir).await?;
        let mut emails = Vec::with_capacity(paths.len());
        for path in paths {
            match Self::read_email(&path).await {
                Ok(mut email) => {
                    let file_name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    email.id = format!("{}/{}", mailbox, file_name);
                    emails.push(email);
                }
                Err(e) => tracing::warn!("[MAILBOX] Skipping {:#}", e),
            }
        }

        emails.sort_by_key(|e| e.received_at);
        Ok(emails)
    }

    async fn archive(&self, ids: &[String]) -> Result<()> {
        for id in ids {
            let (mailbox, file_name) = id
                .rsplit_once('/')
                .with_context(|| format!("Invalid email id: {}", id))?;
            let archive_dir = self.root.join(mailbox).join(ARCHIVE_DIR);
            fs::create_dir_all(&archive_dir)
                .await
                .with_context(|| format!("Failed to create {}", archive_dir.display()))?;

            let from = self.root.join(mailbox).join(file_name);
            fs::rename(&from, archive_dir.join(file_name))
                .await
                .with_context(|| format!("Failed to archive {}", from.display()))?;
        }
        Ok(())
    }
}

/// Process-local email source for tests and manual imports.
#[derive(Default)]
pub struct InMemoryEmailSource {
    emails: Mutex<Vec<(String, CandidateEmail)>>,
    archived: Mutex<Vec<String>>,
}

impl InMemoryEmailSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an email in `mailbox`. An empty id is replaced by a sequential one.
    pub fn push(&self, mailbox: &str, mut email: CandidateEmail) {
        let mut emails = self.emails.lock().unwrap_or_else(|e| e.into_inner());
        if email.id.is_empty() {
            email.id = format!("{}/{}", mailbox, emails.len() + 1);
        }
        emails.push((mailbox.to_string(), email));
    }

    pub fn archived(&self) -> Vec<String> {
        self.archived.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl EmailSource for InMemoryEmailSource {
    async fn list_candidate_emails(&self, mailbox: &str) -> Result<Vec<CandidateEmail>> {
        let emails = self.emails.lock().unwrap_or_else(|e| e.into_inner());
        Ok(emails
            .iter()
            .filter(|(m, _)| m == mailbox)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn archive(&self, ids: &[String]) -> Result<()> {
        let mut emails = self.emails.lock().unwrap_or_else(|e| e.into_inner());
        emails.retain(|(_, e)| !ids.contains(&e.id));
        self.archived
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(ids.iter().cloned());
        Ok(())
    }
}
