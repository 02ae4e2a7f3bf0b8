//! Per-source configuration: which senders belong to a source and which
//! pipeline stages are enabled for it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::SourceRegistry;

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Registry key of the source plugin.
    pub source: String,
    /// Sender addresses, or `@domain` entries matching a whole domain.
    #[serde(default)]
    pub senders: Vec<String>,
    #[serde(default = "enabled")]
    pub creation_enabled: bool,
    #[serde(default = "enabled")]
    pub enrichment_enabled: bool,
    #[serde(default = "enabled")]
    pub analysis_enabled: bool,
}

impl SourceConfig {
    pub fn new(source: impl Into<String>, senders: &[&str]) -> Self {
        Self {
            source: source.into(),
            senders: senders.iter().map(|s| s.to_string()).collect(),
            creation_enabled: true,
            enrichment_enabled: true,
            analysis_enabled: true,
        }
    }

    pub fn matches_sender(&self, address: &str) -> bool {
        let Some((_, domain)) = address.rsplit_once('@') else {
            return false;
        };
        self.senders.iter().any(|entry| {
            let entry = entry.trim().to_lowercase();
            match entry.strip_prefix('@') {
                Some(wanted) => domain == wanted || domain.ends_with(&format!(".{}", wanted)),
                None => entry == address,
            }
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceDirectory {
    sources: Vec<SourceConfig>,
}

impl SourceDirectory {
    pub fn new(sources: Vec<SourceConfig>) -> Self {
        Self { sources }
    }

    /// One enabled entry per registered plugin, using its default senders.
    pub fn from_registry(registry: &SourceRegistry) -> Self {
        Self::new(
            registry
                .plugins()
                .map(|p| SourceConfig::new(p.key, p.default_senders))
                .collect(),
        )
    }

    /// JSON array of [`SourceConfig`] records.
    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read source file {}", path.display()))?;
        let sources: Vec<SourceConfig> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid source file {}", path.display()))?;
        Ok(Self::new(sources))
    }

    pub fn get(&self, source: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.source == source)
    }

    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    /// Resolve a raw `From` header (`Name <addr>` or bare address).
    pub fn source_for_sender(&self, from: &str) -> Option<&SourceConfig> {
        let address = sender_address(from)?;
        self.sources.iter().find(|s| s.matches_sender(&address))
    }

    /// Sources absent from the directory are not gated.
    pub fn enrichment_enabled(&self, source: &str) -> bool {
        self.get(source).map_or(true, |s| s.enrichment_enabled)
    }

    pub fn analysis_enabled(&self, source: &str) -> bool {
        self.get(source).map_or(true, |s| s.analysis_enabled)
    }
}

/// Lowercased bare address from a `From` header.
pub fn sender_address(from: &str) -> Option<String> {
    let from = from.trim();
    let address = match (from.rfind('<'), from.rfind('>')) {
        (Some(start), Some(end)) if start < end => &from[start + 1..end],
        _ => from,
    };
    let address = address.trim().trim_matches('"').to_lowercase();
    address.contains('@').then_some(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::stubs::StubFetcher;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    #[test]
    fn test_sender_address_forms() {
        assert_eq!(
            sender_address("LinkedIn <JobAlerts-NoReply@linkedin.com>").as_deref(),
            Some("jobalerts-noreply@linkedin.com")
        );
        assert_eq!(
            sender_address(" alerts@hellowork.com ").as_deref(),
            Some("alerts@hellowork.com")
        );
        assert_eq!(sender_address("Mailer Daemon"), None);
    }

    #[test]
    fn test_domain_entries_match_subdomains() {
        let config = SourceConfig::new("apec", &["@apec.fr"]);
        assert!(config.matches_sender("offres@apec.fr"));
        assert!(config.matches_sender("noreply@alertes.apec.fr"));
        assert!(!config.matches_sender("noreply@notapec.fr"));
    }

    #[test]
    fn test_directory_from_registry_resolves_senders() {
        let registry = SourceRegistry::builtin(Arc::new(StubFetcher::new()));
        let directory = SourceDirectory::from_registry(&registry);

        let linkedin = directory
            .source_for_sender("LinkedIn Job Alerts <jobalerts-noreply@linkedin.com>")
            .unwrap();
        assert_eq!(linkedin.source, "linkedin");
        assert!(directory.source_for_sender("friend@example.com").is_none());
        assert!(directory.enrichment_enabled("not-configured"));
    }

    #[test]
    fn test_load_json_with_defaults() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"[
                {"source": "hellowork", "senders": ["@hellowork.com"], "analysis_enabled": false},
                {"source": "indeed", "senders": ["alert@indeed.com"], "creation_enabled": false}
            ]"#,
        )
        .unwrap();

        let directory = SourceDirectory::load_json(file.path()).unwrap();
        let hellowork = directory.get("hellowork").unwrap();
        assert!(hellowork.creation_enabled);
        assert!(hellowork.enrichment_enabled);
        assert!(!directory.analysis_enabled("hellowork"));
        assert!(!directory.get("indeed").unwrap().creation_enabled);
    }

    #[test]
    fn test_load_json_rejects_malformed_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "{").unwrap();
        assert!(SourceDirectory::load_json(file.path()).is_err());
    }
}
