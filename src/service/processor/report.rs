use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Creation,
    Enrichment,
    Analysis,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Creation => "creation",
            StageKind::Enrichment => "enrichment",
            StageKind::Analysis => "analysis",
        }
    }

    /// Log prefix.
    pub fn tag(&self) -> &'static str {
        match self {
            StageKind::Creation => "[CREATION]",
            StageKind::Enrichment => "[ENRICH]",
            StageKind::Analysis => "[ANALYSIS]",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts and messages for one stage of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: StageKind,
    pub processed: usize,
    pub created: usize,
    pub already_present: usize,
    /// Items not attempted: disabled source, or no plugin for the offer.
    pub skipped: usize,
    pub enriched: usize,
    pub expired: usize,
    pub analysed: usize,
    pub failed: usize,
    pub messages: Vec<String>,
}

impl StageReport {
    pub fn new(stage: StageKind) -> Self {
        Self {
            stage,
            processed: 0,
            created: 0,
            already_present: 0,
            skipped: 0,
            enriched: 0,
            expired: 0,
            analysed: 0,
            failed: 0,
            messages: Vec::new(),
        }
    }

    /// Count a failure and keep its message.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{} {}", self.stage.tag(), message);
        self.failed += 1;
        self.messages.push(message);
    }

    pub fn skip(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{} {}", self.stage.tag(), message);
        self.skipped += 1;
        self.messages.push(message);
    }

    /// Informational message, no counter.
    pub fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{} {}", self.stage.tag(), message);
        self.messages.push(message);
    }
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            StageKind::Creation => write!(
                f,
                "{} emails, {} created, {} already present, {} skipped, {} failed",
                self.processed, self.created, self.already_present, self.skipped, self.failed
            ),
            StageKind::Enrichment => write!(
                f,
                "{} offers, {} enriched, {} expired, {} skipped, {} failed",
                self.processed, self.enriched, self.expired, self.skipped, self.failed
            ),
            StageKind::Analysis => write!(
                f,
                "{} offers, {} analysed, {} skipped, {} failed",
                self.processed, self.analysed, self.skipped, self.failed
            ),
        }
    }
}

/// Result of one orchestrator run. Carries no scheduling state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub creation: StageReport,
    pub enrichment: StageReport,
    pub analysis: StageReport,
}

impl RunSummary {
    pub fn total_failed(&self) -> usize {
        self.stages().map(|s| s.failed).sum()
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.stages()
            .flat_map(|s| s.messages.iter().map(String::as_str))
    }

    fn stages(&self) -> impl Iterator<Item = &StageReport> {
        [&self.creation, &self.enrichment, &self.analysis].into_iter()
    }
}
