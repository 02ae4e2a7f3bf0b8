pub mod ai;
pub mod http;
pub mod mailbox;
pub mod processor;
pub mod retry;
pub mod scheduler;

pub use ai::{AiClient, AiError, GeminiClient, OpenAiClient};
pub use http::{FallbackFetcher, HttpFetcher, PageFetcher, ProxyFetcher};
pub use mailbox::{CandidateEmail, DirectoryEmailSource, EmailSource, InMemoryEmailSource};
pub use processor::{
    AnalysisStage, CreationStage, EnrichmentStage, MetadataRefreshPolicy, Orchestrator,
    RunSummary, Stage, StageKind, StageReport,
};
