pub mod aggregate;
pub mod config;
pub mod engine;
pub mod events;
pub mod filter;
pub mod metrics;
pub mod orchestrator;
pub mod storage;
pub mod submission;
pub mod testing;
pub mod transfer;

pub use aggregate::{collect_outcomes, decide_success, OutcomeSummary, NO_OUTPUT_REASON};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, EngineConfig,
    SanitizedConfig, ServerConfig, StorageBackend, StorageConfig,
};
pub use engine::{AzureTranslatorClient, EngineError, JobPhase, JobStatus, TranslationEngine};
pub use events::{EventSink, RunEvent, RunEventEnvelope};
pub use filter::{filter_by_extension, ExtensionSet, FilteredPaths};
pub use orchestrator::{
    OrchestratorConfig, RunContext, RunError, RunOrchestrator, RunOutcome, RunRequest,
};
pub use storage::{
    AccessMode, EphemeralStorageManager, FsObjectStorage, ObjectStorage, StorageError,
};
pub use submission::{SubmissionError, SubmissionMachine, SubmissionState};
pub use transfer::{RetryConfig, TransferEngine, TransferError, TransferSummary};
