//! Ingestion pipeline
//!
//! batch file -> [`parser`] -> [`validator`] -> [`dedup`] -> embedding cache ->
//! [`upsert`], driven per record by the [`batch`] orchestrator, with
//! [`recovery`] jobs for rows left behind.

pub mod batch;
pub mod dedup;
pub mod parser;
pub mod recovery;
pub mod upsert;
pub mod validator;

pub use batch::BatchOrchestrator;
pub use batch::BatchRequest;
pub use batch::BatchSummary;
pub use batch::FailedRecord;
pub use batch::RecordOutcome;
pub use dedup::DedupDecision;
pub use dedup::DedupTracker;
pub use parser::parse_batch;
pub use parser::ParsedBatch;
pub use recovery::ReconcileReport;
pub use recovery::RecoveryJobs;
pub use recovery::RetryReport;
pub use upsert::VectorUpserter;
pub use validator::RecordValidator;
