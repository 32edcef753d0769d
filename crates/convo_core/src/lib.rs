//! Convo core: pure completion-detection state machine, records and work-planning policies.
mod detector;
mod observation;
mod policy;
mod prompts;
mod record;
mod shard;

pub use detector::{advance, tick, DetectorEffect, DetectorSettings, Verdict};
pub use observation::{DetectionState, Observation, Phase};
pub use policy::{BreakerState, CircuitBreaker, DonePolicy, RetryPolicy};
pub use prompts::{is_prompt_file_name, parse_prompts, pending_prompts, task_name_from_path};
pub use record::{
    conversation_id_from_url, dedupe_citations, detect_language, CitationEntry, Language,
    RecordStatus, ResponseRecord,
};
pub use shard::{plan, ShardError, ShardPlan};
