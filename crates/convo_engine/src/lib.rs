//! Convo engine: browser surface, completion polling, extraction and the resumable job runner.
mod citations;
mod conversation;
mod detect;
mod error;
mod extract;
mod ledger;
mod markdown;
mod persist;
mod retry;
mod runner;
mod session;
mod site;
mod surface;
mod transcript;
mod webdriver;

pub use citations::PanelSelectors;
pub use conversation::{ChatSession, Clock, ConversationSettings};
pub use detect::{detect_completion, CompletionProbe, DetectionOutcome};
pub use error::EngineError;
pub use extract::{Extraction, ExtractionError, ExtractionPipeline, SidePanel};
pub use ledger::{read_done_set, Ledger, LedgerError, LedgerLoad, OutputNaming};
pub use markdown::{MarkdownConverter, MarkdownOutput, MarkdownRules};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use retry::{retry_with_backoff, think_time, RetryOutcome};
pub use runner::{PromptExecutor, RunnerSettings, TaskContext, TaskPlan, TaskRunner, TaskSummary};
pub use session::{SessionError, SessionStore};
pub use site::{builtin_profiles, CitationReveal, SiteProfile, SiteTimings};
pub use surface::{Cookie, ElementHandle, Key, Locator, StorageMap, UiError, UiSurface};
pub use transcript::Transcript;
pub use webdriver::{WebDriverSession, WebDriverSettings};
