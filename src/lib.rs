//! # mailfill
//!
//! Fill web forms from email text. Scan the form fields on a page, ask a
//! completion endpoint to pull matching values out of an email, review them,
//! then write them back into the page.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mailfill::{review, Config, Provider, Session};
//!
//! # #[tokio::main]
//! # async fn main() -> mailfill::Result<()> {
//! let config = Config::load("configs/example.yaml")?;
//! let provider = Provider::from_config(config.completion()?)?;
//!
//! let mut session = Session::launch(&config.browser, config.timing.clone()).await?;
//! session.open(&config.target.url).await?;
//! session.scan().await?;
//!
//! let extraction = session.extract(&provider, "Meeting with Bob on Friday at 3pm").await?;
//! print!("{}", review::render_table(&extraction.rows));
//!
//! let report = session.fill(&review::reviewed_values(&extraction.rows)).await?;
//! println!("{}", report);
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod completion;
pub mod config;
pub mod fields;
pub mod mcp;
pub mod parse;
pub mod review;
mod session;

pub use completion::{build_prompt, CompletionResponse, Provider};
pub use config::{
    BrowserConfig, CompletionConfig, Config, InboxConfig, ParamDef, Params, Protocol, TargetUrl,
    Timing,
};
pub use fields::{
    DropdownOptions, FieldDescriptor, FieldOutcome, FieldType, FillReport, ReviewedValue,
};
pub use parse::{parse_response, ExtractedFields, FieldValue};
pub use review::ReviewRow;
pub use session::{extract_values, Extraction, Session};

/// Result type for mailfill operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading a job or running it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("run failed with status: {0}")]
    RunFailed(String),

    #[error("{0}")]
    Parse(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("inbox error: {0}")]
    Inbox(#[from] mailfill_inbox::Error),

    #[error("{0}")]
    Input(String),
}
