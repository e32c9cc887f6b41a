//! # eoka-vision
//!
//! Vision-driven browser agent. Each step captures the page as an
//! index-annotated screenshot plus an element list, hands it to a
//! decision oracle (a vision model), and executes the action it returns.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use eoka_vision::{Agent, ChatCompletionsOracle, ChromeDriver, Config, Executor};
//!
//! # #[tokio::main]
//! # async fn main() -> eoka_vision::Result<()> {
//! let config = Config::load("task.yaml")?;
//! let driver = ChromeDriver::new(&config.browser);
//! let executor = Executor::new(driver, config.capture_options())
//!     .with_delays(config.settle_delays());
//! let oracle = ChatCompletionsOracle::from_config(&config.oracle)?;
//!
//! let mut agent = Agent::new(executor, oracle, config.agent_config());
//! match agent.run(&config.task).await {
//!     Ok(information) => println!("{}", information.join("\n")),
//!     Err(failure) => eprintln!("run failed: {}", failure),
//! }
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod agent;
pub mod annotate;
pub mod capture;
pub mod config;
pub mod driver;
pub mod element;
pub mod executor;
pub mod observe;
pub mod oracle;

pub use action::{Action, Decision};
pub use agent::{Agent, RunFailure};
pub use capture::{CaptureOptions, Observation, SettleTimeouts};
pub use config::{AgentConfig, BrowserConfig, Config, OracleConfig, Task};
pub use driver::{ChromeDriver, Driver, LoadState, Viewport};
pub use element::{BBox, Element, ElementRef, ElementView};
pub use executor::{Executor, SettleDelays};
pub use oracle::{ChatCompletionsOracle, DecisionRequest, Oracle};

/// Result type for eoka-vision operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while observing, deciding or acting.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("page not ready: {0}")]
    PageNotReady(String),

    #[error("timed out waiting for {state} after {timeout_ms}ms")]
    SettleTimeout { state: LoadState, timeout_ms: u64 },

    #[error("could not parse oracle response: {0}")]
    OracleParse(String),

    #[error("element [{index}] out of range ({len} elements observed)")]
    InvalidElementIndex { index: i64, len: usize },

    #[error("element [{index}] belongs to observation {generation}, current is {current}")]
    StaleElement {
        index: i64,
        generation: u64,
        current: u64,
    },

    #[error("oracle error: {0}")]
    Oracle(String),

    #[error("step limit of {0} decisions reached")]
    StepLimit(usize),

    #[error("config error: {0}")]
    Config(String),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors the loop absorbs locally instead of ending the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::SettleTimeout { .. } | Error::InvalidElementIndex { .. }
        )
    }
}
