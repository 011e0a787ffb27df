//! Client for a pipeline orchestrator behind an interactive login gateway.
//!
//! - [`AuthSession`]: replays the browser login flow to obtain a session cookie
//! - [`OrchestratorClient`]: experiments and runs over the REST API
//! - [`PipelineSubmitter`]: compile, then submit with one session renewal

pub mod auth;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod submitter;
pub mod token;

pub use auth::AuthSession;
pub use config::{os_user, ClientConfig, Credentials};
pub use error::ClientError;
pub use orchestrator::OrchestratorClient;
pub use submitter::{default_run_name, PipelineSubmitter, DEFAULT_EXPERIMENT};
pub use token::extract_login_token;

pub use tokio_util::sync::CancellationToken;
