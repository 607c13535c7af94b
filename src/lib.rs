//! repoherd - keep a directory of working copies in agreement with a declarative list
//!
//! A YAML configuration declares sources: a hosting provider account or
//! organization, a local root directory, and a strategy for deciding which of
//! its repositories belong there. repoherd resolves each source to a concrete
//! repository set, compares it with what is checked out under the root, clones
//! what is missing in parallel and deals with untracked leftovers.
//!
//! ## Core Features
//!
//! - **Strategies**: an explicit list (`manual`), everything the owner has
//!   (`all`), or a regex over full names (`regex`)
//! - **Providers**: GitHub and GitHub Enterprise, Gitea, Bitbucket Cloud and Server
//! - **Orphan handling**: prune, add to the configuration, or leave alone
//! - **Parallel execution**: a bounded worker pool for clones and pulls
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading, validation and persistence
//! - [`connector`]: Provider directory clients
//! - [`resolver`]: Strategy resolution to a declared repository set
//! - [`reconcile`]: Classification of declared against local state
//! - [`engine`]: Parallel clone/pull execution
//! - [`sync`]: Orchestration of the above per source

pub mod config;
pub mod connector;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod git;
pub mod orphans;
pub mod prompt;
pub mod reconcile;
pub mod resolver;
pub mod scanner;
pub mod sync;

pub use config::{Config, ConfigLocation, RepoEntry, Source, Strategy};
pub use connector::{Connector, ConnectorFactory, HttpConnectors, ProviderKind};
pub use credentials::Credentials;
pub use engine::{ExecutionEngine, ExecutionJob, ExecutionOutcome, StopSignal};
pub use git::{GitClient, GitOps};
pub use orphans::{OrphanAction, Prompter};
pub use prompt::DialoguerPrompter;
pub use reconcile::{Classification, RepoStatus};
pub use resolver::StrategyResolver;
pub use sync::{SyncOptions, SyncRunner, SyncSummary};
