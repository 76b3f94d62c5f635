//! Profile data pipeline
//!
//! Identity resolution, aggregate loading and the caching orchestrator
//! that sits in front of them.

mod error;
pub mod loader;
pub mod memory;
mod notify;
pub mod orchestrator;
pub mod ports;
pub mod resolver;
mod service;

pub use error::{FetchError, LinkingWarning, ProfileError};
pub use loader::{Loaded, MemberAggregateLoader};
pub use notify::NotificationBuffer;
pub use orchestrator::{FetchOrchestrator, FetchOutcome, FetchPolicy, FetchStatus, Freshness, PROFILE_QUERY_KEY};
pub use ports::{AuthProvider, MatchOutcome, Notifier, ProfileMatcher, ProfileStore};
pub use resolver::{IdentityResolver, Resolution};
pub use service::ProfileService;
