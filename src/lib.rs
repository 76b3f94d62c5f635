//! welfare_members Library
//!
//! Membership backend for a welfare association: the profile data pipeline,
//! the member directory, password resets and the maintenance panel.

pub mod api;
pub mod audit;
pub mod directory;
pub mod domain;
pub mod email;
pub mod handlers;
pub mod jobs;
pub mod maintenance;
pub mod profile;
pub mod store;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorResponse};
pub use domain::{DomainError, MemberAggregate, Notification, OperationContext, Principal};
