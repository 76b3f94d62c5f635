//! Command Handlers module
//!
//! Handlers that validate a command, apply it to the database and record
//! it in the audit log.

mod commands;
mod password_reset_handler;
mod update_member_handler;


pub use commands::*;
pub use password_reset_handler::{
    email_matches, generate_token, PasswordResetHandler, PasswordResetSettings,
};
pub use update_member_handler::{Editor, UpdateMemberHandler};
