//! # Portico
//!
//! `portico` is the authentication and content-persistence layer of a web
//! application that runs on a hosted identity + document-database platform.
//!
//! Every facade follows the same shape: validate input, call the platform,
//! reshape the response, and translate platform error codes into localized
//! messages.
//!
//! ## Facades
//!
//! - [`auth::AuthFacade`]: email/password, OAuth and phone sign-in, session observation.
//! - [`auth::phone::PhoneVerifier`]: CAPTCHA widget lifecycle and SMS dispatch.
//! - [`content::ContentFacade`]: posts, comments and notices.
//! - [`usage::UsageFacade`]: daily AI usage quota and admin statistics.
//! - [`users::UsersFacade`]: profiles, preferences and roles.
//! - [`analysis::AnalysisFacade`]: bounded analysis snapshots.
//!
//! ## Authorization
//!
//! Role-gated writes always re-read the actor's stored `role`; ownership-gated
//! writes always re-read the document's `authorId`. Nothing the caller asserts
//! about itself is trusted.

pub mod analysis;
pub mod auth;
pub mod cli;
pub mod clock;
pub mod config;
pub mod content;
pub mod error;
pub mod models;
pub mod outcome;
pub mod platform;
pub mod sanitize;
pub mod usage;
pub mod users;

pub use error::{Error, ErrorKind};
pub use outcome::Outcome;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
