//! # Flustri (Anonymous Campus Social Network)
//!
//! `flustri` is the backend of an anonymous social network restricted to a
//! single email domain. Members authenticate by one-time code sent to their
//! campus address, publish short posts, comment and reply, like, follow,
//! block, and receive realtime notifications over WebSocket.
//!
//! ## Identity Model
//!
//! - **Domain gate:** enrollment is limited to addresses matching the
//!   configured suffix (default `@pec.edu.in`); emails are normalized to
//!   lower case before storage and lookup.
//! - **Anonymous handles:** each verified account owns a globally unique
//!   display handle of at most 20 characters, chosen at first verification.
//!   The email is never exposed to other members.
//! - **Codes and tokens:** one-time codes are six decimal digits valid for
//!   ten minutes; bearer tokens are HS256-signed and valid for seven days.
//!   Both lifetimes are absolute, not sliding.
//!
//! ## Layering
//!
//! The auth core ([`auth`]) owns the account state machine and talks to the
//! world through narrow traits (store, mailer, clock, code source). The HTTP
//! surface ([`api`]) maps it to JSON endpoints and runs every other route
//! behind the bearer-token gate.

pub mod api;
pub mod auth;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
