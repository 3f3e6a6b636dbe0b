//! Authentication and session-lifecycle core.
//!
//! Domain-gated email enrollment, one-time-code issuance and redemption,
//! anonymous-handle assignment with global uniqueness, and bearer-token
//! issuance. Every other part of the service consumes this module through
//! [`engine::AuthEngine`] and [`gate::RequestGate`]; nothing else touches
//! account state directly.
//!
//! The account lifecycle: a row is created on the first code request for a
//! new email (unverified, no handle), becomes verified on successful
//! redemption with a handle chosen at that moment, and afterwards cycles
//! through verified-with-pending-code on every login request. Accounts are
//! never deleted here.

pub mod clock;
pub mod engine;
pub mod error;
pub mod gate;
pub mod mailer;
pub mod models;
pub mod otp;
pub mod pg;
pub mod store;
pub mod token;

pub use clock::{Clock, SystemClock};
pub use engine::{AuthConfig, AuthEngine, Authenticated, CodeSent};
pub use error::{AuthError, GateError};
pub use gate::{Principal, RequestGate};
pub use mailer::{LogMailer, Mailer, SmtpConfig, SmtpMailer};
pub use models::{Account, PendingCode, UserBody};
pub use otp::{CodeGenerator, OsRngCodes};
pub use pg::PgIdentityStore;
pub use store::{IdentityStore, MemoryStore};
pub use token::{TokenCodec, TokenError};
