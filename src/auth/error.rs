//! Typed failures surfaced by the auth core.

use thiserror::Error;

/// Failures of the four auth operations.
///
/// Every variant has a fixed machine-readable code used by the HTTP layer;
/// infrastructure variants wrap their source but never leak it to clients.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("only addresses on the configured email domain are allowed")]
    DomainNotAllowed,
    #[error("account not found or not in the required state")]
    UnknownAccount,
    #[error("invalid verification code")]
    InvalidCode,
    #[error("verification code has expired")]
    CodeExpired,
    #[error("an anonymous name is required for first verification")]
    HandleRequired,
    #[error("anonymous name already taken")]
    HandleTaken,
    #[error("anonymous name must be 1-20 characters")]
    InvalidHandle,
    #[error("failed to deliver the verification email")]
    MailDeliveryFailed(#[source] anyhow::Error),
    #[error("identity store unavailable")]
    Store(#[source] anyhow::Error),
}

impl AuthError {
    /// Stable external code for the HTTP layer.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::DomainNotAllowed => "DomainNotAllowed",
            Self::UnknownAccount => "UnknownAccount",
            Self::InvalidCode => "InvalidCode",
            Self::CodeExpired => "CodeExpired",
            Self::HandleRequired => "HandleRequired",
            Self::HandleTaken => "HandleTaken",
            Self::InvalidHandle => "InvalidHandle",
            Self::MailDeliveryFailed(_) => "MailDeliveryFailed",
            Self::Store(_) => "StoreUnavailable",
        }
    }

    /// True for infrastructure failures that map to 500.
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::MailDeliveryFailed(_) | Self::Store(_))
    }
}

/// Failures of the request gate, ahead of any protected handler.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("access token required")]
    TokenRequired,
    #[error("invalid or expired token")]
    TokenRejected,
    #[error("account is disabled or not verified")]
    AccountDisabled,
    #[error("identity store unavailable")]
    Store(#[source] anyhow::Error),
}

impl GateError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::TokenRequired => "TokenRequired",
            Self::TokenRejected => "TokenRejected",
            Self::AccountDisabled => "AccountDisabled",
            Self::Store(_) => "StoreUnavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_codes_are_stable() {
        assert_eq!(AuthError::DomainNotAllowed.code(), "DomainNotAllowed");
        assert_eq!(AuthError::UnknownAccount.code(), "UnknownAccount");
        assert_eq!(AuthError::InvalidCode.code(), "InvalidCode");
        assert_eq!(AuthError::CodeExpired.code(), "CodeExpired");
        assert_eq!(AuthError::HandleRequired.code(), "HandleRequired");
        assert_eq!(AuthError::HandleTaken.code(), "HandleTaken");
        assert_eq!(AuthError::InvalidHandle.code(), "InvalidHandle");
        assert_eq!(
            AuthError::Store(anyhow::anyhow!("down")).code(),
            "StoreUnavailable"
        );
    }

    #[test]
    fn infrastructure_split() {
        assert!(AuthError::MailDeliveryFailed(anyhow::anyhow!("smtp")).is_infrastructure());
        assert!(AuthError::Store(anyhow::anyhow!("db")).is_infrastructure());
        assert!(!AuthError::InvalidCode.is_infrastructure());
    }

    #[test]
    fn gate_error_codes_are_stable() {
        assert_eq!(GateError::TokenRequired.code(), "TokenRequired");
        assert_eq!(GateError::TokenRejected.code(), "TokenRejected");
        assert_eq!(GateError::AccountDisabled.code(), "AccountDisabled");
    }
}
