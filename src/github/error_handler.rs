//! Branch listing error classification
//!
//! Maps a failed branch request to an actionable cause so the user can be told
//! to reconnect with broader scope, supply a Personal Access Token, or fix a
//! rejected token.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::CrewdeckError;

/// Messages GitHub (or the backend) uses when a token is rejected
static BAD_CREDENTIALS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)bad credentials|invalid (?:token|pat)|token (?:has )?expired|expired token|revoked")
        .expect("Invalid regex pattern for bad credentials detection")
});

/// Messages meaning the repository is invisible to the current credential
static NO_ACCESS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)not found|no access|forbidden|permission|resource not accessible|insufficient scope")
        .expect("Invalid regex pattern for access failure detection")
});

/// Cause of a failed branch listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchFailure {
    /// Repository missing or hidden from the current authorization
    NotFoundOrNoAccess,
    /// The supplied PAT was rejected
    InvalidPat,
    /// Anything else, message passed through verbatim
    Other(String),
}

impl BranchFailure {
    /// Hint shown next to the failure
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            BranchFailure::NotFoundOrNoAccess => Some(
                "Reconnect GitHub with access to private repositories, or retry with a Personal Access Token.",
            ),
            BranchFailure::InvalidPat => {
                Some("The token was rejected. Check that it has the 'repo' scope and has not expired.")
            }
            BranchFailure::Other(_) => None,
        }
    }

    /// Whether retrying with a PAT could help
    pub fn accepts_pat(&self) -> bool {
        matches!(
            self,
            BranchFailure::NotFoundOrNoAccess | BranchFailure::InvalidPat
        )
    }
}

/// Message carried by an error, without the CLI hint decoration
pub fn error_message(err: &CrewdeckError) -> String {
    match err {
        CrewdeckError::Api { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

/// Classify a branch listing failure by status code and message
pub fn classify_branch_error(err: &CrewdeckError, used_pat: bool) -> BranchFailure {
    let message = error_message(err);

    match err.status() {
        Some(401) if used_pat => return BranchFailure::InvalidPat,
        Some(401) | Some(403) | Some(404) => {
            if used_pat && BAD_CREDENTIALS_PATTERN.is_match(&message) {
                return BranchFailure::InvalidPat;
            }
            return BranchFailure::NotFoundOrNoAccess;
        }
        _ => {}
    }

    if used_pat && BAD_CREDENTIALS_PATTERN.is_match(&message) {
        return BranchFailure::InvalidPat;
    }

    if NO_ACCESS_PATTERN.is_match(&message) {
        return BranchFailure::NotFoundOrNoAccess;
    }

    BranchFailure::Other(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, message: &str) -> CrewdeckError {
        CrewdeckError::Api {
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_not_found_status() {
        assert_eq!(
            classify_branch_error(&api(404, "Not Found"), false),
            BranchFailure::NotFoundOrNoAccess
        );
        assert_eq!(
            classify_branch_error(&api(403, "Forbidden"), false),
            BranchFailure::NotFoundOrNoAccess
        );
    }

    #[test]
    fn test_not_found_message_on_other_status() {
        // some backends wrap upstream 404s in a 400
        assert_eq!(
            classify_branch_error(&api(400, "GitHub: Not Found"), false),
            BranchFailure::NotFoundOrNoAccess
        );
    }

    #[test]
    fn test_invalid_pat() {
        assert_eq!(
            classify_branch_error(&api(401, "Bad credentials"), true),
            BranchFailure::InvalidPat
        );
        assert_eq!(
            classify_branch_error(&api(400, "token has expired"), true),
            BranchFailure::InvalidPat
        );
        assert_eq!(
            classify_branch_error(&api(404, "Bad credentials"), true),
            BranchFailure::InvalidPat
        );
    }

    #[test]
    fn test_unauthorized_without_pat_suggests_reconnect() {
        assert_eq!(
            classify_branch_error(&api(401, "Bad credentials"), false),
            BranchFailure::NotFoundOrNoAccess
        );
    }

    #[test]
    fn test_generic_error_passes_through() {
        assert_eq!(
            classify_branch_error(&api(500, "upstream exploded"), false),
            BranchFailure::Other("upstream exploded".to_string())
        );
        assert!(BranchFailure::Other("x".into()).suggestion().is_none());
        assert!(!BranchFailure::Other("x".into()).accepts_pat());
        assert!(BranchFailure::NotFoundOrNoAccess.accepts_pat());
    }
}
