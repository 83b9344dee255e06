//! HTTP status classification.
//!
//! Maps every status code the server can return onto a closed set of
//! outcomes. See <https://developer.hashicorp.com/vault/api-docs#http-status-codes>.

use std::fmt;

/// Result of classifying a response status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// `200`: success with a response envelope.
    Ok,
    /// `204`: success with no body.
    OkNoBody,
    /// Any other status.
    Failed(StatusKind),
}

impl Outcome {
    /// Whether this outcome is one of the two success kinds.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::OkNoBody)
    }
}

/// Failure kinds shared by every endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// `400`: missing or invalid request data.
    InvalidRequest,
    /// `403`: bad token or insufficient permission.
    Forbidden,
    /// `404`: the path does not exist, or the token may not see it. The
    /// server answers both cases identically.
    InvalidPathOrNoPermission,
    /// `429`: standby node.
    Standby,
    /// `473`: performance standby node.
    PerformanceStandby,
    /// `500`: internal server error.
    InternalError,
    /// `502`: a dependency of the server failed.
    UpstreamError,
    /// `503`: sealed or down for maintenance.
    Sealed,
    /// Any status code without a documented meaning.
    UnknownStatus(u16),
}

impl StatusKind {
    /// The HTTP status code this kind was classified from.
    pub fn code(self) -> u16 {
        match self {
            Self::InvalidRequest => 400,
            Self::Forbidden => 403,
            Self::InvalidPathOrNoPermission => 404,
            Self::Standby => 429,
            Self::PerformanceStandby => 473,
            Self::InternalError => 500,
            Self::UpstreamError => 502,
            Self::Sealed => 503,
            Self::UnknownStatus(code) => code,
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::InvalidRequest => "invalid request, missing or invalid data",
            Self::Forbidden => "forbidden, token is invalid or lacks access to this path",
            Self::InvalidPathOrNoPermission => {
                "invalid path, it does not exist or the token may not view it"
            }
            Self::Standby => "node is a standby",
            Self::PerformanceStandby => "node is a performance standby",
            Self::InternalError => "internal server error",
            Self::UpstreamError => "a third party the server depends on returned an error",
            Self::Sealed => "vault is sealed or down for maintenance",
            Self::UnknownStatus(code) => return write!(f, "unknown status code {code}"),
        };
        write!(f, "{msg} [{}]", self.code())
    }
}

/// Classify a status code. Total and pure: every `u16` maps to exactly one
/// [`Outcome`].
pub fn classify(code: u16) -> Outcome {
    let kind = match code {
        200 => return Outcome::Ok,
        204 => return Outcome::OkNoBody,
        400 => StatusKind::InvalidRequest,
        403 => StatusKind::Forbidden,
        404 => StatusKind::InvalidPathOrNoPermission,
        429 => StatusKind::Standby,
        473 => StatusKind::PerformanceStandby,
        500 => StatusKind::InternalError,
        502 => StatusKind::UpstreamError,
        503 => StatusKind::Sealed,
        other => StatusKind::UnknownStatus(other),
    };
    Outcome::Failed(kind)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn documented_codes_map_to_their_outcome() {
        let cases = [
            (200, Outcome::Ok),
            (204, Outcome::OkNoBody),
            (400, Outcome::Failed(StatusKind::InvalidRequest)),
            (403, Outcome::Failed(StatusKind::Forbidden)),
            (404, Outcome::Failed(StatusKind::InvalidPathOrNoPermission)),
            (429, Outcome::Failed(StatusKind::Standby)),
            (473, Outcome::Failed(StatusKind::PerformanceStandby)),
            (500, Outcome::Failed(StatusKind::InternalError)),
            (502, Outcome::Failed(StatusKind::UpstreamError)),
            (503, Outcome::Failed(StatusKind::Sealed)),
        ];
        for (code, expected) in cases {
            assert_eq!(classify(code), expected, "status {code}");
        }
    }

    #[test]
    fn undocumented_codes_are_unknown() {
        for code in [0, 100, 201, 202, 301, 401, 405, 409, 418, 501, 504, 999, u16::MAX] {
            assert_eq!(
                classify(code),
                Outcome::Failed(StatusKind::UnknownStatus(code)),
                "status {code}"
            );
        }
    }

    #[test]
    fn classification_is_total() {
        for code in 0..=u16::MAX {
            let outcome = classify(code);
            if let Outcome::Failed(kind) = outcome {
                assert_eq!(kind.code(), code);
            }
        }
    }

    #[test]
    fn only_200_and_204_are_success() {
        assert!(classify(200).is_success());
        assert!(classify(204).is_success());
        assert!(!classify(201).is_success());
        assert!(!classify(404).is_success());
    }

    #[test]
    fn display_carries_code() {
        assert!(StatusKind::Sealed.to_string().ends_with("[503]"));
        assert_eq!(
            StatusKind::UnknownStatus(418).to_string(),
            "unknown status code 418"
        );
    }
}
