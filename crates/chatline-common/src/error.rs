use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    General(String),

    /// Raw persistence failure. Never crosses the orchestrator boundary.
    #[error("database error: {0}")]
    Database(String),

    /// Raw provider failure. Mapped before leaving the reply loop.
    #[error("provider error: {0}")]
    Provider(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The closed set of failure kinds callers are allowed to observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    Auth,
    ServiceUnavailable,
    MalformedResponse,
    Storage,
    General,
}

impl ErrorKind {
    /// Text shown in the synthetic reply turn when a send fails.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::RateLimited => {
                "You're sending messages too quickly. Please wait a moment and try again."
            }
            ErrorKind::Auth => "Your session has expired. Please sign in again.",
            ErrorKind::ServiceUnavailable => {
                "This contact is unavailable right now. Please try again later."
            }
            ErrorKind::MalformedResponse => {
                "Sorry, I couldn't put together a reply. Please try sending that again."
            }
            ErrorKind::Storage => "Your message couldn't be saved. Please try again.",
            ErrorKind::General => "Something went wrong. Please try again.",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Auth => "auth",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::Storage => "storage",
            ErrorKind::General => "general",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::RateLimited(_) => ErrorKind::RateLimited,
            Error::Auth(_) => ErrorKind::Auth,
            Error::ServiceUnavailable(_) | Error::Provider(_) => ErrorKind::ServiceUnavailable,
            Error::MalformedResponse(_) => ErrorKind::MalformedResponse,
            Error::Storage(_) | Error::Database(_) | Error::Io(_) | Error::Serialization(_) => {
                ErrorKind::Storage
            }
            Error::General(_) | Error::Config(_) => ErrorKind::General,
        }
    }

    /// Rewrite internal variants into their taxonomy counterpart.
    pub fn into_taxonomy(self) -> Self {
        match self {
            Error::Database(msg) => Error::Storage(msg),
            Error::Io(e) => Error::Storage(e.to_string()),
            Error::Serialization(e) => Error::Storage(e.to_string()),
            Error::Provider(msg) => Error::ServiceUnavailable(msg),
            Error::Config(msg) => Error::General(msg),
            other => other,
        }
    }

    pub fn is_taxonomy(&self) -> bool {
        matches!(
            self,
            Error::RateLimited(_)
                | Error::Auth(_)
                | Error::ServiceUnavailable(_)
                | Error::MalformedResponse(_)
                | Error::Storage(_)
                | Error::General(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_variants_map_onto_taxonomy() {
        assert_eq!(Error::Database("x".into()).kind(), ErrorKind::Storage);
        assert_eq!(
            Error::Provider("x".into()).kind(),
            ErrorKind::ServiceUnavailable
        );
        assert_eq!(Error::Config("x".into()).kind(), ErrorKind::General);

        let io = Error::Io(std::io::Error::other("disk gone"));
        assert!(matches!(io.into_taxonomy(), Error::Storage(msg) if msg.contains("disk gone")));
    }

    #[test]
    fn into_taxonomy_keeps_caller_facing_variants() {
        let err = Error::RateLimited("slow down".into()).into_taxonomy();
        assert!(matches!(err, Error::RateLimited(_)));
        assert!(err.is_taxonomy());
        assert!(!Error::Database("x".into()).is_taxonomy());
    }

    #[test]
    fn every_kind_has_a_user_message() {
        for kind in [
            ErrorKind::RateLimited,
            ErrorKind::Auth,
            ErrorKind::ServiceUnavailable,
            ErrorKind::MalformedResponse,
            ErrorKind::Storage,
            ErrorKind::General,
        ] {
            assert!(!kind.user_message().is_empty());
        }
    }
}
