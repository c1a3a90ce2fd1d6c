pub mod identity;
pub mod rate_limit;
pub mod redaction;
pub mod validation;

pub use identity::{IdentityProvider, StaticIdentity};
pub use rate_limit::{AdmissionControl, RateLimitEntry, RateLimiter};
pub use redaction::{RedactingWriter, redact_secrets};
pub use validation::InputValidator;
