//! The policy resolver contract consumed by the proxy core.

use url::Url;

use super::directive::Directive;
use super::error::PolicyError;

/// Answers routing questions for normalized URLs.
///
/// Implementations must be cheap to call from many concurrent sessions;
/// anything slow (downloads, disk access) belongs in an out-of-band refresh,
/// not in `find_proxy`. A failure here is never fatal to a session: the
/// caller falls back to a direct connection.
pub trait PolicyResolver: Send + Sync {
    /// Return the ordered directive list for a URL.
    ///
    /// An empty list means the policy offers nothing usable; the caller
    /// treats that the same as `DIRECT`.
    fn find_proxy(&self, url: &Url) -> Result<Vec<Directive>, PolicyError>;
}

/// A resolver that sends every request directly to its origin.
///
/// Used when no policy source is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectResolver;

impl PolicyResolver for DirectResolver {
    fn find_proxy(&self, _url: &Url) -> Result<Vec<Directive>, PolicyError> {
        Ok(vec![Directive::Direct])
    }
}
