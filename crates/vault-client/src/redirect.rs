//! Login redirect hook.
//!
//! When a refresh fails the session is cleared and the user has to sign in
//! again. The web console does a full-page navigation to its login screen;
//! embedders of this crate decide what "go to login" means for them by
//! implementing [`LoginRedirect`].

use tracing::warn;

/// Sends the user back to the login entry point.
///
/// Called exactly once per refresh failure that ends the session (see
/// [`RefreshFailure::ends_session`](crate::RefreshFailure::ends_session)),
/// after the session has been cleared and before any waiting request
/// observes the failure.
pub trait LoginRedirect: Send + Sync + 'static {
    /// Navigate to `login_path`.
    fn redirect_to_login(&self, login_path: &str);
}

/// Default redirect: records the forced sign-out in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRedirect;

impl LoginRedirect for TracingRedirect {
    fn redirect_to_login(&self, login_path: &str) {
        warn!(login_path = %login_path, "session expired, sign in again");
    }
}

impl<F> LoginRedirect for F
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn redirect_to_login(&self, login_path: &str) {
        self(login_path);
    }
}
