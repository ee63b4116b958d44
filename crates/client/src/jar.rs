//! Cookie storage contract.
//!
//! The engine asks the jar for the `cookie` header of every hop before sending it, and
//! hands it every `set-cookie` value of every response. Storage, expiry and domain
//! matching are the jar's business.

use url::Url;

#[cfg_attr(test, mockall::automock)]
pub trait CookieJar: Send + Sync {
    /// The `cookie` header value to send to `url`, if any.
    fn cookies(&self, url: &Url) -> Option<String>;

    /// Stores the `set-cookie` values received from `url`.
    fn set_cookies(&self, url: &Url, cookies: Vec<String>);
}
