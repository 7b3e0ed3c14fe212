// Authentication module
// Manages the credential lifecycle: storage, expiry, single-flight refresh,
// and the interceptors every outbound request passes through

mod credentials;
mod expiry;
mod interceptor;
mod manager;
mod redirect;
mod refresh;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use credentials::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore};
pub use expiry::{token_expiry, ExpiryOracle};
pub use interceptor::{RequestInterceptor, ResponseInterceptor};
pub use manager::RefreshCoordinator;
pub use redirect::{ConsoleRedirect, LoginRedirect, RedirectGate, SESSION_EXPIRED};
pub use refresh::{AuthBackend, HttpAuthBackend, REFRESH_PATH};
pub use types::{error_detail, CredentialPair, RefreshResponse, Token, UserProfile};
