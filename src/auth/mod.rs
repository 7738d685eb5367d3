//! Authentication module
//!
//! Credential persistence and the OAuth2 token lifecycle.

pub mod credential;
pub mod token;

pub use credential::{Credential, CredentialStore, JsonFileStore, MemoryStore};
pub use token::{extract_code, should_renew, OAuthApp, TokenManager, AUTHORIZE_URL, TOKEN_URL};
