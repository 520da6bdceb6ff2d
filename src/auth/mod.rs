mod credential;
mod errors;
pub mod google;
mod manager;
mod redirect;

pub use credential::{Credential, CredentialStore, EXPIRY_MARGIN_SECS};
pub use errors::AuthError;
pub use google::{ClientSecrets, GoogleOAuth};
pub use manager::{CredentialManager, CredentialSource, IdentityProvider};
