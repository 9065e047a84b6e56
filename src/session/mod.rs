//! Sign-in, sign-up and the current session.

mod adapter;
mod provider;
pub mod providers;
mod types;

pub use adapter::SessionAdapter;
pub use provider::IdentityProvider;
pub use types::{Credentials, Identity, Session, UserId};
