//! Identity providers.

mod gotrue;

pub use gotrue::{GoTrueProvider, GoTrueProviderBuilder, AUTH_KEY_ENV, AUTH_URL_ENV};
