//! Bearer-token authentication with silent refresh rotation.
//!
//! Dual-token system: short-lived access tokens (15 min, stateless) and
//! long-lived refresh tokens (7 days, store-tracked). An expired access
//! token is refreshed in-line when the request carries the matching refresh
//! token, and the rotated pair is returned via response headers.

mod errors;
mod gate;
mod headers;
mod ip;
mod state;

pub use errors::AuthError;
pub(crate) use errors::error_body;
pub use gate::AuthGate;
pub(crate) use gate::rotate_refresh_session;
pub use headers::{
    ACCESS_EXPIRES_AT_HEADER, NEW_ACCESS_TOKEN_HEADER, NEW_REFRESH_TOKEN_HEADER,
    REFRESH_TOKEN_HEADER, add_rotation_headers, bearer_token, refresh_token_header,
};
pub use ip::{ClientKey, client_key};
pub use state::HasAuthBackend;
