//! JWT issuance and verification for the access/refresh token pair.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::db::{Identity, UserRole};

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived token presented on every request
    Access,
    /// Long-lived token exchanged for a new pair, tracked in the session store
    Refresh,
}

/// JWT claims. Both token types share one shape; `typ` tells them apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Username
    pub username: String,
    /// Email
    pub email: String,
    /// User role
    pub role: UserRole,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// JWT ID; makes back-to-back tokens distinct strings
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Default access token lifetime: 15 minutes
pub const DEFAULT_ACCESS_TTL_SECS: u64 = 15 * 60;

/// Default refresh token lifetime: 7 days
pub const DEFAULT_REFRESH_TTL_SECS: u64 = 7 * 24 * 60 * 60;

fn unix_now() -> Result<u64, JwtError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| JwtError::TimeError)?
        .as_secs())
}

impl Claims {
    /// Build claims for a user with a fresh `jti` and the given lifetime.
    pub fn new(identity: &Identity, token_type: TokenType, ttl_secs: u64) -> Result<Self, JwtError> {
        let now = unix_now()?;
        Ok(Self {
            sub: identity.id.to_string(),
            username: identity.username.clone(),
            email: identity.email.clone(),
            role: identity.role,
            token_type,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp: now + ttl_secs,
        })
    }

    /// Parse the subject back into a user id.
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

/// Signing secrets and token lifetimes. Immutable once built; constructors
/// take it by reference rather than reading globals.
#[derive(Clone)]
pub struct AuthConfig {
    /// Secret for signing/verifying access tokens
    pub access_secret: String,
    /// Secret for signing/verifying refresh tokens; must differ from the
    /// access secret so one leaked key cannot mint the other token type
    pub refresh_secret: String,
    /// Access token lifetime in seconds
    pub access_ttl_secs: u64,
    /// Refresh token lifetime in seconds
    pub refresh_ttl_secs: u64,
}

impl AuthConfig {
    /// Config with the default lifetimes.
    pub fn new(access_secret: &str, refresh_secret: &str) -> Self {
        Self {
            access_secret: access_secret.to_string(),
            refresh_secret: refresh_secret.to_string(),
            access_ttl_secs: DEFAULT_ACCESS_TTL_SECS,
            refresh_ttl_secs: DEFAULT_REFRESH_TTL_SECS,
        }
    }
}

/// A freshly minted access/refresh pair with its expiry instants.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry (Unix seconds)
    pub access_expires_at: u64,
    /// Refresh token expiry (Unix seconds)
    pub refresh_expires_at: u64,
}

/// A single minted token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
}

/// Signs and verifies tokens. Each token type gets its own key pair, so an
/// access token can never verify as a refresh token even before the `typ`
/// claim is checked.
#[derive(Clone)]
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl_secs: config.access_ttl_secs,
            refresh_ttl_secs: config.refresh_ttl_secs,
        }
    }

    /// Mint a single token of the given type for a user.
    pub fn issue(&self, identity: &Identity, token_type: TokenType) -> Result<IssuedToken, JwtError> {
        let (key, ttl) = match token_type {
            TokenType::Access => (&self.access_encoding, self.access_ttl_secs),
            TokenType::Refresh => (&self.refresh_encoding, self.refresh_ttl_secs),
        };

        let claims = Claims::new(identity, token_type, ttl)?;

        let token = jsonwebtoken::encode(&Header::default(), &claims, key)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }

    /// Mint an access/refresh pair for a user. The caller persists the
    /// refresh half in the session store.
    pub fn issue_pair(&self, identity: &Identity) -> Result<TokenPair, JwtError> {
        let access = self.issue(identity, TokenType::Access)?;
        let refresh = self.issue(identity, TokenType::Refresh)?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            access_expires_at: access.expires_at,
            refresh_expires_at: refresh.expires_at,
        })
    }

    /// Validate and decode a token, requiring the expected type.
    ///
    /// Expiry is strict (zero leeway) and reported as [`JwtError::Expired`],
    /// distinct from garbage or a bad signature. Callers branch on that
    /// distinction: only an expired access token may fall back to refresh.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
        let key = match expected {
            TokenType::Access => &self.access_decoding,
            TokenType::Refresh => &self.refresh_decoding,
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data = jsonwebtoken::decode::<Claims>(token, key, &validation)
            .map_err(JwtError::from_decode)?;

        if token_data.claims.token_type != expected {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Token is past its `exp` claim
    Expired,
    /// Signature does not match the expected key
    InvalidSignature,
    /// Not a decodable JWT (structure, encoding, or claim shape)
    Malformed,
    /// Wrong token type (e.g., using a refresh token as an access token)
    WrongTokenType,
    /// System time error
    TimeError,
}

impl JwtError {
    fn from_decode(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidSignature => JwtError::InvalidSignature,
            _ => JwtError::Malformed,
        }
    }
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Expired => write!(f, "Token has expired"),
            JwtError::InvalidSignature => write!(f, "Invalid token signature"),
            JwtError::Malformed => write!(f, "Malformed token"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
            JwtError::TimeError => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for JwtError {}
