//! Issuing and verifying signed bearer tokens.

use agora_common::{
    model::{auth::Claims, user::User},
    util::PositiveDuration,
};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error,
};
use std::fmt::{Debug, Formatter};
use time::{Duration, OffsetDateTime};

pub const TOKEN_LIFETIME: Duration = Duration::hours(12);

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime: PositiveDuration,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

impl TokenIssuer {
    /// HS256 tokens signed with `secret`, valid for [`TOKEN_LIFETIME`].
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self::with_lifetime(secret, PositiveDuration::new_unchecked(TOKEN_LIFETIME))
    }

    #[must_use]
    pub fn with_lifetime(secret: &[u8], lifetime: PositiveDuration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            lifetime,
        }
    }

    #[must_use]
    pub fn lifetime(&self) -> PositiveDuration {
        self.lifetime
    }

    pub fn issue(&self, user: &User) -> Result<IssuedToken, Error> {
        self.issue_at(user, OffsetDateTime::now_utc())
    }

    pub fn issue_at(&self, user: &User, issued_at: OffsetDateTime) -> Result<IssuedToken, Error> {
        let claims = Claims::new(user, issued_at, self.lifetime);
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(IssuedToken { token, claims })
    }

    /// Checks signature and expiry and returns the embedded claims.
    pub fn verify(&self, token: &str) -> Result<Claims, Error> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }
}

impl Debug for TokenIssuer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("keys", &"[redacted]")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}
