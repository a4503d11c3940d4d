use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::HeaderMap;
use http::header::AUTHORIZATION;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("authorization header is not valid UTF-8")]
    NotUtf8,
    #[error("basic credentials are not valid base64")]
    InvalidBase64,
    #[error("basic credentials are missing the ':' separator")]
    MissingSeparator,
}

/// Username and secret from an HTTP Basic `Authorization` header.
pub struct BasicCredentials {
    user: String,
    secret: Zeroizing<String>,
}

impl BasicCredentials {
    pub fn new(user: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            secret: Zeroizing::new(secret.into()),
        }
    }

    /// `Ok(None)` when the request carries no Basic credentials at all.
    pub fn from_headers(headers: &HeaderMap) -> Result<Option<Self>, CredentialsError> {
        let Some(value) = headers.get(AUTHORIZATION) else {
            return Ok(None);
        };
        let value = value.to_str().map_err(|_| CredentialsError::NotUtf8)?;
        let Some(encoded) = strip_scheme(value, "basic") else {
            return Ok(None);
        };
        let decoded = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|_| CredentialsError::InvalidBase64)?,
        );
        let decoded =
            Zeroizing::new(String::from_utf8(decoded.to_vec()).map_err(|_| CredentialsError::NotUtf8)?);
        let (user, secret) = decoded
            .split_once(':')
            .ok_or(CredentialsError::MissingSeparator)?;
        Ok(Some(Self::new(user, secret)))
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// `user:secret`, the form `auth_key` rules are configured with.
    pub fn joined(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("{}:{}", self.user, self.secret.as_str()))
    }

    pub fn sha256_hex(&self) -> String {
        sha256_hex(self.joined().as_bytes())
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Token following `scheme` (case-insensitive) in an `Authorization` value.
pub fn strip_scheme<'a>(value: &'a str, scheme: &str) -> Option<&'a str> {
    let (head, rest) = value.trim().split_once(' ')?;
    head.eq_ignore_ascii_case(scheme).then_some(rest)
}

pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
