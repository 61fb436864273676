//! Device identity and connectivity ports.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;

use crate::util::normalize_text_option;

const EXPIRY_SKEW_SECONDS: i64 = 60;

/// Bearer credential for the score API.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Option<Self> {
        normalize_text_option(Some(token.into())).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("AccessToken([REDACTED])")
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No device token is configured")]
    MissingToken,
    #[error("Device token expired at {0}")]
    Expired(i64),
    #[error("Device token refresh failed: {0}")]
    Refresh(String),
}

/// The authenticated device a round uploads as.
#[async_trait]
pub trait DeviceIdentity: Send + Sync {
    fn device_id(&self) -> &str;

    fn is_token_valid(&self) -> bool;

    /// Return a usable token, refreshing it first if it has expired
    async fn refresh_if_needed(&self) -> Result<AccessToken, AuthError>;
}

/// Identity with a fixed, pre-provisioned token.
///
/// It cannot refresh; once the token expires every round fails with
/// [`AuthError::Expired`] until a new token is configured.
#[derive(Clone)]
pub struct StaticDeviceIdentity {
    device_id: String,
    token: Option<AccessToken>,
    /// Unix seconds; `None` means the token never expires
    expires_at: Option<i64>,
}

impl StaticDeviceIdentity {
    pub fn new(device_id: impl Into<String>, token: Option<AccessToken>) -> Self {
        Self {
            device_id: device_id.into(),
            token,
            expires_at: None,
        }
    }

    #[must_use]
    pub const fn expires_at(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= unix_timestamp_now() + EXPIRY_SKEW_SECONDS)
    }
}

impl fmt::Debug for StaticDeviceIdentity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("StaticDeviceIdentity")
            .field("device_id", &self.device_id)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[async_trait]
impl DeviceIdentity for StaticDeviceIdentity {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn is_token_valid(&self) -> bool {
        self.token.is_some() && !self.is_expired()
    }

    async fn refresh_if_needed(&self) -> Result<AccessToken, AuthError> {
        let token = self.token.clone().ok_or(AuthError::MissingToken)?;
        match self.expires_at {
            Some(expires_at) if self.is_expired() => Err(AuthError::Expired(expires_at)),
            _ => Ok(token),
        }
    }
}

/// Network reachability signal consulted before each round.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Assume the network is always there and let the transport find out.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Connectivity flag flipped by the host (e.g. from an OS network callback).
#[derive(Debug)]
pub struct ManualConnectivity {
    online: AtomicBool,
}

impl ManualConnectivity {
    pub const fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }
}

impl Default for ManualConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ManualConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }
}

fn unix_timestamp_now() -> i64 {
    chrono::Utc::now().timestamp()
}
