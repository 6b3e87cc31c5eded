//! Signed session cookie
//!
//! Every request is tied to a server-side session through the
//! `azchat_session` cookie. The cookie carries `<id>.<signature>`, where the
//! signature is an HMAC-SHA256 of the id keyed by the session secret, so a
//! client can neither forge nor pick another session id. A missing or
//! tampered cookie starts a new session.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::SET_COOKIE, HeaderValue},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Cookie, HeaderMapExt};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::server::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "azchat_session";

/// Session id of the current request, inserted by [`session_middleware`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Key used to sign and verify session cookies
#[derive(Clone)]
pub struct SessionKey {
    secret: Arc<[u8]>,
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

impl SessionKey {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: Arc::from(secret.as_bytes()),
        }
    }

    /// Key from `secret`, or a random per-process key when none is configured.
    ///
    /// With a random key every restart logs all users out.
    pub fn from_config(secret: Option<&str>) -> Self {
        match secret {
            Some(secret) if !secret.is_empty() => Self::new(secret),
            _ => {
                warn!("SESSION_SECRET is not set; using a random key, sessions will not survive a restart");
                let random = format!(
                    "{}{}",
                    uuid::Uuid::new_v4().simple(),
                    uuid::Uuid::new_v4().simple()
                );
                Self::new(&random)
            }
        }
    }

    fn mac(&self) -> Option<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).ok()
    }

    /// Cookie value for `session_id`
    pub fn sign(&self, session_id: &str) -> Option<String> {
        let mut mac = self.mac()?;
        mac.update(session_id.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Some(format!("{}.{}", session_id, signature))
    }

    /// Session id carried by `value`, if its signature is valid
    pub fn verify(&self, value: &str) -> Option<String> {
        let (session_id, signature) = value.rsplit_once('.')?;
        if session_id.is_empty() {
            return None;
        }
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac()?;
        mac.update(session_id.as_bytes());
        mac.verify_slice(&signature).ok()?;

        Some(session_id.to_string())
    }
}

/// Mint a fresh, unguessable session id
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// `Set-Cookie` value for a signed session id
fn session_cookie(key: &SessionKey, session_id: &str, max_age_secs: i64) -> Option<String> {
    Some(format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        SESSION_COOKIE,
        key.sign(session_id)?,
        max_age_secs
    ))
}

/// Resolve the session cookie, expose it to handlers as [`SessionId`] and
/// refresh it on the way out.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .typed_get::<Cookie>()
        .and_then(|cookie| cookie.get(SESSION_COOKIE).map(str::to_string));

    let session_id = match presented.as_deref() {
        Some(value) => state.session_key.verify(value).unwrap_or_else(|| {
            warn!("Rejected session cookie with an invalid signature");
            new_session_id()
        }),
        None => {
            let id = new_session_id();
            debug!("Starting session {}", id);
            id
        }
    };

    request.extensions_mut().insert(SessionId(session_id.clone()));
    let mut response = next.run(request).await;

    let cookie = session_cookie(
        &state.session_key,
        &session_id,
        state.session_lifetime.num_seconds(),
    );
    match cookie.map(|c| HeaderValue::from_str(&c)) {
        Some(Ok(value)) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Some(Err(e)) => warn!("Could not encode session cookie: {}", e),
        None => warn!("Could not sign session cookie"),
    }

    response
}
