//! JSON wire protocol codec.
//!
//! Every command answers with the same envelope:
//!
//! ```text
//! {"sessionId": "<id>", "status": <code>, "value": <any>}
//! ```
//!
//! `status` is `0` on success and otherwise one of the [`WireStatus`] codes.
//! Failed envelopes carry `{"message": "..."}` as their value.
//!
//! This module also holds the fixed documents the server hands out
//! (`/status` metadata and session capabilities) and the cookie
//! conversions between the surface's cookie jar and the wire format.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::driver::Cookie;

/// Message used for unmatched routes and stubbed commands.
pub const UNKNOWN_COMMAND_MESSAGE: &str =
    "Command could not be mapped to appropriate REST resource, check your session Id.";

/// Key of the object form used to exchange element references.
pub const ELEMENT_KEY: &str = "ELEMENT";

/// Key of the object form used to pass a frame to atoms.
pub const WINDOW_KEY: &str = "WINDOW";

const BROWSER_NAME: &str = "wirehost";

/// Status taxonomy of the JSON wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireStatus {
    Success,
    NoSuchDriver,
    NoSuchElement,
    NoSuchFrame,
    UnknownCommand,
    StaleElementReference,
    ElementNotVisible,
    InvalidElementState,
    UnknownError,
    ElementIsNotSelectable,
    JavaScriptError,
    XPathLookupError,
    Timeout,
    NoSuchWindow,
    InvalidCookieDomain,
    UnableToSetCookie,
    UnexpectedAlertOpen,
    NoAlertOpenError,
    ScriptTimeout,
    InvalidElementCoordinates,
    ImeNotAvailable,
    ImeEngineActivationFailed,
    InvalidSelector,
    SessionNotCreated,
    MoveTargetOutOfBounds,
}

impl WireStatus {
    const ALL: [WireStatus; 25] = [
        WireStatus::Success,
        WireStatus::NoSuchDriver,
        WireStatus::NoSuchElement,
        WireStatus::NoSuchFrame,
        WireStatus::UnknownCommand,
        WireStatus::StaleElementReference,
        WireStatus::ElementNotVisible,
        WireStatus::InvalidElementState,
        WireStatus::UnknownError,
        WireStatus::ElementIsNotSelectable,
        WireStatus::JavaScriptError,
        WireStatus::XPathLookupError,
        WireStatus::Timeout,
        WireStatus::NoSuchWindow,
        WireStatus::InvalidCookieDomain,
        WireStatus::UnableToSetCookie,
        WireStatus::UnexpectedAlertOpen,
        WireStatus::NoAlertOpenError,
        WireStatus::ScriptTimeout,
        WireStatus::InvalidElementCoordinates,
        WireStatus::ImeNotAvailable,
        WireStatus::ImeEngineActivationFailed,
        WireStatus::InvalidSelector,
        WireStatus::SessionNotCreated,
        WireStatus::MoveTargetOutOfBounds,
    ];

    /// Numeric code sent on the wire.
    pub fn code(self) -> u16 {
        match self {
            WireStatus::Success => 0,
            WireStatus::NoSuchDriver => 6,
            WireStatus::NoSuchElement => 7,
            WireStatus::NoSuchFrame => 8,
            WireStatus::UnknownCommand => 9,
            WireStatus::StaleElementReference => 10,
            WireStatus::ElementNotVisible => 11,
            WireStatus::InvalidElementState => 12,
            WireStatus::UnknownError => 13,
            WireStatus::ElementIsNotSelectable => 15,
            WireStatus::JavaScriptError => 17,
            WireStatus::XPathLookupError => 19,
            WireStatus::Timeout => 21,
            WireStatus::NoSuchWindow => 23,
            WireStatus::InvalidCookieDomain => 24,
            WireStatus::UnableToSetCookie => 25,
            WireStatus::UnexpectedAlertOpen => 26,
            WireStatus::NoAlertOpenError => 27,
            WireStatus::ScriptTimeout => 28,
            WireStatus::InvalidElementCoordinates => 29,
            WireStatus::ImeNotAvailable => 30,
            WireStatus::ImeEngineActivationFailed => 31,
            WireStatus::InvalidSelector => 32,
            WireStatus::SessionNotCreated => 33,
            WireStatus::MoveTargetOutOfBounds => 34,
        }
    }

    /// Looks up a status by its wire code.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    pub fn is_success(self) -> bool {
        self == WireStatus::Success
    }
}

impl Serialize for WireStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.code())
    }
}

/// The `{sessionId, status, value}` response envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireEnvelope {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub status: WireStatus,
    pub value: Value,
}

impl WireEnvelope {
    /// A status-0 envelope carrying `value`.
    pub fn success(session_id: impl Into<String>, value: Value) -> Self {
        Self {
            session_id: session_id.into(),
            status: WireStatus::Success,
            value,
        }
    }

    /// A failed envelope whose value is `{"message": message}`.
    pub fn failure(session_id: impl Into<String>, status: WireStatus, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            status,
            value: json!({ "message": message.into() }),
        }
    }
}

/// The `{status, value}` document every atom writes back.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AtomReply {
    pub status: u16,
    #[serde(default)]
    pub value: Value,
}

impl AtomReply {
    /// Splits the reply into its value or a `(status, message)` failure.
    ///
    /// Unknown nonzero codes are reported as [`WireStatus::UnknownError`].
    pub fn into_result(self) -> Result<Value, (WireStatus, String)> {
        if self.status == 0 {
            return Ok(self.value);
        }
        let status = WireStatus::from_code(self.status).unwrap_or(WireStatus::UnknownError);
        let message = self
            .value
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.value.to_string());
        Err((status, message))
    }
}

/// Capabilities reported for the single session.
pub fn capabilities() -> Value {
    json!({
        "browserName": BROWSER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "platform": std::env::consts::OS.to_uppercase(),
        "javascriptEnabled": true,
        "takesScreenshot": true,
        "handlesAlerts": false,
        "databaseEnabled": false,
        "locationContextEnabled": false,
        "applicationCacheEnabled": false,
        "browserConnectionEnabled": false,
        "cssSelectorsEnabled": true,
        "webStorageEnabled": false,
        "rotatable": false,
        "acceptSslCerts": true,
        "nativeEvents": false,
    })
}

/// Server metadata returned by `GET /status`.
pub fn status_document() -> Value {
    json!({
        "build": { "version": env!("CARGO_PKG_VERSION") },
        "os": {
            "name": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        },
    })
}

/// Converts a cookie from the surface's jar to its wire object.
pub fn cookie_to_wire(cookie: &Cookie) -> Value {
    let mut value = json!({
        "name": cookie.name,
        "value": cookie.value,
        "path": cookie.path,
        "domain": cookie.domain,
        "secure": cookie.secure,
    });
    if let (Some(expiry), Some(object)) = (cookie.expiry, value.as_object_mut()) {
        object.insert("expiry".to_string(), json!(expiry.timestamp()));
    }
    value
}

/// A cookie as sent by the client in `POST /session/:id/cookie`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CookieSpec {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub secure: bool,
    /// Expiry in seconds since the epoch.
    #[serde(default)]
    pub expiry: Option<f64>,
}

impl CookieSpec {
    /// Renders the `Set-Cookie` style string assigned to `document.cookie`.
    pub fn to_set_cookie(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(expires) = self.expiry.and_then(epoch_to_datetime) {
            out.push_str("; expires=");
            out.push_str(&http_date(&expires));
        }
        if let Some(path) = self.path.as_deref().filter(|p| !p.is_empty()) {
            out.push_str("; path=");
            out.push_str(path);
        }
        if let Some(domain) = self.domain.as_deref().filter(|d| !d.is_empty()) {
            out.push_str("; domain=");
            out.push_str(domain);
        }
        if self.secure {
            out.push_str("; secure");
        }
        out
    }
}

/// `Set-Cookie` string that expires `name` immediately.
pub fn expire_cookie(name: &str) -> String {
    let epoch = Utc.timestamp_opt(0, 0).single().unwrap_or_default();
    format!("{name}=; expires={}; path=/", http_date(&epoch))
}

fn epoch_to_datetime(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    Utc.timestamp_opt(seconds.trunc() as i64, 0).single()
}

fn http_date(at: &DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
