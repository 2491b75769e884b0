//! The rendering surface seam.
//!
//! [`Surface`] is the interface the server needs from the scriptable
//! content surface it drives: script evaluation, navigation, image
//! capture, the cookie jar, and history. Implementations are confined to a
//! single owner thread (see [`bridge`](crate::bridge)) and therefore need
//! not be `Send`.

use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;

/// Faults raised by the surface itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceFault {
    /// Script evaluation failed.
    #[error("script evaluation failed: {0}")]
    Script(String),

    /// Navigation was refused or failed.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The surface could not render an image.
    #[error("image capture failed: {0}")]
    Capture(String),

    /// The cookie jar could not be read.
    #[error("cookie access failed: {0}")]
    Cookies(String),

    /// The surface does not offer this operation.
    #[error("operation not supported by this surface: {0}")]
    Unsupported(&'static str),
}

/// A cookie held by the surface's cookie jar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub domain: String,
    pub secure: bool,
    /// `None` for session cookies.
    pub expiry: Option<DateTime<Utc>>,
}

/// A scriptable content surface owned by one thread.
pub trait Surface {
    /// Evaluates `script` and returns its string result, if any.
    fn evaluate(&mut self, script: &str) -> Result<Option<String>, SurfaceFault>;

    /// Starts loading `uri`.
    fn navigate(&mut self, uri: &Url) -> Result<(), SurfaceFault>;

    /// Renders the current content as an encoded image (PNG).
    fn capture_image(&mut self) -> Result<Vec<u8>, SurfaceFault>;

    /// Returns the cookies visible to the current document.
    fn cookies(&mut self) -> Result<Vec<Cookie>, SurfaceFault>;

    fn can_go_back(&self) -> bool;

    fn can_go_forward(&self) -> bool;

    fn go_back(&mut self);

    fn go_forward(&mut self);
}
