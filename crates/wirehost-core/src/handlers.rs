//! Session and command dispatch.
//!
//! [`ServerState`] owns everything a command can touch: the single
//! [`Session`], the [`ReferenceTable`], and the [`SurfaceExecutor`] that
//! reaches the surface-owner thread. [`ServerState::dispatch`] runs one
//! command and always produces a response; failures are converted in one
//! place, [`CommandError::into_response`].
//!
//! Session IDs in request paths are not checked against the current
//! session. Every response echoes the current session ID instead.

use base64::Engine as _;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use url::Url;

use crate::atoms::Atom;
use crate::bridge::BridgeError;
use crate::commands::Command;
use crate::driver::SurfaceFault;
use crate::element::{is_element_id, FrameHandle, FrameRef, ReferenceError, ReferenceTable};
use crate::executor::{ScriptError, SurfaceExecutor};
use crate::http::{HttpRequest, HttpResponse};
use crate::protocol::{
    capabilities, cookie_to_wire, expire_cookie, status_document, CookieSpec, WireEnvelope,
    WireStatus, ELEMENT_KEY, UNKNOWN_COMMAND_MESSAGE, WINDOW_KEY,
};
use crate::router::PathParams;
use crate::session::Session;

/// Handle of the only window the server exposes.
pub const WINDOW_HANDLE: &str = "current";

const TITLE_SCRIPT: &str = "return document.title;";
const SOURCE_SCRIPT: &str = "return document.documentElement.outerHTML;";
const LOCATION_SCRIPT: &str = "window.location.href";

/// Why a command could not produce a value.
#[derive(Error, Debug)]
pub enum CommandError {
    /// A failure with a specific wire status.
    #[error("{message}")]
    Wire { status: WireStatus, message: String },

    /// The request was missing or carried malformed parameters.
    ///
    /// Answered with HTTP `400` and an unknown-error envelope.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A known command the server does not implement.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Surface(#[from] SurfaceFault),

    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

impl CommandError {
    fn wire(status: WireStatus, message: impl Into<String>) -> Self {
        CommandError::Wire {
            status,
            message: message.into(),
        }
    }

    /// Maps the error to its HTTP response.
    pub fn into_response(self, session_id: &str) -> HttpResponse {
        let (http_status, status, message) = match self {
            CommandError::NotImplemented(_) => return unknown_command_response(session_id),
            CommandError::InvalidArgument(message) => (400, WireStatus::UnknownError, message),
            CommandError::Wire { status, message } => (500, status, message),
            CommandError::Reference(err @ ReferenceError::UnknownElement(_)) => {
                (500, WireStatus::NoSuchElement, err.to_string())
            }
            CommandError::Reference(err @ ReferenceError::StaleElement(_)) => {
                (500, WireStatus::StaleElementReference, err.to_string())
            }
            CommandError::Surface(SurfaceFault::Script(message)) => {
                (500, WireStatus::JavaScriptError, message)
            }
            other => (500, WireStatus::UnknownError, other.to_string()),
        };
        envelope_response(http_status, &WireEnvelope::failure(session_id, status, message))
    }
}

/// The `501` answer for unmatched routes and stubbed commands.
pub fn unknown_command_response(session_id: &str) -> HttpResponse {
    envelope_response(
        501,
        &WireEnvelope::failure(session_id, WireStatus::UnknownCommand, UNKNOWN_COMMAND_MESSAGE),
    )
}

/// Serializes `envelope` as the JSON body of a response.
fn envelope_response(status: u16, envelope: &WireEnvelope) -> HttpResponse {
    match serde_json::to_string(envelope) {
        Ok(body) => HttpResponse::json(status, body),
        Err(e) => {
            warn!(error = %e, "Failed to encode envelope");
            HttpResponse::internal_error()
        }
    }
}

/// What a command produced.
enum Outcome {
    /// Wrapped in a success envelope.
    Value(Value),
    /// Sent as is.
    Response(HttpResponse),
}

#[derive(Deserialize)]
struct UrlBody {
    url: String,
}

#[derive(Deserialize)]
struct LocatorBody {
    using: String,
    value: String,
}

#[derive(Deserialize)]
struct KeysBody {
    value: Vec<String>,
}

#[derive(Deserialize)]
struct ScriptBody {
    script: String,
    #[serde(default)]
    args: Vec<Value>,
}

#[derive(Deserialize)]
struct FrameBody {
    #[serde(default)]
    id: Value,
}

#[derive(Deserialize)]
struct CookieBody {
    cookie: CookieSpec,
}

/// State shared by every connection.
pub struct ServerState {
    session: Option<Session>,
    refs: ReferenceTable,
    executor: SurfaceExecutor,
}

impl ServerState {
    pub fn new(executor: SurfaceExecutor) -> Self {
        Self {
            session: None,
            refs: ReferenceTable::new(),
            executor,
        }
    }

    /// The ID echoed in envelopes; empty when no session exists.
    pub fn session_id(&self) -> String {
        self.session
            .as_ref()
            .map(|session| session.id().to_string())
            .unwrap_or_default()
    }

    /// Runs `command` and builds its response.
    pub async fn dispatch(
        &mut self,
        command: Command,
        request: &HttpRequest,
        params: &PathParams,
    ) -> HttpResponse {
        let span = info_span!("command", name = command.name());
        async move {
            match self.execute(command, request, params).await {
                Ok(Outcome::Value(value)) => {
                    envelope_response(200, &WireEnvelope::success(self.session_id(), value))
                }
                Ok(Outcome::Response(response)) => response,
                Err(err) => {
                    match &err {
                        CommandError::NotImplemented(name) => debug!(command = *name, "Not implemented"),
                        CommandError::Wire { status, message } => {
                            debug!(status = status.code(), %message, "Command failed")
                        }
                        other => warn!(error = %other, "Command failed"),
                    }
                    err.into_response(&self.session_id())
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &mut self,
        command: Command,
        request: &HttpRequest,
        params: &PathParams,
    ) -> Result<Outcome, CommandError> {
        let value = match command {
            Command::Status => status_document(),
            Command::NewSession => return Ok(Outcome::Response(self.new_session())),
            Command::GetSession => capabilities(),
            Command::DeleteSession => self.delete_session(),
            Command::GetUrl => self.current_url(),
            Command::SetUrl => self.set_url(body(request)?).await?,
            Command::Forward => self.history(true).await?,
            Command::Back => self.history(false).await?,
            Command::Refresh => self.refresh().await?,
            Command::Title => self.execute_fixed(TITLE_SCRIPT).await?,
            Command::Source => self.execute_fixed(SOURCE_SCRIPT).await?,
            Command::Screenshot => self.screenshot().await?,
            Command::WindowHandle => json!(WINDOW_HANDLE),
            Command::WindowHandles => json!([WINDOW_HANDLE]),
            Command::FindElement => self.find(body(request)?, None, false).await?,
            Command::FindElements => self.find(body(request)?, None, true).await?,
            Command::FindChildElement => {
                let root = param(params, "id")?;
                self.find(body(request)?, Some(root), false).await?
            }
            Command::FindChildElements => {
                let root = param(params, "id")?;
                self.find(body(request)?, Some(root), true).await?
            }
            Command::ActiveElement => self.atom(Atom::ActiveElement, Vec::new()).await?,
            Command::ElementEquals => {
                let this = self.refs.resolve_element(param(params, "id")?)?;
                let other = self.refs.resolve_element(param(params, "other")?)?;
                json!(this == other)
            }
            Command::ElementClick => self.element_atom(Atom::Click, params, Vec::new()).await?,
            Command::ElementSubmit => self.element_atom(Atom::Submit, params, Vec::new()).await?,
            Command::ElementClear => self.element_atom(Atom::Clear, params, Vec::new()).await?,
            Command::ElementSendKeys => {
                let keys: KeysBody = body(request)?;
                self.element_atom(Atom::SendKeys, params, vec![json!(keys.value)])
                    .await?
            }
            Command::ElementText => self.element_atom(Atom::Text, params, Vec::new()).await?,
            Command::ElementTagName => self.element_atom(Atom::TagName, params, Vec::new()).await?,
            Command::ElementAttribute => {
                let name = param(params, "name")?;
                self.element_atom(Atom::Attribute, params, vec![json!(name)])
                    .await?
            }
            Command::ElementCss => {
                let property = param(params, "propertyName")?;
                self.element_atom(Atom::Css, params, vec![json!(property)])
                    .await?
            }
            Command::ElementSize => self.element_atom(Atom::Size, params, Vec::new()).await?,
            Command::ElementLocation => self.element_atom(Atom::Location, params, Vec::new()).await?,
            Command::ElementDisplayed => self.element_atom(Atom::Displayed, params, Vec::new()).await?,
            Command::ElementEnabled => self.element_atom(Atom::Enabled, params, Vec::new()).await?,
            Command::ElementSelected => self.element_atom(Atom::Selected, params, Vec::new()).await?,
            Command::ExecuteScript => self.execute_script(body(request)?).await?,
            Command::SwitchFrame => self.switch_frame(body(request)?).await?,
            Command::GetCookies => self.cookies().await?,
            Command::AddCookie => {
                let CookieBody { cookie } = body(request)?;
                self.assign_cookies(&[cookie.to_set_cookie()]).await?
            }
            Command::DeleteCookies => self.delete_cookies().await?,
            Command::DeleteCookie => {
                let name = param(params, "name")?;
                self.assign_cookies(&[expire_cookie(name)]).await?
            }
            Command::Unsupported(name) => return Err(CommandError::NotImplemented(name)),
        };
        Ok(Outcome::Value(value))
    }

    // ── Session ─────────────────────────────────────────────────────────

    fn new_session(&mut self) -> HttpResponse {
        let session = Session::new();
        info!(session = %session.id(), "Session created");
        self.refs.clear();
        let location = session.path();
        self.session = Some(session);
        HttpResponse::see_other(location)
    }

    fn delete_session(&mut self) -> Value {
        if let Some(session) = self.session.take() {
            let lifetime = Utc::now().signed_duration_since(session.created_at());
            info!(
                session = %session.id(),
                lifetime_secs = lifetime.num_seconds(),
                "Session ended"
            );
        }
        self.refs.clear();
        Value::Null
    }

    // ── Navigation ──────────────────────────────────────────────────────

    fn current_url(&self) -> Value {
        self.session
            .as_ref()
            .and_then(Session::current_uri)
            .map_or_else(|| json!(""), |uri| json!(uri.as_str()))
    }

    async fn set_url(&mut self, body: UrlBody) -> Result<Value, CommandError> {
        let uri = Url::parse(&body.url)
            .map_err(|e| CommandError::InvalidArgument(format!("invalid url {:?}: {e}", body.url)))?;
        self.navigate(uri).await?;
        Ok(Value::Null)
    }

    async fn navigate(&mut self, uri: Url) -> Result<(), CommandError> {
        self.executor.navigate(uri.clone()).await??;
        self.begin_document();
        if let Some(session) = self.session.as_mut() {
            session.set_current_uri(uri);
        }
        Ok(())
    }

    async fn history(&mut self, forward: bool) -> Result<Value, CommandError> {
        let moved = if forward {
            self.executor.go_forward().await?
        } else {
            self.executor.go_back().await?
        };
        if moved {
            self.begin_document();
            self.sync_location().await;
        } else {
            debug!(forward, "No history entry to move to");
        }
        Ok(Value::Null)
    }

    /// Drops references into the document the surface just left.
    fn begin_document(&mut self) {
        let dropped = self.refs.begin_document();
        debug!(dropped, "Element references invalidated");
    }

    /// Re-reads the document location after history navigation.
    ///
    /// One attempt, no retries; the last known URI stays when it fails.
    async fn sync_location(&mut self) {
        let read = self
            .executor
            .bridge()
            .run(|surface| surface.evaluate(LOCATION_SCRIPT))
            .await;
        let uri = match read {
            Ok(Ok(Some(href))) => Url::parse(&href).ok(),
            _ => None,
        };
        match (uri, self.session.as_mut()) {
            (Some(uri), Some(session)) => session.set_current_uri(uri),
            _ => debug!("Document location not readable after history navigation"),
        }
    }

    async fn refresh(&mut self) -> Result<Value, CommandError> {
        let current = self.session.as_ref().and_then(Session::current_uri).cloned();
        match current {
            Some(uri) => self.navigate(uri).await?,
            None => debug!("Nothing to refresh"),
        }
        Ok(Value::Null)
    }

    async fn screenshot(&self) -> Result<Value, CommandError> {
        let image = self.executor.capture_image().await??;
        Ok(json!(base64::engine::general_purpose::STANDARD.encode(image)))
    }

    // ── Scripts and atoms ───────────────────────────────────────────────

    /// Calls `atom` with the focused frame appended and returns its raw outcome.
    async fn atom_reply(
        &mut self,
        atom: Atom,
        mut args: Vec<Value>,
    ) -> Result<Result<Value, (WireStatus, String)>, CommandError> {
        args.push(self.refs.frame_arg());
        let reply = self.executor.call_atom(atom, args).await?;
        Ok(reply
            .into_result()
            .map(|value| self.refs.wrap_result(value)))
    }

    /// Calls `atom`, turning a failed reply into its wire status.
    async fn atom(&mut self, atom: Atom, args: Vec<Value>) -> Result<Value, CommandError> {
        self.atom_reply(atom, args)
            .await?
            .map_err(|(status, message)| CommandError::wire(status, message))
    }

    /// Calls an element atom for the `:id` path parameter.
    async fn element_atom(
        &mut self,
        atom: Atom,
        params: &PathParams,
        extra: Vec<Value>,
    ) -> Result<Value, CommandError> {
        let element = self.refs.element_arg(param(params, "id")?)?;
        let mut args = vec![element];
        args.extend(extra);
        self.atom(atom, args).await
    }

    async fn find(
        &mut self,
        locator: LocatorBody,
        root: Option<&str>,
        many: bool,
    ) -> Result<Value, CommandError> {
        let root = match root {
            Some(id) => self.refs.element_arg(id)?,
            None => Value::Null,
        };
        let atom = if many { Atom::FindElements } else { Atom::FindElement };
        let args = vec![json!(locator.using), json!(locator.value), root];
        match self.atom(atom, args).await? {
            Value::Null if many => Ok(json!([])),
            Value::Null => Err(CommandError::wire(
                WireStatus::NoSuchElement,
                format!(
                    "Unable to find element with {} == {}",
                    locator.using, locator.value
                ),
            )),
            found => Ok(found),
        }
    }

    async fn execute_script(&mut self, body: ScriptBody) -> Result<Value, CommandError> {
        let args = self.refs.unwrap_args(Value::Array(body.args))?;
        self.atom(Atom::Execute, vec![json!(body.script), args]).await
    }

    async fn execute_fixed(&mut self, script: &str) -> Result<Value, CommandError> {
        self.atom(Atom::Execute, vec![json!(script), json!([])]).await
    }

    async fn switch_frame(&mut self, body: FrameBody) -> Result<Value, CommandError> {
        let requested = body.id.to_string();
        let no_frame = || {
            CommandError::wire(
                WireStatus::NoSuchFrame,
                format!("Unable to locate frame: {requested}"),
            )
        };

        let target = match &body.id {
            Value::Null => {
                self.refs.reset_focus();
                return Ok(Value::Null);
            }
            Value::Number(n) => match n.as_u64() {
                Some(index) => json!({ "index": index }),
                None => return Err(no_frame()),
            },
            Value::String(s) => {
                if let Ok(index) = s.parse::<u64>() {
                    json!({ "index": index })
                } else if is_element_id(s) {
                    self.refs.element_arg(s).map_err(|_| no_frame())?
                } else {
                    json!({ "name": s })
                }
            }
            Value::Object(object) => match object.get(ELEMENT_KEY).and_then(Value::as_str) {
                Some(id) => self.refs.element_arg(id).map_err(|_| no_frame())?,
                None => return Err(no_frame()),
            },
            _ => return Err(no_frame()),
        };

        let found = match self.atom_reply(Atom::SwitchFrame, vec![target]).await? {
            Ok(value) => value,
            Err((status, message)) => {
                debug!(status = status.code(), %message, "Frame lookup failed");
                return Err(no_frame());
            }
        };
        match found.get(WINDOW_KEY).and_then(Value::as_str) {
            Some(handle) => {
                self.refs
                    .focus(FrameRef::Nested(FrameHandle(handle.to_string())));
                Ok(Value::Null)
            }
            None => Err(no_frame()),
        }
    }

    // ── Cookies ─────────────────────────────────────────────────────────

    async fn cookies(&self) -> Result<Value, CommandError> {
        let cookies = self.executor.cookies().await??;
        Ok(Value::Array(cookies.iter().map(cookie_to_wire).collect()))
    }

    /// Assigns each `Set-Cookie` string to `document.cookie`.
    async fn assign_cookies(&mut self, entries: &[String]) -> Result<Value, CommandError> {
        if entries.is_empty() {
            return Ok(Value::Null);
        }
        let script = entries
            .iter()
            .map(|entry| format!("document.cookie = {};", json!(entry)))
            .collect::<Vec<_>>()
            .join("\n");
        self.execute_fixed(&script).await?;
        Ok(Value::Null)
    }

    async fn delete_cookies(&mut self) -> Result<Value, CommandError> {
        let cookies = self.executor.cookies().await??;
        let entries: Vec<String> = cookies.iter().map(|cookie| expire_cookie(&cookie.name)).collect();
        self.assign_cookies(&entries).await
    }
}

/// Reads the JSON body, answering `400` when it does not fit.
fn body<T: DeserializeOwned>(request: &HttpRequest) -> Result<T, CommandError> {
    request
        .json()
        .map_err(|e| CommandError::InvalidArgument(format!("invalid request body: {e}")))
}

fn param<'a>(params: &'a PathParams, name: &str) -> Result<&'a str, CommandError> {
    params
        .get(name)
        .ok_or_else(|| CommandError::InvalidArgument(format!("missing path parameter {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_is_400_envelope() {
        let response = CommandError::InvalidArgument("bad".into()).into_response("s");
        assert_eq!(response.status, 400);
        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body, json!({"sessionId": "s", "status": 13, "value": {"message": "bad"}}));
    }

    #[test]
    fn not_implemented_is_501_unknown_command() {
        let response = CommandError::NotImplemented("keys").into_response("s");
        assert_eq!(response.status, 501);
        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["status"], 9);
        assert_eq!(body["value"]["message"], UNKNOWN_COMMAND_MESSAGE);
    }

    #[test]
    fn wire_failures_keep_their_status() {
        let response = CommandError::wire(WireStatus::NoSuchFrame, "nope").into_response("s");
        assert_eq!(response.status, 500);
        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body, json!({"sessionId": "s", "status": 8, "value": {"message": "nope"}}));
    }

    #[test]
    fn unknown_references_are_no_such_element() {
        let err = CommandError::from(ReferenceError::UnknownElement("wd-element-5".into()));
        let body: Value = serde_json::from_slice(&err.into_response("s").body).unwrap();
        assert_eq!(body["status"], 7);
    }

    #[test]
    fn stale_references_are_stale_element_errors() {
        let err = CommandError::from(ReferenceError::StaleElement("wd-element-1".into()));
        let response = err.into_response("s");
        assert_eq!(response.status, 500);
        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["status"], 10);
    }

    #[test]
    fn script_faults_are_javascript_errors() {
        let err = CommandError::from(SurfaceFault::Script("boom".into()));
        let body: Value = serde_json::from_slice(&err.into_response("s").body).unwrap();
        assert_eq!(body["status"], 17);
    }

    #[test]
    fn exhaustion_is_an_unknown_error() {
        let err = CommandError::from(ScriptError::Exhausted { attempts: 10 });
        let body: Value = serde_json::from_slice(&err.into_response("s").body).unwrap();
        assert_eq!(body["status"], 13);
    }
}
