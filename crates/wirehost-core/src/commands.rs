//! Wire protocol commands and their routes.
//!
//! [`Command`] names every operation the server answers; [`route_table`]
//! binds each one to its method and path. Families the server does not
//! support (alerts, touch, IME, storage, window geometry, logs, ...) are
//! bound to [`Command::Unsupported`] so that they get an explicit
//! "not implemented" answer rather than falling through as unknown routes.

use crate::http::Method;
use crate::router::Router;

/// One wire protocol command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Status,
    NewSession,
    GetSession,
    DeleteSession,
    GetUrl,
    SetUrl,
    Forward,
    Back,
    Refresh,
    Title,
    Source,
    Screenshot,
    WindowHandle,
    WindowHandles,
    FindElement,
    FindElements,
    FindChildElement,
    FindChildElements,
    ActiveElement,
    ElementEquals,
    ElementClick,
    ElementSubmit,
    ElementClear,
    ElementSendKeys,
    ElementText,
    ElementTagName,
    ElementAttribute,
    ElementCss,
    ElementSize,
    ElementLocation,
    ElementDisplayed,
    ElementEnabled,
    ElementSelected,
    ExecuteScript,
    SwitchFrame,
    GetCookies,
    AddCookie,
    DeleteCookies,
    DeleteCookie,
    /// A known command the server deliberately does not implement.
    Unsupported(&'static str),
}

impl Command {
    /// Short name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Command::Status => "status",
            Command::NewSession => "new_session",
            Command::GetSession => "get_session",
            Command::DeleteSession => "delete_session",
            Command::GetUrl => "get_url",
            Command::SetUrl => "set_url",
            Command::Forward => "forward",
            Command::Back => "back",
            Command::Refresh => "refresh",
            Command::Title => "title",
            Command::Source => "source",
            Command::Screenshot => "screenshot",
            Command::WindowHandle => "window_handle",
            Command::WindowHandles => "window_handles",
            Command::FindElement => "find_element",
            Command::FindElements => "find_elements",
            Command::FindChildElement => "find_child_element",
            Command::FindChildElements => "find_child_elements",
            Command::ActiveElement => "active_element",
            Command::ElementEquals => "element_equals",
            Command::ElementClick => "element_click",
            Command::ElementSubmit => "element_submit",
            Command::ElementClear => "element_clear",
            Command::ElementSendKeys => "element_send_keys",
            Command::ElementText => "element_text",
            Command::ElementTagName => "element_tag_name",
            Command::ElementAttribute => "element_attribute",
            Command::ElementCss => "element_css",
            Command::ElementSize => "element_size",
            Command::ElementLocation => "element_location",
            Command::ElementDisplayed => "element_displayed",
            Command::ElementEnabled => "element_enabled",
            Command::ElementSelected => "element_selected",
            Command::ExecuteScript => "execute_script",
            Command::SwitchFrame => "switch_frame",
            Command::GetCookies => "get_cookies",
            Command::AddCookie => "add_cookie",
            Command::DeleteCookies => "delete_cookies",
            Command::DeleteCookie => "delete_cookie",
            Command::Unsupported(name) => name,
        }
    }
}

const S: &str = "/session/:sessionId";

/// Builds the server's route table.
pub fn route_table() -> Router<Command> {
    use Command::*;
    use Method::{Delete, Get, Post};

    let mut router = Router::new()
        .route(Get, "/status", Status)
        .route(Post, "/session", NewSession)
        .route(Get, S, GetSession)
        .route(Delete, S, DeleteSession)
        .route(Delete, "/session/", DeleteSession);

    let session_routes: &[(Method, &str, Command)] = &[
        (Delete, "/", DeleteSession),
        (Get, "/url", GetUrl),
        (Post, "/url", SetUrl),
        (Post, "/forward", Forward),
        (Post, "/back", Back),
        (Post, "/refresh", Refresh),
        (Get, "/title", Title),
        (Get, "/source", Source),
        (Get, "/screenshot", Screenshot),
        (Get, "/window_handle", WindowHandle),
        (Get, "/window_handles", WindowHandles),
        (Post, "/element/active", ActiveElement),
        (Post, "/element", FindElement),
        (Post, "/elements", FindElements),
        (Post, "/element/:id/element", FindChildElement),
        (Post, "/element/:id/elements", FindChildElements),
        (Get, "/element/:id/equals/:other", ElementEquals),
        (Post, "/element/:id/click", ElementClick),
        (Post, "/element/:id/submit", ElementSubmit),
        (Post, "/element/:id/clear", ElementClear),
        (Post, "/element/:id/value", ElementSendKeys),
        (Get, "/element/:id/text", ElementText),
        (Get, "/element/:id/name", ElementTagName),
        (Get, "/element/:id/attribute/:name", ElementAttribute),
        (Get, "/element/:id/css/:propertyName", ElementCss),
        (Get, "/element/:id/size", ElementSize),
        (Get, "/element/:id/location", ElementLocation),
        (Get, "/element/:id/displayed", ElementDisplayed),
        (Get, "/element/:id/enabled", ElementEnabled),
        (Get, "/element/:id/selected", ElementSelected),
        (Post, "/execute", ExecuteScript),
        (Post, "/frame", SwitchFrame),
        (Get, "/cookie", GetCookies),
        (Post, "/cookie", AddCookie),
        (Delete, "/cookie", DeleteCookies),
        (Delete, "/cookie/:name", DeleteCookie),
        // explicit stubs
        (Post, "/timeouts", Unsupported("timeouts")),
        (Post, "/timeouts/async_script", Unsupported("timeouts_async_script")),
        (Post, "/timeouts/implicit_wait", Unsupported("timeouts_implicit_wait")),
        (Post, "/execute_async", Unsupported("execute_async")),
        (Post, "/window", Unsupported("switch_window")),
        (Delete, "/window", Unsupported("close_window")),
        (Get, "/window/:windowHandle/size", Unsupported("get_window_size")),
        (Post, "/window/:windowHandle/size", Unsupported("set_window_size")),
        (Get, "/window/:windowHandle/position", Unsupported("get_window_position")),
        (Post, "/window/:windowHandle/position", Unsupported("set_window_position")),
        (Post, "/window/:windowHandle/maximize", Unsupported("maximize_window")),
        (Post, "/keys", Unsupported("keys")),
        (Get, "/orientation", Unsupported("get_orientation")),
        (Post, "/orientation", Unsupported("set_orientation")),
        (Get, "/alert_text", Unsupported("get_alert_text")),
        (Post, "/alert_text", Unsupported("set_alert_text")),
        (Post, "/accept_alert", Unsupported("accept_alert")),
        (Post, "/dismiss_alert", Unsupported("dismiss_alert")),
        (Post, "/moveto", Unsupported("mouse_move_to")),
        (Post, "/click", Unsupported("mouse_click")),
        (Post, "/buttondown", Unsupported("mouse_button_down")),
        (Post, "/buttonup", Unsupported("mouse_button_up")),
        (Post, "/doubleclick", Unsupported("mouse_double_click")),
        (Post, "/touch/click", Unsupported("touch_click")),
        (Post, "/touch/down", Unsupported("touch_down")),
        (Post, "/touch/up", Unsupported("touch_up")),
        (Post, "/touch/move", Unsupported("touch_move")),
        (Post, "/touch/scroll", Unsupported("touch_scroll")),
        (Post, "/touch/doubleclick", Unsupported("touch_double_click")),
        (Post, "/touch/longclick", Unsupported("touch_long_click")),
        (Post, "/touch/flick", Unsupported("touch_flick")),
        (Get, "/location", Unsupported("get_geo_location")),
        (Post, "/location", Unsupported("set_geo_location")),
        (Get, "/local_storage", Unsupported("local_storage_keys")),
        (Post, "/local_storage", Unsupported("local_storage_set")),
        (Delete, "/local_storage", Unsupported("local_storage_clear")),
        (Get, "/local_storage/key/:key", Unsupported("local_storage_get")),
        (Delete, "/local_storage/key/:key", Unsupported("local_storage_remove")),
        (Get, "/local_storage/size", Unsupported("local_storage_size")),
        (Get, "/session_storage", Unsupported("session_storage_keys")),
        (Post, "/session_storage", Unsupported("session_storage_set")),
        (Delete, "/session_storage", Unsupported("session_storage_clear")),
        (Get, "/session_storage/key/:key", Unsupported("session_storage_get")),
        (Delete, "/session_storage/key/:key", Unsupported("session_storage_remove")),
        (Get, "/session_storage/size", Unsupported("session_storage_size")),
        (Get, "/ime/available_engines", Unsupported("ime_available_engines")),
        (Get, "/ime/active_engine", Unsupported("ime_active_engine")),
        (Get, "/ime/activated", Unsupported("ime_activated")),
        (Post, "/ime/deactivate", Unsupported("ime_deactivate")),
        (Post, "/ime/activate", Unsupported("ime_activate")),
        (Post, "/log", Unsupported("log")),
        (Get, "/log/types", Unsupported("log_types")),
        (Get, "/application_cache/status", Unsupported("application_cache_status")),
        (Get, "/element/:id", Unsupported("describe_element")),
        (Get, "/element/:id/location_in_view", Unsupported("element_location_in_view")),
    ];

    for &(method, suffix, command) in session_routes {
        router.add(method, &format!("{S}{suffix}"), command);
    }
    router
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replaces every `:param` segment with a concrete value.
    fn concrete_path(pattern: &str) -> String {
        pattern
            .split('/')
            .enumerate()
            .map(|(i, segment)| {
                if segment.starts_with(':') {
                    format!("p{i}")
                } else {
                    segment.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    #[test]
    fn every_route_resolves_to_its_own_command() {
        let router = route_table();
        for route in router.routes() {
            let path = concrete_path(route.pattern.as_str());
            let found = router
                .resolve(route.method, &path)
                .unwrap_or_else(|| panic!("{} {path} did not resolve", route.method));
            assert_eq!(
                *found.handler, route.handler,
                "{} {path} resolved to the wrong command",
                route.method
            );
        }
    }

    #[test]
    fn session_paths_capture_parameters() {
        let router = route_table();
        let found = router
            .resolve(Method::Get, "/session/abc/element/wd-element-3/css/color")
            .unwrap();
        assert_eq!(*found.handler, Command::ElementCss);
        assert_eq!(found.params.get("sessionId"), Some("abc"));
        assert_eq!(found.params.get("id"), Some("wd-element-3"));
        assert_eq!(found.params.get("propertyName"), Some("color"));
    }

    #[test]
    fn active_element_is_not_mistaken_for_an_element_id() {
        let router = route_table();
        let found = router.resolve(Method::Post, "/session/abc/element/active").unwrap();
        assert_eq!(*found.handler, Command::ActiveElement);
        let found = router.resolve(Method::Post, "/session/abc/element").unwrap();
        assert_eq!(*found.handler, Command::FindElement);
    }

    #[test]
    fn trailing_slash_delete_forms_end_the_session() {
        let router = route_table();
        for path in ["/session/", "/session/abc/", "/session/abc"] {
            let found = router.resolve(Method::Delete, path).unwrap();
            assert_eq!(*found.handler, Command::DeleteSession, "{path}");
        }
    }

    #[test]
    fn refresh_is_a_post() {
        let router = route_table();
        assert!(router.resolve(Method::Get, "/session/abc/refresh").is_none());
        assert_eq!(
            *router.resolve(Method::Post, "/session/abc/refresh").unwrap().handler,
            Command::Refresh
        );
    }

    #[test]
    fn extra_or_missing_segments_never_match() {
        let router = route_table();
        assert!(router.resolve(Method::Post, "/session/abc/element/e1/click/x").is_none());
        assert!(router.resolve(Method::Get, "/session/abc/element/e1/attribute").is_none());
        assert!(router.resolve(Method::Get, "/nope").is_none());
    }

    #[test]
    fn stubs_keep_their_names() {
        let router = route_table();
        let found = router.resolve(Method::Post, "/session/abc/accept_alert").unwrap();
        assert_eq!(*found.handler, Command::Unsupported("accept_alert"));
        assert_eq!(found.handler.name(), "accept_alert");
    }
}
