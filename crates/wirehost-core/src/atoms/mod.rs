//! Predefined scripts ("atoms") run inside the surface.
//!
//! Every bridged script is the [`RUNTIME`] followed by one atom call. The
//! runtime installs `window.top.__wd` once per document; it owns the node
//! and window caches and wraps each atom call so that the outcome is always
//! a `{"status": n, "value": v}` JSON string. That string is stored in the
//! [`RESULT_SLOT`] and read back by the executor.
//!
//! Atoms are named function expressions taking their arguments positionally
//! with the focused frame (`{"WINDOW": handle}` or `null`) last.

use serde_json::Value;

/// Installs `window.top.__wd` when it is missing.
pub const RUNTIME: &str = include_str!("runtime.js");

/// Side channel holding the last atom outcome.
pub const RESULT_SLOT: &str = "window.top.document.__wd_fn_result";

/// One predefined DOM operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Atom {
    FindElement,
    FindElements,
    Click,
    Clear,
    Submit,
    SendKeys,
    Text,
    TagName,
    Attribute,
    Css,
    Size,
    Location,
    Displayed,
    Enabled,
    Selected,
    Execute,
    SwitchFrame,
    ActiveElement,
}

impl Atom {
    /// The function expression source.
    pub fn source(self) -> &'static str {
        match self {
            Atom::FindElement => include_str!("find_element.js"),
            Atom::FindElements => include_str!("find_elements.js"),
            Atom::Click => include_str!("click.js"),
            Atom::Clear => include_str!("clear.js"),
            Atom::Submit => include_str!("submit.js"),
            Atom::SendKeys => include_str!("send_keys.js"),
            Atom::Text => include_str!("text.js"),
            Atom::TagName => include_str!("tag_name.js"),
            Atom::Attribute => include_str!("attribute.js"),
            Atom::Css => include_str!("css.js"),
            Atom::Size => include_str!("size.js"),
            Atom::Location => include_str!("location.js"),
            Atom::Displayed => include_str!("displayed.js"),
            Atom::Enabled => include_str!("enabled.js"),
            Atom::Selected => include_str!("selected.js"),
            Atom::Execute => include_str!("execute.js"),
            Atom::SwitchFrame => include_str!("switch_frame.js"),
            Atom::ActiveElement => include_str!("active_element.js"),
        }
    }

    /// The function name declared by [`source`](Self::source).
    pub fn function_name(self) -> &'static str {
        match self {
            Atom::FindElement => "findElement",
            Atom::FindElements => "findElements",
            Atom::Click => "click",
            Atom::Clear => "clear",
            Atom::Submit => "submit",
            Atom::SendKeys => "sendKeys",
            Atom::Text => "text",
            Atom::TagName => "tagName",
            Atom::Attribute => "attribute",
            Atom::Css => "css",
            Atom::Size => "size",
            Atom::Location => "location",
            Atom::Displayed => "displayed",
            Atom::Enabled => "enabled",
            Atom::Selected => "selected",
            Atom::Execute => "execute",
            Atom::SwitchFrame => "switchFrame",
            Atom::ActiveElement => "activeElement",
        }
    }
}

/// Builds the full script for calling `atom` with `args`.
///
/// `args` must already include the trailing frame argument.
pub fn atom_script(atom: Atom, args: &[Value]) -> String {
    let args = args
        .iter()
        .map(js_literal)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{RUNTIME}\n{RESULT_SLOT} = window.top.__wd.respond({}, [{args}]);",
        atom.source().trim_end()
    )
}

/// JSON text that is also a valid JS literal.
///
/// JSON allows raw U+2028/U+2029 in strings, older JS engines do not.
fn js_literal(value: &Value) -> String {
    value
        .to_string()
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}
