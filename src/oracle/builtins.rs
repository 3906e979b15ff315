//! Host implementations of builtins and the name lists that gate builtin resolution.
//!
//! `atob` and `btoa` are not part of the ECMAScript core, so the sandbox does not have
//! them. They are implemented here once and used both directly by the builtin call rule
//! and as functions bound into every sandbox context.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};

/// Builtin functions whose calls are never resolved.
pub const SKIP_BUILTIN_FUNCTIONS: &[&str] = &[
    "Function",
    "eval",
    "Array",
    "Object",
    "fetch",
    "XMLHttpRequest",
    "Promise",
    "console",
    "performance",
    "$",
];

/// Identifiers that are never treated as resolvable builtin objects.
pub const SKIP_IDENTIFIERS: &[&str] = &[
    "window",
    "this",
    "self",
    "document",
    "module",
    "$",
    "jQuery",
    "navigator",
    "typeof",
    "new",
    "Date",
    "Math",
    "Promise",
    "Error",
    "fetch",
    "XMLHttpRequest",
    "performance",
    "globalThis",
];

/// Member names whose calls are never resolved on builtin objects.
pub const SKIP_PROPERTIES: &[&str] = &[
    "test",
    "exec",
    "match",
    "length",
    "freeze",
    "call",
    "apply",
    "create",
    "getTime",
    "now",
    "getMilliseconds",
];

/// Methods that mutate their receiver in place.
///
/// A binding on which any of these is called cannot be replaced by its initial value.
pub const PROPERTIES_THAT_MODIFY_CONTENT: &[&str] = &[
    "push",
    "forEach",
    "pop",
    "insert",
    "add",
    "set",
    "delete",
    "shift",
    "unshift",
    "splice",
    "sort",
    "reverse",
    "fill",
    "copyWithin",
];

const FORGIVING: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decodes a base64 string the way `atob` does.
///
/// ASCII whitespace is ignored and each decoded byte becomes one character (Latin-1).
/// Returns `None` where `atob` would throw.
#[must_use]
pub fn atob(input: &str) -> Option<String> {
    let compact: String = input
        .chars()
        .filter(|c| !matches!(c, ' ' | '\t' | '\n' | '\x0c' | '\r'))
        .collect();
    if compact.len() % 4 == 1 {
        return None;
    }
    let bytes = FORGIVING.decode(compact.as_bytes()).ok()?;
    Some(bytes.into_iter().map(char::from).collect())
}

/// Encodes a string the way `btoa` does.
///
/// Returns `None` if any character is outside Latin-1, where `btoa` would throw.
#[must_use]
pub fn btoa(input: &str) -> Option<String> {
    let bytes = input
        .chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect::<Option<Vec<u8>>>()?;
    Some(FORGIVING.encode(bytes))
}

/// Returns `true` if `name` has a host implementation usable by [`safe_call`].
#[must_use]
pub fn is_safe_implementation(name: &str) -> bool {
    matches!(name, "atob" | "btoa")
}

/// Calls a host implementation with string arguments.
///
/// Missing arguments read as `"undefined"`, matching the coercion of the builtins.
#[must_use]
pub fn safe_call(name: &str, args: &[String]) -> Option<String> {
    let first = args.first().map_or("undefined", String::as_str);
    match name {
        "atob" => atob(first),
        "btoa" => btoa(first),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atob() {
        assert_eq!(atob("dGVzdA==").as_deref(), Some("test"));
        assert_eq!(atob("dGVzdA").as_deref(), Some("test"));
        assert_eq!(atob(" dGVz\ndA== ").as_deref(), Some("test"));
        assert_eq!(atob("aGVsbG8gd29ybGQ=").as_deref(), Some("hello world"));
        assert_eq!(atob("/w==").as_deref(), Some("\u{ff}"));
        assert!(atob("a").is_none());
        assert!(atob("!!!!").is_none());
    }

    #[test]
    fn test_btoa() {
        assert_eq!(btoa("test").as_deref(), Some("dGVzdA=="));
        assert_eq!(btoa("\u{ff}").as_deref(), Some("/w=="));
        assert!(btoa("\u{263a}").is_none());
    }

    #[test]
    fn test_safe_call() {
        assert!(is_safe_implementation("atob"));
        assert!(!is_safe_implementation("eval"));
        assert_eq!(
            safe_call("btoa", &["hi".to_string()]).as_deref(),
            Some("aGk=")
        );
        assert_eq!(safe_call("unknown", &[]), None);
    }
}
