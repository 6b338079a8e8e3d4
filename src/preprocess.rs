//! Textual substitution over raw descriptor text.
//!
//! Runs before the descriptor is parsed as JSON, in three passes:
//!
//! ```text
//! 1. $today, $now           → date / timestamp of the build stamp
//! 2. create(<prefix>, name) → "<identifier>"   (binds name in this leaf)
//! 3. $name                  → <identifier>     (must already be bound)
//! ```
//!
//! Declarations are collected in text order before any reference is
//! replaced, so a reference may appear above its declaration. Only names
//! declared in the current text stay bound for the leaf; a binding left in
//! the cache by an older version of the text is dropped.
//!
//! A literal dollar sign is written `$$`. Escapes survive all three passes
//! and are turned back into `$` by [`unescape`] once the leftover check has
//! run, so `"Prices in $$USD"` ends up as `"Prices in $USD"`.

use crate::identity::{EntityKind, IdGenerator, IdentityError, IdentityResolver};
use crate::types::BuildStamp;
use regex::{Captures, Regex};
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

const ESCAPED_DOLLAR: &str = "$$";

/// `create(g, "name")`, optionally wrapped in JSON quotes.
static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""?create\(\s*([A-Za-z]+)\s*,\s*"?([A-Za-z_][A-Za-z0-9_]*)"?\s*\)"?"#)
        .expect("marker pattern compiles")
});

/// `$name`, or an escaped `$$` (no capture).
static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$|\$([A-Za-z_][A-Za-z0-9_]*)").expect("reference pattern compiles")
});

static GLOBAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\$|\$(today|now)\b").expect("global pattern compiles"));

/// Characters shown on each side of a leftover variable.
const FRAGMENT_WINDOW: usize = 40;

/// Replace `$today` and `$now` with values from the build stamp.
pub fn apply_global_variables(text: &str, stamp: &BuildStamp) -> String {
    GLOBAL
        .replace_all(text, |caps: &Captures| match caps.get(1).map(|m| m.as_str()) {
            None => ESCAPED_DOLLAR.to_string(),
            Some("today") => stamp.today().to_string(),
            Some(_) => stamp.last_update.clone(),
        })
        .into_owned()
}

/// Bind every declaration marker and replace it with a quoted identifier.
///
/// Bindings of this leaf that no marker declares any more are dropped.
pub fn generate_variables(
    text: &str,
    branch: &str,
    leaf: &str,
    resolver: &mut IdentityResolver,
    generator: &mut IdGenerator,
) -> Result<String, IdentityError> {
    let mut bound: HashMap<String, String> = HashMap::new();
    let mut declared: BTreeSet<(EntityKind, String)> = BTreeSet::new();

    for caps in MARKER.captures_iter(text) {
        let marker = caps[0].to_string();
        if bound.contains_key(&marker) {
            continue;
        }
        let prefix = &caps[1];
        let name = &caps[2];
        let kind = EntityKind::from_prefix(prefix).ok_or_else(|| IdentityError::UnknownPrefix {
            prefix: prefix.to_string(),
            variable: name.to_string(),
        })?;
        let identifier = resolver.bind(branch, leaf, kind, name, generator)?;
        bound.insert(marker, identifier);
        declared.insert((kind, name.to_string()));
    }
    resolver.retain_declared(branch, leaf, &declared);

    Ok(MARKER
        .replace_all(text, |caps: &Captures| format!("\"{}\"", bound[&caps[0]]))
        .into_owned())
}

/// Replace every `$name` with the identifier bound to it in this leaf.
pub fn apply_variables(
    text: &str,
    branch: &str,
    leaf: &str,
    resolver: &IdentityResolver,
) -> Result<String, IdentityError> {
    let mut values: HashMap<String, String> = HashMap::new();
    for caps in REFERENCE.captures_iter(text) {
        let Some(name) = caps.get(1).map(|m| m.as_str()) else {
            continue;
        };
        if !values.contains_key(name) {
            values.insert(name.to_string(), resolver.lookup(branch, leaf, name)?);
        }
    }

    Ok(REFERENCE
        .replace_all(text, |caps: &Captures| match caps.get(1) {
            Some(name) => values[name.as_str()].clone(),
            None => ESCAPED_DOLLAR.to_string(),
        })
        .into_owned())
}

/// Turn every `$$` back into a single `$`.
pub fn unescape(text: &str) -> String {
    text.replace(ESCAPED_DOLLAR, "$")
}

/// All three passes. Escaped dollars are still escaped in the result.
pub fn preprocess(
    text: &str,
    branch: &str,
    leaf: &str,
    stamp: &BuildStamp,
    resolver: &mut IdentityResolver,
    generator: &mut IdGenerator,
) -> Result<String, IdentityError> {
    let text = apply_global_variables(text, stamp);
    let text = generate_variables(&text, branch, leaf, resolver, generator)?;
    apply_variables(&text, branch, leaf, resolver)
}

/// Text around the first variable reference still present, if any.
pub fn find_leftover_variable(text: &str) -> Option<String> {
    let found = REFERENCE
        .captures_iter(text)
        .find_map(|caps| caps.get(1).and(caps.get(0)))?;
    let mut left = found.start().saturating_sub(FRAGMENT_WINDOW);
    while !text.is_char_boundary(left) {
        left -= 1;
    }
    let mut right = (found.end() + FRAGMENT_WINDOW).min(text.len());
    while !text.is_char_boundary(right) {
        right += 1;
    }
    Some(format!("...{}...", &text[left..right]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::fixed_stamp;

    fn run(text: &str) -> (String, IdentityResolver) {
        let mut resolver = IdentityResolver::new();
        let mut generator = IdGenerator::new();
        let out = preprocess(text, "b", "l", &fixed_stamp(), &mut resolver, &mut generator).unwrap();
        (out, resolver)
    }

    // =========================================================================
    // Global variables
    // =========================================================================

    #[test]
    fn today_and_now_come_from_stamp() {
        let stamp = fixed_stamp();
        let out = apply_global_variables(r#"{"a": "$today", "b": "$now"}"#, &stamp);
        assert_eq!(
            out,
            format!(r#"{{"a": "{}", "b": "{}"}}"#, stamp.today(), stamp.last_update)
        );
    }

    #[test]
    fn global_names_do_not_eat_longer_variables() {
        let stamp = fixed_stamp();
        assert_eq!(apply_global_variables("$nowhere", &stamp), "$nowhere");
    }

    // =========================================================================
    // Declarations and references
    // =========================================================================

    #[test]
    fn declaration_and_two_references_share_one_identifier() {
        let (out, resolver) = run(
            r#"{"groups": [{"uuid": create(g, "g1"), "ref": "$g1"}],
                "metas": [{"group_uuid": "$g1"}]}"#,
        );
        let id = resolver.lookup("b", "l", "g1").unwrap();
        assert!(id.starts_with("g_"));
        assert_eq!(out.matches(&id).count(), 3);
        assert!(!out.contains("create("));
        assert!(!out.contains("$g1"));
    }

    #[test]
    fn quoted_marker_inside_json_string_is_replaced_whole() {
        let (out, resolver) = run(r#"{"uuid": "create(t, main)"}"#);
        let id = resolver.lookup("b", "l", "main").unwrap();
        assert_eq!(out, format!(r#"{{"uuid": "{id}"}}"#));
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["uuid"], id.as_str());
    }

    #[test]
    fn reference_before_declaration_resolves() {
        let (out, resolver) = run(r#"["$late", create(t, "late")]"#);
        let id = resolver.lookup("b", "l", "late").unwrap();
        assert_eq!(out, format!(r#"["{id}", "{id}"]"#));
    }

    #[test]
    fn undeclared_reference_fails() {
        let mut resolver = IdentityResolver::new();
        let mut generator = IdGenerator::new();
        let err = preprocess(
            r#"{"uuid": "$ghost"}"#,
            "b",
            "l",
            &fixed_stamp(),
            &mut resolver,
            &mut generator,
        )
        .unwrap_err();
        assert_eq!(err, IdentityError::Undeclared("ghost".into()));
    }

    #[test]
    fn unknown_prefix_fails() {
        let mut resolver = IdentityResolver::new();
        let mut generator = IdGenerator::new();
        let err = generate_variables("create(q, x)", "b", "l", &mut resolver, &mut generator)
            .unwrap_err();
        assert!(matches!(err, IdentityError::UnknownPrefix { .. }));
    }

    #[test]
    fn uppercase_prefix_is_accepted() {
        let (_, resolver) = run(r#"[create(G, "x")]"#);
        assert!(resolver.lookup("b", "l", "x").unwrap().starts_with("g_"));
    }

    // =========================================================================
    // Leftovers
    // =========================================================================

    #[test]
    fn leftover_fragment_surrounds_the_variable() {
        let text = format!("{}$oops{}", "a".repeat(100), "b".repeat(100));
        let fragment = find_leftover_variable(&text).unwrap();
        assert!(fragment.contains("$oops"));
        assert!(fragment.len() < 100);
        assert_eq!(find_leftover_variable("clean text, $5 fee"), None);
        assert_eq!(find_leftover_variable("price in $$USD"), None);
    }

    // =========================================================================
    // Escapes
    // =========================================================================

    #[test]
    fn escaped_dollar_is_not_a_reference() {
        let (out, _) = run(r#"{"label": "Prices in $$USD", "when": "$$today"}"#);
        assert_eq!(out, r#"{"label": "Prices in $$USD", "when": "$$today"}"#);
        assert_eq!(
            unescape(&out),
            r#"{"label": "Prices in $USD", "when": "$today"}"#
        );
    }

    #[test]
    fn escape_next_to_a_reference() {
        let (out, resolver) = run(r#"[create(t, cost), "$$$cost"]"#);
        let id = resolver.lookup("b", "l", "cost").unwrap();
        assert_eq!(unescape(&out), format!(r#"["{id}", "${id}"]"#));
    }

    #[test]
    fn marker_removed_from_text_drops_cached_binding() {
        let mut resolver = IdentityResolver::new();
        let mut generator = IdGenerator::new();
        let stamp = fixed_stamp();
        preprocess("[create(t, x)]", "b", "l", &stamp, &mut resolver, &mut generator).unwrap();

        let out = preprocess(
            r#"[create(s, x), "$x"]"#,
            "b",
            "l",
            &stamp,
            &mut resolver,
            &mut generator,
        )
        .unwrap();
        let id = resolver.lookup("b", "l", "x").unwrap();
        assert!(id.starts_with("s_"));
        assert_eq!(out, format!(r#"["{id}", "{id}"]"#));
    }
}
