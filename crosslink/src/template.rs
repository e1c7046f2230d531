//! Placeholder substitution for message templates.
//!
//! Templates name their inputs in braces: `"{sender} → You: {message}"`.
//! Substitution is a single left-to-right pass, so a substituted value that
//! itself contains `{...}` is never expanded again. Placeholders without a
//! value, and stray braces, are copied through verbatim.

/// Substitute `vars` into `template`.
///
/// # Examples
///
/// ```
/// use crosslink::template::render;
///
/// let line = render("{prefix} {name}: {message}", &[("name", "alice"), ("message", "{hi}")]);
/// assert_eq!(line, "{prefix} alice: {hi}");
/// ```
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = match after.find(|c: char| c == '{' || c == '}') {
            Some(i) if after.as_bytes()[i] == b'}' => i,
            // No closing brace before the next opening one.
            _ => {
                out.push('{');
                rest = after;
                continue;
            }
        };
        let key = &after[..close];
        match vars.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutes_every_occurrence() {
        assert_eq!(
            render("{a}-{b}-{a}", &[("a", "1"), ("b", "2")]),
            "1-2-1"
        );
    }

    #[test]
    fn test_unknown_placeholders_stay_verbatim() {
        assert_eq!(render("hi {who}", &[]), "hi {who}");
        assert_eq!(render("{}", &[]), "{}");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        assert_eq!(
            render("{message}", &[("message", "{message}"), ("x", "y")]),
            "{message}"
        );
        assert_eq!(render("{a}", &[("a", "{b}"), ("b", "nope")]), "{b}");
    }

    #[test]
    fn test_stray_braces() {
        assert_eq!(render("a { b", &[("b", "x")]), "a { b");
        assert_eq!(render("a } b", &[]), "a } b");
        assert_eq!(render("{{name}}", &[("name", "bob")]), "{bob}");
        assert_eq!(render("trailing {", &[]), "trailing {");
    }

    #[test]
    fn test_multibyte_text() {
        assert_eq!(
            render("[{sender} → You] {message}", &[("sender", "Zoë"), ("message", "héllo")]),
            "[Zoë → You] héllo"
        );
    }
}
