//! Configuration stream and path-specification loading. This
//! stage is plain text munging ahead of [`crate::registry::Registry::register`].

/// Platform path-list separator for [`crate::registry::Registry::load_path_spec`]:
/// `:`, matching PCP's own `PMDA_SPEC_PATH`-style lists on every platform it
/// ships on; this is not `std::env::consts`'s platform-native list
/// separator.
pub(crate) const PATH_SEPARATOR: char = ':';

/// Environment variable consulted by [`load_from_environment`].
pub const DERIVED_CONFIG_VAR: &str = "DERIVED_CONFIG";

/// Default directory searched when `DERIVED_CONFIG` is unset.
pub const DEFAULT_CONFIG_DIR: &str = "/etc/pmderive";

/// One parsed line of a configuration stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConfigLine<'a> {
    /// Blank line or comment.
    Skip,
    /// A non-comment, non-blank line with no `=`.
    MissingEquals,
    /// `name = expression`, already trimmed.
    Entry { name: &'a str, expr: &'a str },
}

/// Parse one line of a configuration stream. A line is a
/// comment only when byte 0 is literally `#` — leading whitespace before
/// `#` does not count.
pub(crate) fn parse_config_line(line: &str) -> ConfigLine<'_> {
    if line.as_bytes().first() == Some(&b'#') {
        return ConfigLine::Skip;
    }
    if line.trim().is_empty() {
        return ConfigLine::Skip;
    }
    match line.find('=') {
        Some(pos) => ConfigLine::Entry {
            name: line[..pos].trim_end(),
            expr: line[pos + 1..].trim_start(),
        },
        None => ConfigLine::MissingEquals,
    }
}

/// Resolve `DERIVED_CONFIG` into a path spec to load, or `None` when
/// nothing should be loaded:
/// unset → [`DEFAULT_CONFIG_DIR`] if it exists; `""` → nothing; otherwise
/// the variable's value verbatim.
pub fn resolve_path_spec_from_env() -> Option<String> {
    match std::env::var(DERIVED_CONFIG_VAR) {
        Ok(value) if value.is_empty() => None,
        Ok(value) => Some(value),
        Err(_) => {
            if std::path::Path::new(DEFAULT_CONFIG_DIR).exists() {
                Some(DEFAULT_CONFIG_DIR.to_string())
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_requires_literal_first_byte() {
        assert_eq!(parse_config_line("#comment"), ConfigLine::Skip);
        assert_eq!(
            parse_config_line("  # not a comment per spec's literal rule"),
            ConfigLine::MissingEquals
        );
    }

    #[test]
    fn blank_line_is_skipped() {
        assert_eq!(parse_config_line(""), ConfigLine::Skip);
        assert_eq!(parse_config_line("   "), ConfigLine::Skip);
    }

    #[test]
    fn splits_on_first_equals_and_trims() {
        let line = parse_config_line("disk.util  =  rate(disk.dev.total_bytes)");
        assert_eq!(
            line,
            ConfigLine::Entry {
                name: "disk.util",
                expr: "rate(disk.dev.total_bytes)"
            }
        );
    }

    #[test]
    fn missing_equals_is_reported() {
        assert_eq!(parse_config_line("not_a_valid_line"), ConfigLine::MissingEquals);
    }

    #[test]
    fn first_equals_wins_when_expression_itself_uses_relational_equals() {
        let line = parse_config_line("q = a == b");
        assert_eq!(
            line,
            ConfigLine::Entry {
                name: "q",
                expr: "a == b"
            }
        );
    }
}
