/// Quotes a SQL identifier, doubling any embedded double quotes.
pub fn quote_identifier(identifier: &str) -> String {
    let mut quoted = String::with_capacity(identifier.len() + 2);
    quoted.push('"');
    for char in identifier.chars() {
        if char == '"' {
            quoted.push('"');
        }
        quoted.push(char);
    }
    quoted.push('"');
    quoted
}

/// Quotes a SQL string literal, doubling single quotes and switching to the
/// `E''` form when the literal contains backslashes.
pub fn quote_literal(literal: &str) -> String {
    let mut quoted = String::with_capacity(literal.len() + 2);

    if literal.find('\\').is_some() {
        quoted.push('E');
    }

    quoted.push('\'');
    for char in literal.chars() {
        if char == '\'' {
            quoted.push('\'');
        } else if char == '\\' {
            quoted.push('\\');
        }
        quoted.push(char);
    }
    quoted.push('\'');

    quoted
}

/// Maps a column name coming from configuration or from the source stream to
/// the destination's exact identifier. Introspected destination names are
/// authoritative: an exact match wins, otherwise a unique case-insensitive
/// match is accepted.
pub fn fold_to_destination_case<'a>(name: &str, destination_columns: &'a [String]) -> Option<&'a str> {
    if let Some(exact) = destination_columns.iter().find(|c| *c == name) {
        return Some(exact.as_str());
    }

    let mut folded = destination_columns
        .iter()
        .filter(|c| c.eq_ignore_ascii_case(name));
    match (folded.next(), folded.next()) {
        (Some(only), None) => Some(only.as_str()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_always_quoted() {
        assert_eq!(quote_identifier("events"), r#""events""#);
        assert_eq!(quote_identifier(r#"we"ird"#), r#""we""ird""#);
    }

    #[test]
    fn literals_escape_quotes_and_backslashes() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_literal(r"a\b"), r"E'a\\b'");
    }

    #[test]
    fn case_folding_prefers_exact_matches() {
        let columns = vec!["ID".to_string(), "id".to_string(), "name".to_string()];
        assert_eq!(fold_to_destination_case("id", &columns), Some("id"));
        assert_eq!(fold_to_destination_case("NAME", &columns), Some("name"));
        // ambiguous without an exact match
        assert_eq!(fold_to_destination_case("Id", &columns), None);
        assert_eq!(fold_to_destination_case("missing", &columns), None);
    }
}
