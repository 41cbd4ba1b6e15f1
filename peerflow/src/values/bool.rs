use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid bool literal: `{0}`")]
pub struct ParseBoolError(String);

/// Parses the text representations Postgres emits for booleans. Column
/// output uses `t`/`f`; array literals may carry the long form.
pub fn parse_bool(s: &str) -> Result<bool, ParseBoolError> {
    match s {
        "t" | "true" => Ok(true),
        "f" | "false" => Ok(false),
        other => Err(ParseBoolError(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_and_long_forms_parse() {
        assert!(parse_bool("t").unwrap());
        assert!(parse_bool("true").unwrap());
        assert!(!parse_bool("f").unwrap());
        assert!(!parse_bool("false").unwrap());
    }

    #[test]
    fn anything_else_is_rejected() {
        assert!(parse_bool("T").is_err());
        assert!(parse_bool("1").is_err());
        assert!(parse_bool("").is_err());
    }
}
