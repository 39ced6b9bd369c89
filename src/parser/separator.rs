use super::{FieldParser, ParserKind};
use crate::error::Result;

/// Splits on every occurrence of the separator
///
/// No quoting or escaping; consecutive separators yield empty fields. An
/// empty separator leaves the frame as a single field.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeparatorParser;

impl FieldParser for SeparatorParser {
    fn parse(&self, frame: &str, separator: &str) -> Result<Vec<String>> {
        if separator.is_empty() {
            return Ok(vec![frame.to_string()]);
        }
        Ok(frame.split(separator).map(str::to_string).collect())
    }

    fn kind(&self) -> ParserKind {
        ParserKind::Separator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keeps_empty_fields() {
        let parser = SeparatorParser;
        assert_eq!(parser.parse("a,,b", ",").unwrap(), vec!["a", "", "b"]);
        assert_eq!(parser.parse("a", ",").unwrap(), vec!["a"]);
        assert_eq!(parser.parse(",", ",").unwrap(), vec!["", ""]);
        assert_eq!(parser.parse("", ",").unwrap(), vec![""]);
    }

    #[test]
    fn test_multi_character_separator() {
        let parser = SeparatorParser;
        assert_eq!(parser.parse("1::2::3", "::").unwrap(), vec!["1", "2", "3"]);
        assert_eq!(parser.parse("1:2", "::").unwrap(), vec!["1:2"]);
    }

    #[test]
    fn test_empty_separator() {
        assert_eq!(SeparatorParser.parse("1,2", "").unwrap(), vec!["1,2"]);
    }
}
