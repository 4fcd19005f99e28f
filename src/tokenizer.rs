//! Quote-aware splitting of delimited lines into positioned tokens.

use tracing::warn;

/// One delimited token with its position in the physical line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineToken {
    /// Token text with quote characters removed
    pub text: String,
    /// Length in the line including any removed quote characters
    pub full_length: usize,
    /// Column (character index) where the token starts
    pub column: usize,
}

impl LineToken {
    pub fn new(text: impl Into<String>, full_length: usize, end_column: usize) -> Self {
        Self {
            text: text.into(),
            full_length,
            column: end_column - full_length,
        }
    }
}

/// Split `line` on `split_char`, ignoring delimiters inside quoted regions.
///
/// Quote characters toggle the quoted state and are dropped from the token
/// text but still counted in `full_length`. Inside a quoted region a doubled
/// quote stands for one literal quote. Empty tokens are preserved, so `a,,b`
/// yields three tokens.
pub fn split(line: &str, split_char: char, quote: Option<char>) -> Vec<LineToken> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut token_length = 0;
    let mut column = 0;

    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c == split_char && !in_quote {
            tokens.push(LineToken::new(std::mem::take(&mut current), token_length, column));
            token_length = 0;
        } else if Some(c) == quote {
            if in_quote && chars.next_if_eq(&c).is_some() {
                token_length += 2;
                column += 1;
                current.push(c);
            } else {
                token_length += 1;
                in_quote = !in_quote;
            }
        } else {
            token_length += 1;
            current.push(c);
        }
        column += 1;
    }

    tokens.push(LineToken::new(current, token_length, column));
    tokens
}

/// Resolve a configured delimiter to its split character.
///
/// `\t`, `\n`, `\r`, `\f` and `\\` become the control character they name;
/// any other value splits on its first character.
pub fn resolve_delimiter(delimiter: &str) -> Option<char> {
    let mut chars = delimiter.chars();
    let first = chars.next()?;
    if first == '\\' {
        if let (Some(second), None) = (chars.next(), chars.next()) {
            return Some(match second {
                't' => '\t',
                'n' => '\n',
                'r' => '\r',
                'f' => '\u{000C}',
                '\\' => '\\',
                other => {
                    warn!("Unrecognised delimiter escape '\\{}', splitting on '\\'", other);
                    '\\'
                }
            });
        }
    }
    Some(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[LineToken]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_quoted_delimiter_is_kept() {
        let tokens = split("a,\"b,c\",d", ',', Some('"'));
        assert_eq!(texts(&tokens), vec!["a", "b,c", "d"]);
    }

    #[test]
    fn test_doubled_quote_inside_quotes_is_literal() {
        let tokens = split("\"say \"\"hi\"\", bob\",x,\"\"", ',', Some('"'));
        assert_eq!(texts(&tokens), vec!["say \"hi\", bob", "x", ""]);
        assert_eq!(tokens[0].full_length, 17);
        assert_eq!(tokens[1].column, 18);
        assert_eq!(tokens[2].full_length, 2);
    }

    #[test]
    fn test_empty_tokens_preserved() {
        let tokens = split("a,,b", ',', None);
        assert_eq!(texts(&tokens), vec!["a", "", "b"]);
        assert_eq!(texts(&split("", ',', None)), vec![""]);
        assert_eq!(texts(&split("a,", ',', None)), vec!["a", ""]);
    }

    #[test]
    fn test_columns_and_full_lengths_count_quotes() {
        let tokens = split("ab,\"cd\",e", ',', Some('"'));
        assert_eq!(tokens[0].column, 0);
        assert_eq!(tokens[0].full_length, 2);
        assert_eq!(tokens[1].column, 3);
        assert_eq!(tokens[1].full_length, 4);
        assert_eq!(tokens[1].text, "cd");
        assert_eq!(tokens[2].column, 8);
    }

    #[test]
    fn test_resolve_delimiter_escapes() {
        assert_eq!(resolve_delimiter("\\t"), Some('\t'));
        assert_eq!(resolve_delimiter("\\n"), Some('\n'));
        assert_eq!(resolve_delimiter("\\r"), Some('\r'));
        assert_eq!(resolve_delimiter("\\f"), Some('\u{000C}'));
        assert_eq!(resolve_delimiter("\\\\"), Some('\\'));
        assert_eq!(resolve_delimiter("\\q"), Some('\\'));
        assert_eq!(resolve_delimiter("|"), Some('|'));
        assert_eq!(resolve_delimiter(""), None);
    }
}
