//! String-transform pipeline applied around every conversion.
//!
//! On read the pipeline strips padding and cleans the raw field text before
//! a converter sees it; on write the same options re-apply padding up to the
//! field's target length.

use super::options::ConversionOptions;
use crate::constants::options::{DEFAULT_VALUE, JUSTIFY, PAD_CHARACTER, STRIP_CHARS, SUBSTRING};
use crate::constants::{DEFAULT_JUSTIFY, DEFAULT_PAD_CHARACTER};
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

static NON_NUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\D+").unwrap());
static NON_ALPHA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z]+").unwrap());
static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").unwrap());

/// Apply justify, strip-chars, substring and default-value (in that order,
/// each only when configured), then truncate to `length` when positive.
pub fn transform_string(text: &str, options: &ConversionOptions, length: usize) -> String {
    let mut value = text.to_string();

    if let Some(direction) = options.get(JUSTIFY) {
        value = justify(&value, direction, options, length);
    }
    if let Some(mode) = options.get(STRIP_CHARS) {
        value = strip(&value, mode);
    }
    if let Some(range) = options.get(SUBSTRING) {
        value = substring(&value, range);
    }
    if let Some(default) = options.get(DEFAULT_VALUE) {
        value = default_value(&value, default);
    }

    if length > 0 && value.chars().count() > length {
        value = value.chars().take(length).collect();
    }
    value
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Justify {
    Left,
    Right,
    Both,
}

impl Justify {
    fn parse(direction: &str) -> Self {
        let direction = direction.trim();
        let direction = if direction.is_empty() {
            DEFAULT_JUSTIFY
        } else {
            direction
        };
        if direction.eq_ignore_ascii_case("left") {
            Justify::Left
        } else if direction.eq_ignore_ascii_case("right") {
            Justify::Right
        } else {
            Justify::Both
        }
    }
}

/// With `length == 0` remove padding, otherwise pad up to `length`.
///
/// Left-justified text carries its padding on the right and vice versa.
/// `both` strips either side on read and centres the text on write.
pub fn justify(text: &str, direction: &str, options: &ConversionOptions, length: usize) -> String {
    let justify = Justify::parse(direction);
    let pad_chars = options
        .get(PAD_CHARACTER)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PAD_CHARACTER);

    if length == 0 {
        let is_pad = |c: char| pad_chars.contains(c);
        return match justify {
            Justify::Left => text.trim_end_matches(is_pad).to_string(),
            Justify::Right => text.trim_start_matches(is_pad).to_string(),
            Justify::Both => text.trim_matches(is_pad).to_string(),
        };
    }

    let pad = pad_chars.chars().next().unwrap_or(' ');
    let current = text.chars().count();
    if current >= length {
        return text.to_string();
    }
    let padding = |count: usize| std::iter::repeat_n(pad, count).collect::<String>();
    let missing = length - current;
    match justify {
        Justify::Right => format!("{}{}", padding(missing), text),
        Justify::Left => format!("{}{}", text, padding(missing)),
        // odd padding puts the extra character on the right
        Justify::Both => {
            let before = missing / 2;
            format!("{}{}{}", padding(before), text, padding(missing - before))
        }
    }
}

/// Remove characters according to a strip mode
pub fn strip(text: &str, mode: &str) -> String {
    let mode = mode.trim();
    if mode.eq_ignore_ascii_case("non-numeric") {
        NON_NUMERIC.replace_all(text, "").into_owned()
    } else if mode.eq_ignore_ascii_case("non-alpha") {
        NON_ALPHA.replace_all(text, "").into_owned()
    } else if mode.eq_ignore_ascii_case("non-alphanumeric") {
        NON_ALPHANUMERIC.replace_all(text, "").into_owned()
    } else {
        warn!("Unknown strip-chars mode '{}' ignored", mode);
        text.to_string()
    }
}

/// Keep the `begin,end` character range; bounds are clamped to the text
pub fn substring(text: &str, range: &str) -> String {
    let Some((begin, end)) = parse_range(range) else {
        warn!("Malformed substring option '{}' ignored", range);
        return text.to_string();
    };
    let count = text.chars().count();
    let begin = begin.min(count);
    let end = end.clamp(begin, count);
    text.chars().skip(begin).take(end - begin).collect()
}

/// Parse a `begin,end` substring option
pub fn parse_range(range: &str) -> Option<(usize, usize)> {
    let (begin, end) = range.split_once(',')?;
    let begin = begin.trim().parse::<usize>().ok()?;
    let end = end.trim().parse::<usize>().ok()?;
    (begin <= end).then_some((begin, end))
}

/// Replace blank text with the default
pub fn default_value(text: &str, default: &str) -> String {
    if text.trim().is_empty() {
        default.to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_justify_removes_padding_on_read() {
        let left = ConversionOptions::new().with("justify", "left");
        assert_eq!(transform_string("abc   ", &left, 0), "abc");

        let right = ConversionOptions::new()
            .with("justify", "right")
            .with("pad-character", "0");
        assert_eq!(transform_string("000123", &right, 0), "123");

        let both = ConversionOptions::new().with("justify", "both");
        assert_eq!(transform_string("  x  ", &both, 0), "x");
    }

    #[test]
    fn test_justify_pads_on_write() {
        let right = ConversionOptions::new()
            .with("justify", "right")
            .with("pad-character", "0");
        assert_eq!(transform_string("42", &right, 5), "00042");

        let left = ConversionOptions::new().with("justify", "left");
        assert_eq!(transform_string("ab", &left, 4), "ab  ");
    }

    #[test]
    fn test_justify_both_centres_on_write() {
        let both = ConversionOptions::new()
            .with("justify", "both")
            .with("pad-character", "*");
        assert_eq!(transform_string("ab", &both, 6), "**ab**");
        assert_eq!(transform_string("ab", &both, 5), "*ab**");
        assert_eq!(transform_string("abcde", &both, 5), "abcde");
        // and strips back to the value on read
        assert_eq!(transform_string("*ab**", &both, 0), "ab");
    }

    #[test]
    fn test_truncates_to_length_without_padding() {
        let options = ConversionOptions::new();
        assert_eq!(transform_string("abcdef", &options, 3), "abc");
        assert_eq!(transform_string("ab", &options, 3), "ab");
    }

    #[test]
    fn test_strip_modes() {
        assert_eq!(strip("(555) 123-4567", "non-numeric"), "5551234567");
        assert_eq!(strip("a1b2-c3", "non-alpha"), "abc");
        assert_eq!(strip("a1 b2-c3!", "non-alphanumeric"), "a1b2c3");
        assert_eq!(strip("keep", "bogus"), "keep");
    }

    #[test]
    fn test_substring_and_default() {
        assert_eq!(substring("20240131", "4,6"), "01");
        assert_eq!(substring("abc", "1,10"), "bc");
        assert_eq!(default_value("   ", "N/A"), "N/A");
        assert_eq!(default_value("x", "N/A"), "x");
    }

    #[test]
    fn test_pipeline_fixed_order() {
        let options = ConversionOptions::new()
            .with("default-value", "0")
            .with("strip-chars", "non-numeric")
            .with("justify", "right");
        // justify, then strip, then default
        assert_eq!(transform_string("   ab", &options, 0), "0");
        assert_eq!(transform_string("  $1,234", &options, 0), "1234");
    }
}
