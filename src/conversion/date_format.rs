//! Translation of `yyyy-MM-dd`-style date patterns into chrono format strings.

/// Translate a pattern such as `yyyyMMdd HH:mm:ss` into `%Y%m%d %H:%M:%S`.
///
/// Quoted sections (`'T'`) are copied literally; `''` is a literal quote.
pub fn translate_pattern(pattern: &str) -> Result<String, String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            if chars.get(i + 1) == Some(&'\'') {
                out.push('\'');
                i += 2;
                continue;
            }
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                push_literal(&mut out, chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }

        if !c.is_ascii_alphabetic() {
            push_literal(&mut out, c);
            i += 1;
            continue;
        }

        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }

        let spec = match (c, run) {
            ('y', 2) => "%y",
            ('y', _) => "%Y",
            ('M', 1) => "%-m",
            ('M', 2) => "%m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d', 1) => "%-d",
            ('d', _) => "%d",
            ('H', 1) => "%-H",
            ('H', _) => "%H",
            ('h', 1) => "%-I",
            ('h', _) => "%I",
            ('m', _) => "%M",
            ('s', _) => "%S",
            ('S', 1..=3) => "%3f",
            ('S', _) => "%6f",
            ('a', _) => "%p",
            ('E', 1..=3) => "%a",
            ('E', _) => "%A",
            _ => {
                return Err(format!(
                    "Unsupported date pattern letter '{}' in '{}'",
                    c, pattern
                ));
            }
        };
        out.push_str(spec);
        i += run;
    }

    Ok(out)
}

/// Whether a translated format carries a time-of-day component
pub fn has_time_component(chrono_format: &str) -> bool {
    ["%H", "%-H", "%I", "%-I", "%M", "%S", "%p", "%3f", "%6f"]
        .iter()
        .any(|spec| chrono_format.contains(spec))
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}
