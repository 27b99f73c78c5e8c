/// Glob-style matcher for component paths and signal names.
///
/// `?` matches one character other than `.`, `*` matches any run of
/// characters other than `.`, `**` matches anything. Everything else matches
/// literally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    pattern: String,
    literal: bool,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            literal: !pattern.contains(['*', '?']),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn is_literal(&self) -> bool {
        self.literal
    }

    pub fn matches(&self, text: &str) -> bool {
        if self.literal {
            return self.pattern == text;
        }
        glob_match(self.pattern.as_bytes(), text.as_bytes())
    }
}

fn glob_match(pat: &[u8], text: &[u8]) -> bool {
    match pat.first() {
        None => text.is_empty(),
        Some(b'*') if pat.get(1) == Some(&b'*') => {
            let rest = &pat[2..];
            (0..=text.len()).any(|i| glob_match(rest, &text[i..]))
        }
        Some(b'*') => {
            let rest = &pat[1..];
            for i in 0..=text.len() {
                if glob_match(rest, &text[i..]) {
                    return true;
                }
                if i < text.len() && text[i] == b'.' {
                    break;
                }
            }
            false
        }
        Some(b'?') => match text.first() {
            Some(c) if *c != b'.' => glob_match(&pat[1..], &text[1..]),
            _ => false,
        },
        Some(c) => text.first() == Some(c) && glob_match(&pat[1..], &text[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_match() {
        let p = PathPattern::new("net.host");
        assert!(p.is_literal());
        assert!(p.matches("net.host"));
        assert!(!p.matches("net.host2"));
    }

    #[test]
    fn test_single_star_stops_at_dots() {
        let p = PathPattern::new("net.*");
        assert!(p.matches("net.a"));
        assert!(!p.matches("net.a.b"));
        assert!(PathPattern::new("net.host[*]").matches("net.host[12]"));
    }

    #[test]
    fn test_double_star_crosses_dots() {
        let p = PathPattern::new("net.**.sink");
        assert!(p.matches("net.a.b.sink"));
        assert!(!p.matches("net.a.b.source"));
        assert!(PathPattern::new("**").matches("anything.at.all"));
    }

    #[test]
    fn test_question_mark() {
        let p = PathPattern::new("pkt?");
        assert!(p.matches("pkt1"));
        assert!(!p.matches("pkt"));
        assert!(!p.matches("pkt."));
    }
}
