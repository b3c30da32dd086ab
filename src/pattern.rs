use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`: case-insensitive equality, or a wildcard match if the pattern has metacharacters
    Equals,
    /// `!=`
    NotEquals,
    /// `=~`: case-insensitive regex search
    RegexMatch,
    /// `!~`
    RegexNotMatch,
    /// Bare pattern: wildcard search, substring if no metacharacters
    Wildcard,
}

impl Operator {
    pub fn token(&self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::RegexMatch => "=~",
            Operator::RegexNotMatch => "!~",
            Operator::Wildcard => "",
        }
    }

    pub fn is_negated(&self) -> bool {
        matches!(self, Operator::NotEquals | Operator::RegexNotMatch)
    }
}

pub fn has_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Translate a shell-style wildcard into an anchored regex source.
/// `*` any run, `?` one character, `[...]` a set (`[!...]` negated).
/// An unterminated `[` is taken literally.
pub fn wildcard_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                let mut j = i + 1;
                if j < chars.len() && chars[j] == '!' {
                    j += 1;
                }
                if j < chars.len() && chars[j] == ']' {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    out.push_str(r"\[");
                } else {
                    let mut body: String = chars[i + 1..j].iter().collect();
                    let negated = body.starts_with('!');
                    if negated {
                        body.remove(0);
                    }
                    out.push('[');
                    if negated {
                        out.push('^');
                    }
                    push_set_body(&mut out, &body);
                    out.push(']');
                    i = j;
                }
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    out.push('$');
    out
}

/// Emit the members of a `[...]` set. Only a well-ordered `a-z` span stays a
/// range; every other punctuation character is escaped so the regex engine
/// never sees class operators such as `&&`, `--` or `~~`.
fn push_set_body(out: &mut String, body: &str) {
    let chars: Vec<char> = body.chars().collect();
    let push_member = |out: &mut String, c: char| {
        if c.is_ascii_punctuation() && c != '<' && c != '>' {
            out.push('\\');
        }
        out.push(c);
    };

    let mut k = 0;
    while k < chars.len() {
        if k + 2 < chars.len() && chars[k + 1] == '-' && chars[k] <= chars[k + 2] {
            push_member(out, chars[k]);
            out.push('-');
            push_member(out, chars[k + 2]);
            k += 3;
        } else {
            push_member(out, chars[k]);
            k += 1;
        }
    }
}

/// A compiled pattern, ready to be applied to row values.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Lowercased literal, compared for equality
    Exact(String),
    /// Lowercased literal, searched as a substring
    Contains(String),
    Regex(Regex),
    /// The pattern could not be compiled; nothing ever matches
    Never,
}

impl Matcher {
    pub fn is_match(&self, value: &str) -> bool {
        match self {
            Matcher::Exact(expected) => value.to_lowercase() == *expected,
            Matcher::Contains(needle) => value.to_lowercase().contains(needle.as_str()),
            Matcher::Regex(regex) => regex.is_match(value),
            Matcher::Never => false,
        }
    }
}

/// Operator plus compiled matcher. Negation is applied on top of the matcher
/// result. A broken pattern never matches, under either polarity.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    operator: Operator,
    matcher: Matcher,
}

impl CompiledPattern {
    /// Compile `pattern` for `operator`. Regex errors are returned so the
    /// caller can report them once; the fallback matcher is still usable.
    pub fn compile(operator: Operator, pattern: &str) -> (Self, Option<regex::Error>) {
        let (matcher, error) = match operator {
            Operator::Equals | Operator::NotEquals => {
                if has_wildcard(pattern) {
                    build_regex(&wildcard_to_regex(pattern))
                } else {
                    (Matcher::Exact(pattern.to_lowercase()), None)
                }
            }
            Operator::RegexMatch | Operator::RegexNotMatch => build_regex(pattern),
            Operator::Wildcard => {
                if has_wildcard(pattern) {
                    build_regex(&wildcard_to_regex(pattern))
                } else {
                    (Matcher::Contains(pattern.to_lowercase()), None)
                }
            }
        };
        (CompiledPattern { operator, matcher }, error)
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn is_broken(&self) -> bool {
        matches!(self.matcher, Matcher::Never)
    }

    pub fn matches(&self, value: &str) -> bool {
        if self.is_broken() {
            return false;
        }
        let hit = self.matcher.is_match(value);
        if self.operator.is_negated() {
            !hit
        } else {
            hit
        }
    }
}

fn build_regex(source: &str) -> (Matcher, Option<regex::Error>) {
    match RegexBuilder::new(source).case_insensitive(true).build() {
        Ok(regex) => (Matcher::Regex(regex), None),
        Err(e) => (Matcher::Never, Some(e)),
    }
}

/// One-shot convenience over [`CompiledPattern`]
pub fn matches(value: &str, pattern: &str, operator: Operator) -> bool {
    CompiledPattern::compile(operator, pattern).0.matches(value)
}
