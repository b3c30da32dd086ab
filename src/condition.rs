use crate::pattern::Operator;

/// One `field<op>pattern` term of a filter line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// None means "any column"
    pub field: Option<String>,
    pub operator: Operator,
    pub pattern: String,
}

/// Operator tokens in priority order. The first token present anywhere in
/// the condition wins and the text is split at its first occurrence.
const OPERATOR_TOKENS: [(&str, Operator); 4] = [
    ("!~", Operator::RegexNotMatch),
    ("=~", Operator::RegexMatch),
    ("!=", Operator::NotEquals),
    ("=", Operator::Equals),
];

impl Condition {
    /// Parse a single condition. Returns None for an empty string.
    pub fn parse(text: &str) -> Option<Condition> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let found = OPERATOR_TOKENS
            .into_iter()
            .find_map(|(token, operator)| text.find(token).map(|index| (index, token, operator)));

        match found {
            Some((index, token, operator)) => {
                let field = text[..index].trim();
                let pattern = strip_quotes(text[index + token.len()..].trim());
                Some(Condition {
                    field: (!field.is_empty()).then(|| field.to_string()),
                    operator,
                    pattern: pattern.to_string(),
                })
            }
            None => Some(Condition {
                field: None,
                operator: Operator::Wildcard,
                pattern: strip_quotes(text).to_string(),
            }),
        }
    }
}

/// Split a filter line on `,` into conditions, dropping empty ones
pub fn parse_line(line: &str) -> Vec<Condition> {
    line.split(',').filter_map(Condition::parse).collect()
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
