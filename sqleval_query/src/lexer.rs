use crate::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare word, lower-cased. Keywords are recognised by the parser.
    Word(String),
    /// `` `name` `` or `[name]`, lower-cased.
    QuotedIdent(String),
    Number(String),
    /// `'text'` or `"text"`.
    Str(String),
    Comma,
    LParen,
    RParen,
    Dot,
    Star,
    Semicolon,
    /// Comparison or arithmetic operator, with `<>` folded into `!=` and `==` into `=`.
    Op(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

impl Token {
    pub fn is_word(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Word(w) if w == word)
    }
}

pub fn tokenize(sql: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);
        let push = |tokens: &mut Vec<Token>, kind| tokens.push(Token { kind, offset });

        match c {
            c if c.is_whitespace() => i += 1,
            '-' if next == Some('-') => {
                while i < chars.len() && chars[i].1 != '\n' {
                    i += 1;
                }
            }
            '/' if next == Some('*') => {
                i += 2;
                loop {
                    match chars.get(i) {
                        None => return Err(ParseError::new(offset, "unterminated comment")),
                        Some((_, '*')) if chars.get(i + 1).map(|(_, c)| *c) == Some('/') => {
                            i += 2;
                            break;
                        }
                        Some(_) => i += 1,
                    }
                }
            }
            '\'' | '"' => {
                let (text, end) = quoted(&chars, i, c)?;
                push(&mut tokens, TokenKind::Str(text));
                i = end;
            }
            '`' => {
                let (text, end) = quoted(&chars, i, '`')?;
                push(&mut tokens, TokenKind::QuotedIdent(text.to_lowercase()));
                i = end;
            }
            '[' => {
                let (text, end) = quoted(&chars, i, ']')?;
                push(&mut tokens, TokenKind::QuotedIdent(text.to_lowercase()));
                i = end;
            }
            c if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                    i += 1;
                }
                if i < chars.len() && matches!(chars[i].1, 'e' | 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && matches!(chars[j].1, '+' | '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].1.is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].1.is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
                push(&mut tokens, TokenKind::Number(text));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
                push(&mut tokens, TokenKind::Word(text.to_lowercase()));
            }
            _ => {
                let (kind, width) = match (c, next) {
                    (',', _) => (TokenKind::Comma, 1),
                    ('(', _) => (TokenKind::LParen, 1),
                    (')', _) => (TokenKind::RParen, 1),
                    ('.', _) => (TokenKind::Dot, 1),
                    ('*', _) => (TokenKind::Star, 1),
                    (';', _) => (TokenKind::Semicolon, 1),
                    ('<', Some('>')) | ('!', Some('=')) => (TokenKind::Op("!="), 2),
                    ('<', Some('=')) => (TokenKind::Op("<="), 2),
                    ('>', Some('=')) => (TokenKind::Op(">="), 2),
                    ('=', Some('=')) => (TokenKind::Op("="), 2),
                    ('|', Some('|')) => (TokenKind::Op("||"), 2),
                    ('<', _) => (TokenKind::Op("<"), 1),
                    ('>', _) => (TokenKind::Op(">"), 1),
                    ('=', _) => (TokenKind::Op("="), 1),
                    ('+', _) => (TokenKind::Op("+"), 1),
                    ('-', _) => (TokenKind::Op("-"), 1),
                    ('/', _) => (TokenKind::Op("/"), 1),
                    ('%', _) => (TokenKind::Op("%"), 1),
                    _ => {
                        return Err(ParseError::new(
                            offset,
                            format!("unexpected character {:?}", c),
                        ))
                    }
                };
                push(&mut tokens, kind);
                i += width;
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        offset: sql.len(),
    });
    Ok(tokens)
}

/// Read a quoted run starting at `chars[start]`; a doubled closing quote is an escape.
fn quoted(chars: &[(usize, char)], start: usize, close: char) -> Result<(String, usize), ParseError> {
    let mut text = String::new();
    let mut i = start + 1;
    loop {
        match chars.get(i) {
            None => {
                return Err(ParseError::new(
                    chars[start].0,
                    format!("unterminated {} quote", chars[start].1),
                ))
            }
            Some((_, c)) if *c == close => {
                if close != ']' && chars.get(i + 1).map(|(_, c)| *c) == Some(close) {
                    text.push(close);
                    i += 2;
                } else {
                    return Ok((text, i + 1));
                }
            }
            Some((_, c)) => {
                text.push(*c);
                i += 1;
            }
        }
    }
}

/// Remove every `DISTINCT` keyword, leaving the rest of the text untouched.
///
/// Text that does not tokenize is returned as is so that executing it
/// reports the real error.
pub fn strip_distinct(sql: &str) -> String {
    const KEYWORD: &str = "distinct";
    let Ok(tokens) = tokenize(sql) else {
        return sql.to_string();
    };
    let mut out = String::with_capacity(sql.len());
    let mut copied = 0;
    for token in tokens.iter().filter(|t| t.is_word(KEYWORD)) {
        let end = token.offset + KEYWORD.len();
        match sql.get(token.offset..end) {
            Some(text) if text.eq_ignore_ascii_case(KEYWORD) => {
                out.push_str(&sql[copied..token.offset]);
                copied = end;
            }
            _ => {}
        }
    }
    out.push_str(&sql[copied..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        tokenize(sql)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_words_are_lowercased() {
        assert_eq!(
            kinds("SELECT Name FROM Singer"),
            vec![
                TokenKind::Word("select".into()),
                TokenKind::Word("name".into()),
                TokenKind::Word("from".into()),
                TokenKind::Word("singer".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_literals_and_operators() {
        assert_eq!(
            kinds("a <> 'it''s' AND b >= 1.5e3 -- tail"),
            vec![
                TokenKind::Word("a".into()),
                TokenKind::Op("!="),
                TokenKind::Str("it's".into()),
                TokenKind::Word("and".into()),
                TokenKind::Word("b".into()),
                TokenKind::Op(">="),
                TokenKind::Number("1.5e3".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_quoted_identifiers() {
        assert_eq!(
            kinds("`Free Meal` [Zip Code] \"text\""),
            vec![
                TokenKind::QuotedIdent("free meal".into()),
                TokenKind::QuotedIdent("zip code".into()),
                TokenKind::Str("text".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string_reports_offset() {
        let err = tokenize("SELECT 'abc").unwrap_err();
        assert_eq!(err.offset, 7);
    }

    #[test]
    fn test_strip_distinct_removes_keyword_only() {
        assert_eq!(
            strip_distinct("SELECT DISTINCT country FROM singer"),
            "SELECT  country FROM singer"
        );
        assert_eq!(
            strip_distinct("select count(distinct name), 'distinct' from t where distinct_col = 1"),
            "select count( name), 'distinct' from t where distinct_col = 1"
        );
        assert_eq!(strip_distinct("SELECT 'unterminated"), "SELECT 'unterminated");
    }
}
