use crate::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    ObjLit(i64),
    Ident(String),

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    Colon,
    Dot,
    DotDot,
    Dollar,
    At,
    Question,
    Pipe,
    Backquote,
    Quote,
    Arrow,

    Assign,
    Eq,
    NEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Bang,
    AndAnd,
    OrOr,

    Eof,
}

#[derive(Debug, Clone)]
pub struct SpannedTok {
    pub tok: Tok,
    pub line: usize,
}

/// Tokenize verb source. Identifiers and keywords are not distinguished
/// here; the parser matches keywords case-insensitively on `Ident`.
pub fn lex(source: &str) -> Result<Vec<SpannedTok>, CompileError> {
    let mut out = vec![];
    let mut chars = source.chars().peekable();
    let mut line = 1usize;

    macro_rules! push {
        ($tok:expr) => {
            out.push(SpannedTok { tok: $tok, line })
        };
    }

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '"' => {
                chars.next();
                let start_line = line;
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(e) => s.push(e),
                            None => return Err(CompileError::UnterminatedString(start_line)),
                        },
                        Some('\n') | None => {
                            return Err(CompileError::UnterminatedString(start_line));
                        }
                        Some(c) => s.push(c),
                    }
                }
                push!(Tok::Str(s));
            }
            '#' => {
                chars.next();
                let mut num = String::new();
                if chars.peek() == Some(&'-') {
                    num.push('-');
                    chars.next();
                }
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        num.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let id = num.parse().map_err(|_| CompileError::BadNumber(line))?;
                push!(Tok::ObjLit(id));
            }
            c if c.is_ascii_digit() => {
                let mut num = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        num.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // A single '.' continues a float literal; ".." is a range.
                let mut is_float = false;
                if chars.peek() == Some(&'.') {
                    let mut ahead = chars.clone();
                    ahead.next();
                    if ahead.peek() != Some(&'.') {
                        is_float = true;
                        num.push('.');
                        chars.next();
                        while let Some(&d) = chars.peek() {
                            if d.is_ascii_digit() {
                                num.push(d);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                    }
                }
                if matches!(chars.peek(), Some('e') | Some('E')) {
                    is_float = true;
                    num.push('e');
                    chars.next();
                    if matches!(chars.peek(), Some('+') | Some('-')) {
                        num.push(chars.next().unwrap());
                    }
                    while let Some(&d) = chars.peek() {
                        if d.is_ascii_digit() {
                            num.push(d);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
                if is_float {
                    let f = num.parse().map_err(|_| CompileError::BadNumber(line))?;
                    push!(Tok::Float(f));
                } else {
                    let i = num.parse().map_err(|_| CompileError::BadNumber(line))?;
                    push!(Tok::Int(i));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                push!(Tok::Ident(ident));
            }
            _ => {
                chars.next();
                let tok = match c {
                    '(' => Tok::LParen,
                    ')' => Tok::RParen,
                    '{' => Tok::LBrace,
                    '}' => Tok::RBrace,
                    '[' => Tok::LBracket,
                    ']' => Tok::RBracket,
                    ';' => Tok::Semicolon,
                    ',' => Tok::Comma,
                    ':' => Tok::Colon,
                    '$' => Tok::Dollar,
                    '@' => Tok::At,
                    '?' => Tok::Question,
                    '`' => Tok::Backquote,
                    '\'' => Tok::Quote,
                    '+' => Tok::Plus,
                    '-' => Tok::Minus,
                    '*' => Tok::Star,
                    '/' => Tok::Slash,
                    '%' => Tok::Percent,
                    '^' => Tok::Caret,
                    '.' => {
                        if chars.peek() == Some(&'.') {
                            chars.next();
                            Tok::DotDot
                        } else {
                            Tok::Dot
                        }
                    }
                    '=' => match chars.peek() {
                        Some('=') => {
                            chars.next();
                            Tok::Eq
                        }
                        Some('>') => {
                            chars.next();
                            Tok::Arrow
                        }
                        _ => Tok::Assign,
                    },
                    '!' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Tok::NEq
                        } else {
                            Tok::Bang
                        }
                    }
                    '<' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Tok::LtE
                        } else {
                            Tok::Lt
                        }
                    }
                    '>' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Tok::GtE
                        } else {
                            Tok::Gt
                        }
                    }
                    '&' => {
                        if chars.peek() == Some(&'&') {
                            chars.next();
                            Tok::AndAnd
                        } else {
                            return Err(CompileError::ParseError {
                                line,
                                message: "unexpected '&'".to_string(),
                            });
                        }
                    }
                    '|' => {
                        if chars.peek() == Some(&'|') {
                            chars.next();
                            Tok::OrOr
                        } else {
                            Tok::Pipe
                        }
                    }
                    other => {
                        return Err(CompileError::ParseError {
                            line,
                            message: format!("unexpected character {other:?}"),
                        });
                    }
                };
                push!(tok);
            }
        }
    }
    out.push(SpannedTok {
        tok: Tok::Eof,
        line,
    });
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<Tok> {
        lex(s).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn numbers_and_ranges() {
        assert_eq!(
            toks("x[1..3]"),
            vec![
                Tok::Ident("x".into()),
                Tok::LBracket,
                Tok::Int(1),
                Tok::DotDot,
                Tok::Int(3),
                Tok::RBracket,
                Tok::Eof
            ]
        );
        assert_eq!(toks("1.5"), vec![Tok::Float(1.5), Tok::Eof]);
        assert_eq!(toks("#-1"), vec![Tok::ObjLit(-1), Tok::Eof]);
    }

    #[test]
    fn strings_with_escapes() {
        assert_eq!(
            toks(r#""say \"hi\"""#),
            vec![Tok::Str("say \"hi\"".into()), Tok::Eof]
        );
        assert!(matches!(
            lex("\"unterminated"),
            Err(CompileError::UnterminatedString(1))
        ));
    }

    #[test]
    fn operators() {
        assert_eq!(
            toks("a == b != c <= d => e"),
            vec![
                Tok::Ident("a".into()),
                Tok::Eq,
                Tok::Ident("b".into()),
                Tok::NEq,
                Tok::Ident("c".into()),
                Tok::LtE,
                Tok::Ident("d".into()),
                Tok::Arrow,
                Tok::Ident("e".into()),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn line_tracking() {
        let ts = lex("a;\nb;").unwrap();
        assert_eq!(ts[0].line, 1);
        assert_eq!(ts[2].line, 2);
    }
}
