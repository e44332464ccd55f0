//! Named-parameter rewriting
//!
//! Rewrites `:name` placeholders to positional `?` while recording their
//! order. The prepare-time copy substitutes `0` for LIMIT/OFFSET parameters
//! so the statement can be prepared for metadata without bound values.

/// Result of the rewrite pre-pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenSql {
    /// SQL with every named parameter replaced by `?`.
    pub sql: String,
    /// SQL for preparation: LIMIT/OFFSET parameters replaced by `0` instead.
    pub prepare_sql: String,
    /// Every occurrence in positional order, duplicates kept.
    pub occurrences: Vec<String>,
    /// Distinct names in first-occurrence order.
    pub named_parameters: Vec<String>,
}

/// Rewrite `:name` parameters in `sql`. Placeholders inside quoted literals
/// or quoted identifiers are left alone. `zero_params` names the parameters
/// (without `:`) that take a literal `0` in the prepare copy.
pub fn rewrite_named_parameters(sql: &str, zero_params: &[String]) -> RewrittenSql {
    #[derive(PartialEq)]
    enum State {
        Plain,
        SingleQuote,
        DoubleQuote,
    }

    let mut out = String::with_capacity(sql.len());
    let mut prepare = String::with_capacity(sql.len());
    let mut occurrences = Vec::new();
    let mut named = Vec::new();
    let mut state = State::Plain;
    let mut chars = sql.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        match state {
            State::Plain => match ch {
                '\'' => {
                    state = State::SingleQuote;
                    out.push(ch);
                    prepare.push(ch);
                }
                '"' => {
                    state = State::DoubleQuote;
                    out.push(ch);
                    prepare.push(ch);
                }
                ':' if matches!(chars.peek(), Some((_, c)) if is_ident_start(*c)) => {
                    let mut name = String::new();
                    while let Some(&(_, c)) = chars.peek() {
                        if is_ident_char(c) {
                            name.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if zero_params.iter().any(|p| p == &name) {
                        prepare.push('0');
                    } else {
                        prepare.push('?');
                    }
                    out.push('?');
                    if !named.contains(&name) {
                        named.push(name.clone());
                    }
                    occurrences.push(name);
                }
                _ => {
                    out.push(ch);
                    prepare.push(ch);
                }
            },
            State::SingleQuote => {
                out.push(ch);
                prepare.push(ch);
                if ch == '\'' {
                    if matches!(chars.peek(), Some((_, '\''))) {
                        let (_, next) = chars.next().unwrap();
                        out.push(next);
                        prepare.push(next);
                    } else {
                        state = State::Plain;
                    }
                }
            }
            State::DoubleQuote => {
                out.push(ch);
                prepare.push(ch);
                if ch == '"' {
                    if matches!(chars.peek(), Some((_, '"'))) {
                        let (_, next) = chars.next().unwrap();
                        out.push(next);
                        prepare.push(next);
                    } else {
                        state = State::Plain;
                    }
                }
            }
        }
    }

    RewrittenSql {
        sql: out,
        prepare_sql: prepare,
        occurrences,
        named_parameters: named,
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
