//! Single-pass statement splitter.
//!
//! Splits a SQL file into individual statements, attaching the comment
//! blocks observed before a statement's first body character (`top_comments`)
//! and the ones observed inside the statement (`inner_comments`). Semicolons
//! inside quoted literals or comments never terminate a statement.

use std::path::Path;

use crate::error::{GeneratorError, SourceLocation};

/// A single comment (line or block), with the introducer retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentBlock {
    /// Raw comment text including `--` or `/* */` markers.
    pub text: String,
    /// 1-based line the comment starts on.
    pub line: usize,
    /// Byte offset of the comment start.
    pub offset: usize,
}

/// One SQL statement with its attached comments.
#[derive(Debug, Clone)]
pub struct StatementBlock {
    pub top_comments: Vec<CommentBlock>,
    pub inner_comments: Vec<CommentBlock>,
    /// Statement text from the first body character through the terminating
    /// semicolon (inclusive, when present). Comments are lifted out into
    /// `inner_comments`; a line comment leaves its newline behind and a
    /// block comment leaves a single space.
    pub sql: String,
    /// 1-based line of the first body character.
    pub line: usize,
    /// Byte offset of the first body character.
    pub offset: usize,
}

impl StatementBlock {
    /// All comments of the statement, top comments first.
    pub fn all_comments(&self) -> impl Iterator<Item = &CommentBlock> {
        self.top_comments.iter().chain(self.inner_comments.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Outside,
    LineComment,
    BlockComment,
    SingleQuote,
    DoubleQuote,
}

/// Split `text` into statements. `file` is used for error locations only.
pub fn split(file: &Path, text: &str) -> Result<Vec<StatementBlock>, GeneratorError> {
    let mut statements: Vec<StatementBlock> = Vec::new();

    let mut state = State::Outside;
    let mut line = 1usize;
    let mut column = 1usize;

    let mut sql = String::new();
    let mut has_body = false;
    let mut stmt_line = 0usize;
    let mut stmt_offset = 0usize;
    let mut top_comments: Vec<CommentBlock> = Vec::new();
    let mut inner_comments: Vec<CommentBlock> = Vec::new();

    let mut comment = String::new();
    let mut comment_line = 0usize;
    let mut comment_offset = 0usize;

    // Start location of the currently open quote or block comment, for
    // unterminated-literal diagnostics.
    let mut open_location = SourceLocation::default();

    let mut chars = text.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        match state {
            State::Outside => match ch {
                '-' if matches!(chars.peek(), Some((_, '-'))) => {
                    chars.next();
                    column += 1;
                    state = State::LineComment;
                    comment.clear();
                    comment.push_str("--");
                    comment_line = line;
                    comment_offset = offset;
                }
                '/' if matches!(chars.peek(), Some((_, '*'))) => {
                    chars.next();
                    column += 1;
                    state = State::BlockComment;
                    comment.clear();
                    comment.push_str("/*");
                    comment_line = line;
                    comment_offset = offset;
                    open_location = SourceLocation::new(file, line, column - 1, offset);
                }
                ';' => {
                    if has_body {
                        sql.push(';');
                        statements.push(StatementBlock {
                            top_comments: std::mem::take(&mut top_comments),
                            inner_comments: std::mem::take(&mut inner_comments),
                            sql: std::mem::take(&mut sql),
                            line: stmt_line,
                            offset: stmt_offset,
                        });
                        has_body = false;
                    }
                    // A semicolon with no preceding body is an empty
                    // statement; discard it but keep pending comments.
                }
                '\'' => {
                    mark_body(&mut has_body, &mut stmt_line, &mut stmt_offset, line, offset);
                    sql.push(ch);
                    open_location = SourceLocation::new(file, line, column, offset);
                    state = State::SingleQuote;
                }
                '"' => {
                    mark_body(&mut has_body, &mut stmt_line, &mut stmt_offset, line, offset);
                    sql.push(ch);
                    open_location = SourceLocation::new(file, line, column, offset);
                    state = State::DoubleQuote;
                }
                _ if ch.is_whitespace() => {
                    if has_body {
                        sql.push(ch);
                    }
                }
                _ => {
                    mark_body(&mut has_body, &mut stmt_line, &mut stmt_offset, line, offset);
                    sql.push(ch);
                }
            },
            State::LineComment => {
                if ch == '\n' {
                    finish_comment(
                        &mut comment,
                        comment_line,
                        comment_offset,
                        has_body,
                        &mut top_comments,
                        &mut inner_comments,
                    );
                    if has_body {
                        sql.push('\n');
                    }
                    state = State::Outside;
                } else {
                    comment.push(ch);
                }
            }
            State::BlockComment => {
                comment.push(ch);
                if ch == '*' {
                    if let Some((_, '/')) = chars.peek() {
                        chars.next();
                        column += 1;
                        comment.push('/');
                        finish_comment(
                            &mut comment,
                            comment_line,
                            comment_offset,
                            has_body,
                            &mut top_comments,
                            &mut inner_comments,
                        );
                        if has_body {
                            // Keep tokens on either side of the comment apart.
                            sql.push(' ');
                        }
                        state = State::Outside;
                    }
                }
            }
            State::SingleQuote => {
                sql.push(ch);
                if ch == '\'' {
                    if let Some((_, '\'')) = chars.peek() {
                        chars.next();
                        column += 1;
                        sql.push('\'');
                    } else {
                        state = State::Outside;
                    }
                }
            }
            State::DoubleQuote => {
                sql.push(ch);
                if ch == '"' {
                    if let Some((_, '"')) = chars.peek() {
                        chars.next();
                        column += 1;
                        sql.push('"');
                    } else {
                        state = State::Outside;
                    }
                }
            }
        }

        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }

    match state {
        State::BlockComment => {
            return Err(GeneratorError::LexError {
                location: open_location,
                message: "unterminated block comment".to_string(),
            });
        }
        State::SingleQuote => {
            return Err(GeneratorError::LexError {
                location: open_location,
                message: "unterminated string literal".to_string(),
            });
        }
        State::DoubleQuote => {
            return Err(GeneratorError::LexError {
                location: open_location,
                message: "unterminated quoted identifier".to_string(),
            });
        }
        State::LineComment => {
            // Line comment at EOF without a trailing newline.
            finish_comment(
                &mut comment,
                comment_line,
                comment_offset,
                has_body,
                &mut top_comments,
                &mut inner_comments,
            );
        }
        State::Outside => {}
    }

    if has_body && !sql.trim().is_empty() {
        statements.push(StatementBlock {
            top_comments: std::mem::take(&mut top_comments),
            inner_comments: std::mem::take(&mut inner_comments),
            sql: std::mem::take(&mut sql),
            line: stmt_line,
            offset: stmt_offset,
        });
    }

    // Comments trailing the final statement would be top comments of a
    // statement that never starts; attach them to the last statement so
    // annotations are never dropped.
    if !top_comments.is_empty() {
        if let Some(last) = statements.last_mut() {
            last.inner_comments.append(&mut top_comments);
        }
    }

    Ok(statements)
}

fn mark_body(
    has_body: &mut bool,
    stmt_line: &mut usize,
    stmt_offset: &mut usize,
    line: usize,
    offset: usize,
) {
    if !*has_body {
        *has_body = true;
        *stmt_line = line;
        *stmt_offset = offset;
    }
}

fn finish_comment(
    comment: &mut String,
    comment_line: usize,
    comment_offset: usize,
    has_body: bool,
    top_comments: &mut Vec<CommentBlock>,
    inner_comments: &mut Vec<CommentBlock>,
) {
    let block = CommentBlock {
        text: std::mem::take(comment),
        line: comment_line,
        offset: comment_offset,
    };
    if has_body {
        inner_comments.push(block);
    } else {
        top_comments.push(block);
    }
}
