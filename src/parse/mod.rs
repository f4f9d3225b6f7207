//! The lexer and token utilities shared by the single-command and pipeline
//! paths.
//!
//! A command line is a flat sequence of [`Token`]s. Words become `argv`
//! elements; the four separators keep their shell meaning. There is no
//! quoting or expansion, words are taken literally.

use crate::common::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// A literal `argv` word.
    Word(String),
    /// `<`
    RedirIn,
    /// `>`
    RedirOut,
    /// `|`
    Pipe,
    /// `&`
    Background,
}

/// Split a raw line into tokens. The separator characters split words whether
/// or not they are surrounded by whitespace, so `a|b` and `a | b` tokenize
/// the same.
pub(crate) fn tokenize(line: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();

    let mut flush = |word: &mut String, tokens: &mut Vec<Token>| {
        if !word.is_empty() {
            tokens.push(Token::Word(std::mem::take(word)));
        }
    };

    for ch in line.chars() {
        let separator = match ch {
            '<' => Some(Token::RedirIn),
            '>' => Some(Token::RedirOut),
            '|' => Some(Token::Pipe),
            '&' => Some(Token::Background),
            _ => None,
        };

        if let Some(token) = separator {
            flush(&mut word, &mut tokens);
            tokens.push(token);
        } else if ch.is_whitespace() {
            flush(&mut word, &mut tokens);
        } else {
            word.push(ch);
        }
    }
    flush(&mut word, &mut tokens);

    tokens
}

/// Remove a trailing `&` and report whether it was there. Only the very last
/// token counts as a background marker; a stray `&` elsewhere is caught later
/// by [`into_words`].
pub(crate) fn strip_background(tokens: &mut Vec<Token>) -> bool {
    if tokens.last() == Some(&Token::Background) {
        tokens.pop();
        true
    } else {
        false
    }
}

pub(crate) fn is_pipeline(tokens: &[Token]) -> bool {
    tokens.contains(&Token::Pipe)
}

/// Convert a redirection-free command (one pipeline stage or a single
/// command) into its `argv`. Any leftover separator is a grammar violation.
pub(crate) fn into_words(tokens: Vec<Token>) -> Result<Vec<String>, Error> {
    tokens
        .into_iter()
        .map(|token| match token {
            Token::Word(word) => Ok(word),
            Token::Background => Err(Error::Syntax("unexpected '&'")),
            Token::Pipe => Err(Error::Syntax("unexpected '|'")),
            Token::RedirIn | Token::RedirOut => Err(Error::MalformedRedirection),
        })
        .collect()
}
