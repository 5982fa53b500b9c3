/* Copyright (c) 2018 University of Utah
 *
 * Permission to use, copy, modify, and distribute this software for any
 * purpose with or without fee is hereby granted, provided that the above
 * copyright notice and this permission notice appear in all copies.
 *
 * THE SOFTWARE IS PROVIDED "AS IS" AND THE AUTHOR(S) DISCLAIM ALL WARRANTIES
 * WITH REGARD TO THIS SOFTWARE INCLUDING ALL IMPLIED WARRANTIES OF
 * MERCHANTABILITY AND FITNESS. IN NO EVENT SHALL AUTHORS BE LIABLE FOR
 * ANY SPECIAL, DIRECT, INDIRECT, OR CONSEQUENTIAL DAMAGES OR ANY DAMAGES
 * WHATSOEVER RESULTING FROM LOSS OF USE, DATA OR PROFITS, WHETHER IN AN
 * ACTION OF CONTRACT, NEGLIGENCE OR OTHER TORTIOUS ACTION, ARISING OUT OF
 * OR IN CONNECTION WITH THE USE OR PERFORMANCE OF THIS SOFTWARE.
 */

/// One parsed command: an argv plus any redirections that were attached to
/// it. Pipelines are represented as a sequence of these, one per segment.
#[derive(Debug, PartialEq)]
pub struct Command {
    /// The program name followed by its arguments. Never empty.
    pub args: Vec<String>,

    /// Target of `<`, if present.
    pub input_file: Option<String>,

    /// Target of `>`, if present.
    pub output_file: Option<String>,

    /// Target of `2>`, if present.
    pub error_file: Option<String>,
}

/// The ways a command line can fail to parse. Each carries the exact message
/// delivered back to the client.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParseError {
    /// A quote was opened and never closed.
    UnmatchedQuotes,

    /// The line contained no command at all (only whitespace, or only
    /// redirection operators).
    NoCommand,

    /// Two pipe operators with nothing between them, or a pipeline that
    /// starts or ends with a pipe.
    EmptyPipe,
}

impl ParseError {
    /// The client-visible message for this error, newline included.
    pub fn message(&self) -> &'static str {
        match *self {
            ParseError::UnmatchedQuotes => "Error: Unmatched quotes.\n",
            ParseError::NoCommand => "Error: No command specified.\n",
            ParseError::EmptyPipe => "Error: Empty command between pipes.\n",
        }
    }
}

/// Parses a single command (no pipes) into a `Command`.
///
/// Tokens are split on whitespace. Single and double quotes group characters
/// into one token, so `echo "a b"` has two tokens. The redirection operators
/// `<`, `>`, and `2>` each consume the following token as their target.
///
/// # Arguments
///
/// * `input`: The command line to parse.
///
/// # Return
///
/// The parsed command, or the reason it could not be parsed.
pub fn parse(input: &str) -> Result<Command, ParseError> {
    let tokens = tokenize(input)?;

    let mut args = Vec::with_capacity(tokens.len());
    let mut input_file = None;
    let mut output_file = None;
    let mut error_file = None;

    let mut iter = tokens.into_iter();
    while let Some(token) = iter.next() {
        match token.as_str() {
            "<" => input_file = Some(iter.next().unwrap_or_default()),
            ">" => output_file = Some(iter.next().unwrap_or_default()),
            "2>" => error_file = Some(iter.next().unwrap_or_default()),
            // A stray pipe this deep means the caller did not split the
            // pipeline first; it carries no argument value either way.
            "|" => {}
            _ => args.push(token),
        }
    }

    if args.is_empty() {
        return Err(ParseError::NoCommand);
    }

    Ok(Command {
        args: args,
        input_file: input_file,
        output_file: output_file,
        error_file: error_file,
    })
}

/// Splits a command line on unquoted `|` into pipeline segments.
///
/// # Return
///
/// The segments in order, each still raw text for `parse`. An empty segment
/// (as in `ls || wc`, or a leading/trailing pipe) is an error.
pub fn split_pipeline(input: &str) -> Result<Vec<String>, ParseError> {
    let mut segments = vec![String::new()];
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                segments.last_mut().unwrap().push(c);
            }

            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                    segments.last_mut().unwrap().push(c);
                } else if c == '|' {
                    segments.push(String::new());
                } else {
                    segments.last_mut().unwrap().push(c);
                }
            }
        }
    }

    if segments.iter().any(|s| s.trim().is_empty()) {
        return Err(ParseError::EmptyPipe);
    }

    Ok(segments)
}

// Splits the input on whitespace into tokens, honoring single and double
// quotes. Quotes group; they do not appear in the produced token.
fn tokenize(input: &str) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }

            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                } else if c.is_whitespace() {
                    if !current.is_empty() {
                        tokens.push(current.clone());
                        current.clear();
                    }
                } else {
                    current.push(c);
                }
            }
        }
    }

    if quote.is_some() {
        return Err(ParseError::UnmatchedQuotes);
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    Ok(tokens)
}
