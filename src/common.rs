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

/// The TCP port the server listens on when the configuration does not say
/// otherwise.
pub const DEFAULT_PORT: u16 = 8080;

/// Maximum number of bytes read off a client connection in one go. A command
/// line longer than this is truncated.
pub const MAX_INPUT_SIZE: usize = 1024;

/// Maximum number of captured output bytes delivered back to a client for one
/// shell command. Longer outputs are truncated at this boundary.
pub const MAX_OUTPUT_SIZE: usize = 4096;

/// Maximum number of tasks the scheduler's queue will hold before submissions
/// are dropped.
pub const QUEUE_CAPACITY: usize = 100;

/// Quantum, in seconds, granted to a job the first time it is scheduled.
pub const QUANTUM_FIRST_ROUND: i32 = 3;

/// Quantum, in seconds, granted on every round after the first.
pub const QUANTUM_LATER_ROUNDS: i32 = 7;

/// Burst assigned to a job submitted without a usable burst argument.
pub const DEFAULT_BURST: i32 = 5;

/// The prompt appended to a client's output stream once a command completes.
pub const PROMPT: &'static str = "$ ";

// ANSI escapes for the scheduler's console markers.
pub const COLOR_BLUE: &'static str = "\x1b[1;34m";
pub const COLOR_GREEN: &'static str = "\x1b[1;32m";
pub const COLOR_YELLOW: &'static str = "\x1b[1;33m";
pub const COLOR_RED: &'static str = "\x1b[1;31m";
pub const COLOR_RESET: &'static str = "\x1b[0m";

/// Wraps `text` in the given ANSI color escape if `enabled` is true, and
/// returns it untouched otherwise.
pub fn paint(color: &str, text: String, enabled: bool) -> String {
    if enabled {
        format!("{}{}{}", color, text, COLOR_RESET)
    } else {
        text
    }
}
