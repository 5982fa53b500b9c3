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

use std::fs::File;
use std::io::Read;

use super::common;
use toml;

/// Server configuration, read from a TOML file at startup. Every field is
/// optional in the file; missing fields take the defaults from `common`.
#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    /// The TCP port the server listens on for client connections.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum number of tasks the scheduler's queue will hold.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Quantum, in seconds, granted to a job on its first scheduling round.
    #[serde(default = "default_quantum_first")]
    pub quantum_first: i32,

    /// Quantum, in seconds, granted on every round after the first.
    #[serde(default = "default_quantum_later")]
    pub quantum_later: i32,

    /// If true, the scheduler's console markers are wrapped in ANSI color
    /// escapes.
    #[serde(default = "default_colors")]
    pub colors: bool,
}

fn default_port() -> u16 {
    common::DEFAULT_PORT
}

fn default_capacity() -> usize {
    common::QUEUE_CAPACITY
}

fn default_quantum_first() -> i32 {
    common::QUANTUM_FIRST_ROUND
}

fn default_quantum_later() -> i32 {
    common::QUANTUM_LATER_ROUNDS
}

fn default_colors() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            port: default_port(),
            capacity: default_capacity(),
            quantum_first: default_quantum_first(),
            quantum_later: default_quantum_later(),
            colors: default_colors(),
        }
    }
}

/// Loads a server configuration from the file at `path`.
///
/// A missing file is not an error; the defaults are returned. A file that
/// exists but does not parse logs a warning and also falls back to the
/// defaults, so a bad config never prevents the server from starting.
///
/// # Arguments
///
/// * `path`: Path to a TOML file with the server's configuration.
///
/// # Return
///
/// A `ServerConfig` with every field populated.
pub fn load(path: &str) -> ServerConfig {
    let mut contents = String::new();
    match File::open(path).and_then(|mut file| file.read_to_string(&mut contents)) {
        Ok(_) => parse(&contents),
        Err(_) => ServerConfig::default(),
    }
}

// Parses the contents of a configuration file, falling back to defaults on a
// malformed document.
fn parse(contents: &str) -> ServerConfig {
    match toml::from_str(contents) {
        Ok(config) => config,

        Err(ref err) => {
            warn!("Malformed configuration ({}); using defaults", err);
            ServerConfig::default()
        }
    }
}
