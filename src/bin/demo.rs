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

extern crate rush;

use std::env;
use std::io;
use std::io::Write;
use std::thread;
use std::time::Duration;

use rush::common;

// The workload the server's job tasks simulate: print one progress line per
// second for the requested number of seconds.
fn main() {
    let seconds = env::args()
        .nth(1)
        .and_then(|arg| arg.parse::<i32>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(common::DEFAULT_BURST);

    let stdout = io::stdout();
    for i in 1..seconds + 1 {
        {
            let mut out = stdout.lock();
            let _ = writeln!(out, "Demo {}/{}", i, seconds);
            let _ = out.flush();
        }
        thread::sleep(Duration::from_secs(1));
    }
}
