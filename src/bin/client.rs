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
use std::io::{self, BufRead, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::process;
use std::thread;

use rush::common;

// Interactive client. Connects, forwards stdin lines to the server, and
// mirrors everything the server streams back. Output arrives whenever the
// scheduler runs our tasks, not in lockstep with our input, so a dedicated
// thread drains the socket.
fn main() {
    let args: Vec<String> = env::args().collect();
    let ip = args.get(1).cloned().unwrap_or_else(|| "127.0.0.1".to_string());
    let port = args
        .get(2)
        .and_then(|arg| arg.parse::<u16>().ok())
        .unwrap_or(common::DEFAULT_PORT);

    let mut stream = match TcpStream::connect((ip.as_str(), port)) {
        Ok(stream) => stream,
        Err(ref err) => {
            eprintln!("Failed to connect to {}:{}: {}", ip, port, err);
            process::exit(1);
        }
    };
    println!("Connected to server at {}:{}", ip, port);

    let read_half = match stream.try_clone() {
        Ok(read_half) => read_half,
        Err(ref err) => {
            eprintln!("Failed to clone connection: {}", err);
            process::exit(1);
        }
    };
    let reader = thread::spawn(move || mirror_server_output(read_half));

    let stdin = io::stdin();
    let mut sent_exit = false;
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if stream.write_all(line.as_bytes()).is_err() {
            break;
        }
        if line == "exit" {
            sent_exit = true;
            break;
        }
    }

    // Make sure the server tears the session down even on a bare EOF.
    if !sent_exit {
        let _ = stream.write_all(b"exit");
    }
    let _ = stream.shutdown(Shutdown::Write);
    let _ = reader.join();
}

fn mirror_server_output(mut stream: TcpStream) {
    let mut buf = [0u8; common::MAX_OUTPUT_SIZE];
    let stdout = io::stdout();

    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut out = stdout.lock();
                let _ = out.write_all(&buf[..n]);
                let _ = out.flush();
            }
        }
    }
}
