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

extern crate ctrlc;
extern crate env_logger;
#[macro_use]
extern crate log;
extern crate rush;

use std::env;
use std::process;
use std::sync::{Arc, Mutex};

use rush::config;
use rush::engine::Engine;
use rush::sched::{Scheduler, TaskQueue};
use rush::server::Server;

// The scheduler's markers are the server's primary output, so they are
// visible by default; RUST_LOG still overrides.
fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn main() {
    init_logging();

    let mut config = config::load("server.toml");

    // An optional port argument overrides the configuration file.
    let args: Vec<String> = env::args().collect();
    if args.len() > 1 {
        match args[1].parse::<u16>() {
            Ok(port) if port > 0 => config.port = port,
            _ => warn!(
                "Invalid port number. Using default port {}.",
                config.port
            ),
        }
    }

    let queue = Arc::new(TaskQueue::new(&config));
    let scheduler = Scheduler::start(queue.clone(), Engine::new(config.colors));

    // SIGINT and SIGTERM stop the scheduler first, letting an in-flight
    // slice finish and the thread join, then exit.
    let shutdown = Arc::new(Mutex::new(Some(scheduler)));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("Received termination signal, shutting down");
            if let Some(scheduler) = shutdown.lock().unwrap().take() {
                scheduler.stop();
            }
            process::exit(0);
        })
        .expect("ERROR: Failed to install signal handler.");
    }

    if let Err(ref err) = Server::new(config).run(queue) {
        error!("Server failed to start: {}", err);
        process::exit(1);
    }
}
