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

use std::io;
use std::io::Read;
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use super::common;
use super::common::COLOR_BLUE;
use super::config::ServerConfig;
use super::sched::TaskQueue;
use super::task::{Sink, SocketSink, Task};

// Source of client session identifiers. A true process-wide counter, so it
// lives outside the scheduler object.
static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(0);

/// The network front of the system: owns the listening socket and one worker
/// thread per connected client. The scheduler (and its queue) are owned by
/// the caller, so the binary can shut them down on a termination signal.
pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn new(config: ServerConfig) -> Server {
        Server { config: config }
    }

    /// Binds the listening socket and serves clients, feeding the given
    /// queue, until the process is killed.
    ///
    /// # Return
    ///
    /// Only returns on a bind failure; the accept loop itself never ends.
    pub fn run(&self, queue: Arc<TaskQueue>) -> io::Result<()> {
        let listener = TcpListener::bind((Ipv4Addr::new(0, 0, 0, 0), self.config.port))?;
        info!("| Hello, Server Started |");

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed) + 1;
                    info!("[{}]<<< client connected", client_id);

                    let queue = queue.clone();
                    let colors = self.config.colors;
                    let _ = thread::Builder::new()
                        .name(format!("client-{}", client_id))
                        .spawn(move || serve_client(stream, client_id, queue, colors));
                }

                Err(ref err) => {
                    error!("Failed to accept connection: {}", err);
                }
            }
        }

        Ok(())
    }
}

// The per-client session worker. Reads command lines off the connection,
// classifies and submits them, and never waits for their output; the
// scheduler streams results back through the task's sink as they run.
fn serve_client(mut stream: TcpStream, client_id: usize, queue: Arc<TaskQueue>, colors: bool) {
    let sink: Arc<Sink> = match stream.try_clone() {
        Ok(write_half) => Arc::new(SocketSink::new(write_half)),
        Err(ref err) => {
            error!("[{}] Failed to clone client stream: {}", client_id, err);
            return;
        }
    };

    sink.deliver(common::PROMPT.as_bytes());

    let mut buf = [0u8; common::MAX_INPUT_SIZE];
    loop {
        let received = match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };

        let text = String::from_utf8_lossy(&buf[..received]);
        let line = text.trim();

        if line == "exit" {
            info!("[{}]>>> exit", client_id);
            sink.deliver(b"Disconnected from server.\n");
            break;
        }

        if line.is_empty() {
            sink.deliver(common::PROMPT.as_bytes());
            continue;
        }

        info!("[{}]>>> {}", client_id, line);

        let task = Task::new(client_id, sink.clone(), line);
        info!(
            "{}",
            common::paint(
                COLOR_BLUE,
                format!("[{}]--- created ({})", client_id, task.total_burst),
                colors
            )
        );
        queue.submit(task);
    }

    info!("[{}]>>> disconnected", client_id);
    queue.purge_client(client_id);
}
