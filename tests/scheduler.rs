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

// End-to-end scheduling scenarios: a real scheduler thread and execution
// engine, with an in-memory sink standing in for the client connection.

extern crate rush;

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rush::config::ServerConfig;
use rush::engine::Engine;
use rush::sched::{Scheduler, TaskQueue};
use rush::task::{Sink, Task};

struct MemSink {
    data: Mutex<Vec<u8>>,
}

impl MemSink {
    fn new() -> Arc<MemSink> {
        Arc::new(MemSink {
            data: Mutex::new(Vec::new()),
        })
    }

    fn contents(&self) -> String {
        let data = self.data.lock().unwrap();
        String::from_utf8_lossy(&data).into_owned()
    }
}

impl Sink for MemSink {
    fn deliver(&self, buf: &[u8]) -> bool {
        self.data.lock().unwrap().extend_from_slice(buf);
        true
    }
}

fn quiet_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.colors = false;
    config
}

// Polls until the sink holds exactly `expected`, failing loudly on timeout.
fn wait_for(sink: &MemSink, expected: &str, timeout: Duration) {
    let start = Instant::now();
    while sink.contents() != expected {
        if start.elapsed() > timeout {
            assert_eq!(sink.contents(), expected);
        }
        thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn shell_command_output_reaches_the_sink() {
    let queue = Arc::new(TaskQueue::new(&quiet_config()));
    let scheduler = Scheduler::start(queue.clone(), Engine::new(false));

    let sink = MemSink::new();
    assert!(queue.submit(Task::new(1, sink.clone(), "echo hello")));

    wait_for(&sink, "hello\n$ ", Duration::from_secs(10));
    scheduler.stop();
}

#[test]
fn unknown_command_errors_reach_the_sink() {
    let queue = Arc::new(TaskQueue::new(&quiet_config()));
    let scheduler = Scheduler::start(queue.clone(), Engine::new(false));

    let sink = MemSink::new();
    assert!(queue.submit(Task::new(1, sink.clone(), "badcmd")));

    wait_for(
        &sink,
        "Command not found: \"badcmd\"\n$ ",
        Duration::from_secs(10),
    );
    scheduler.stop();
}

// Two jobs submitted back to back: the shorter one must run (and finish)
// first even though it arrived second. One shared sink makes the order
// visible in the byte stream.
#[test]
fn shorter_job_finishes_first() {
    let queue = Arc::new(TaskQueue::new(&quiet_config()));

    let sink = MemSink::new();
    assert!(queue.submit(Task::new(1, sink.clone(), "./demo 3")));
    assert!(queue.submit(Task::new(1, sink.clone(), "./demo 1")));

    // Started only now, so the first selection sees both candidates.
    let scheduler = Scheduler::start(queue.clone(), Engine::new(false));

    wait_for(
        &sink,
        "Demo 1/1\n$ Demo 1/3\nDemo 2/3\nDemo 3/3\n$ ",
        Duration::from_secs(20),
    );
    scheduler.stop();
}

// A shell command arriving mid-slice does not interrupt the slice, but wins
// the very next selection; the job then resumes under the grown quantum.
#[test]
fn shell_command_preempts_at_the_slice_boundary() {
    let queue = Arc::new(TaskQueue::new(&quiet_config()));
    let scheduler = Scheduler::start(queue.clone(), Engine::new(false));

    let sink = MemSink::new();
    assert!(queue.submit(Task::new(1, sink.clone(), "./demo 4")));

    // Land inside the job's first 3-second slice.
    thread::sleep(Duration::from_millis(500));
    assert!(queue.submit(Task::new(1, sink.clone(), "echo hi")));

    wait_for(
        &sink,
        "Demo 1/4\nDemo 2/4\nDemo 3/4\nhi\n$ Demo 4/4\n$ ",
        Duration::from_secs(20),
    );
    scheduler.stop();
}

// A client that disconnects right after submitting: the purge runs before
// the scheduler wakes only if the task is still waiting, so pin it behind a
// running job to make the timing deterministic.
#[test]
fn purged_tasks_never_run() {
    let queue = Arc::new(TaskQueue::new(&quiet_config()));
    let scheduler = Scheduler::start(queue.clone(), Engine::new(false));

    let busy = MemSink::new();
    assert!(queue.submit(Task::new(1, busy.clone(), "./demo 3")));

    // While client 1's job holds the scheduler, client 2 submits and leaves.
    thread::sleep(Duration::from_millis(500));
    let doomed = MemSink::new();
    assert!(queue.submit(Task::new(2, doomed.clone(), "./demo 2")));
    queue.purge_client(2);

    wait_for(
        &busy,
        "Demo 1/3\nDemo 2/3\nDemo 3/3\n$ ",
        Duration::from_secs(20),
    );
    // Nothing was ever written on behalf of the purged client.
    assert_eq!(doomed.contents(), "");
    scheduler.stop();
}
