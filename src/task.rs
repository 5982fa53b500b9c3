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

use std::io::Write;
use std::net::TcpStream;
use std::sync::{Arc, Mutex};

use super::common;

/// What flavor of work a task represents. The scheduler treats the two very
/// differently: shell commands run atomically in a single slice, jobs are
/// time-sliced under the quantum.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TaskKind {
    /// An external shell command. Runs to completion in one scheduling cycle
    /// regardless of how long it actually takes.
    Shell,

    /// A simulated long-running job with an explicit burst, scheduled in
    /// quantum-sized slices.
    Program,
}

/// The lifecycle state of a task while it is owned by the queue.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TaskState {
    /// In the queue, eligible for selection.
    Waiting,

    /// Currently being executed by the scheduler thread. At most one task is
    /// in this state at any time.
    Running,

    /// Finished. A completed task is removed from the queue before the lock
    /// is released.
    Completed,
}

/// The write side of a client connection. The execution engine streams
/// command output through this trait; tests substitute an in-memory
/// implementation.
///
/// A sink can die at any moment (the client can disconnect mid-slice), so
/// delivery is best-effort by contract: a failed write is reported, never
/// retried, and must not disturb the scheduler.
pub trait Sink: Send + Sync {
    /// Delivers `buf` to the client.
    ///
    /// # Return
    ///
    /// True if the full buffer was written. False if the sink is closed or
    /// the write failed; the caller is expected to drop the data silently.
    fn deliver(&self, buf: &[u8]) -> bool;
}

/// A `Sink` backed by a connected TCP stream.
pub struct SocketSink {
    stream: Mutex<TcpStream>,
}

impl SocketSink {
    pub fn new(stream: TcpStream) -> SocketSink {
        SocketSink {
            stream: Mutex::new(stream),
        }
    }
}

impl Sink for SocketSink {
    fn deliver(&self, buf: &[u8]) -> bool {
        let mut stream = self.stream.lock().unwrap();
        stream.write_all(buf).is_ok()
    }
}

/// One submitted unit of work. The task queue exclusively owns every `Task`;
/// all mutable fields are protected by the queue's lock.
pub struct Task {
    /// Unique, monotonically increasing identifier. Assigned by the queue at
    /// submission; never reused.
    pub id: u64,

    /// Identifier of the client session that submitted this task.
    pub client_id: usize,

    /// Where this task's output goes. Shared with the session worker; may
    /// become invalid at any point if the client disconnects.
    pub sink: Arc<Sink>,

    /// The command line exactly as received from the client.
    pub command: String,

    pub kind: TaskKind,

    /// Total burst in seconds for a job; -1 for a shell command.
    pub total_burst: i32,

    /// Seconds of burst left. Starts at `total_burst` and is decremented by
    /// each executed slice; -1 for a shell command throughout.
    pub remaining: i32,

    pub state: TaskState,

    /// Scheduling round this task is in. Starts at 1 and increments every
    /// time the task returns to the queue after a slice; drives the quantum.
    pub round: u32,

    /// Set on the task chosen by the most recent selection, cleared on all
    /// others. The selection policy refuses to pick a flagged task while
    /// other candidates are waiting.
    pub just_executed: bool,

    /// True iff this task has been preempted before and is resuming.
    pub preempted: bool,

    /// Set by the purger on a task that was Running when its client
    /// disconnected. The post-slice update removes such a task instead of
    /// requeueing it.
    pub orphaned: bool,

    /// Monotonic timestamp taken at submission, under the queue lock. The
    /// FCFS tiebreaker.
    pub arrival_time: u64,

    /// Payload bytes successfully delivered to the sink so far. Prompt bytes
    /// are not counted.
    pub bytes_sent: usize,
}

impl Task {
    /// Creates a task for a received command line. The command is classified
    /// here (see `classify`); the id and arrival timestamp are assigned later
    /// by the queue, under its lock.
    pub fn new(client_id: usize, sink: Arc<Sink>, command: &str) -> Task {
        let (kind, burst) = classify(command);
        Task {
            id: 0,
            client_id: client_id,
            sink: sink,
            command: command.to_string(),
            kind: kind,
            total_burst: burst,
            remaining: burst,
            state: TaskState::Waiting,
            round: 1,
            just_executed: false,
            preempted: false,
            orphaned: false,
            arrival_time: 0,
            bytes_sent: 0,
        }
    }
}

/// The per-slice working copy handed to the execution engine. Carries
/// everything the engine needs so that it never touches the queue (or its
/// lock) while executing.
pub struct TaskRef {
    pub id: u64,
    pub client_id: usize,
    pub sink: Arc<Sink>,
    pub command: String,
    pub kind: TaskKind,
    pub total_burst: i32,
    pub remaining: i32,
    pub round: u32,
    pub preempted: bool,
}

impl TaskRef {
    pub fn from_task(task: &Task) -> TaskRef {
        TaskRef {
            id: task.id,
            client_id: task.client_id,
            sink: task.sink.clone(),
            command: task.command.clone(),
            kind: task.kind,
            total_burst: task.total_burst,
            remaining: task.remaining,
            round: task.round,
            preempted: task.preempted,
        }
    }
}

/// Classifies a command line.
///
/// A line whose first whitespace-separated token is `demo` or `./demo` is a
/// job; its second token is the burst in seconds. A missing, non-numeric, or
/// non-positive burst falls back to the default. Everything else is a shell
/// command with a burst of -1.
pub fn classify(command: &str) -> (TaskKind, i32) {
    let mut tokens = command.split_whitespace();
    match tokens.next() {
        Some("demo") | Some("./demo") => {
            let burst = tokens
                .next()
                .and_then(|token| token.parse::<i32>().ok())
                .unwrap_or(0);
            if burst > 0 {
                (TaskKind::Program, burst)
            } else {
                (TaskKind::Program, common::DEFAULT_BURST)
            }
        }

        _ => (TaskKind::Shell, -1),
    }
}


#[cfg(test)]
mod test {
    use super::testing::MemSink;
    use super::*;

    #[test]
    fn shell_commands_classify_as_shell() {
        assert_eq!(classify("ls -l"), (TaskKind::Shell, -1));
        assert_eq!(classify("echo demo"), (TaskKind::Shell, -1));
        // A prefix match is not enough; the first token must be exact.
        assert_eq!(classify("demolition 9"), (TaskKind::Shell, -1));
    }

    #[test]
    fn demo_commands_classify_as_programs() {
        assert_eq!(classify("demo 10"), (TaskKind::Program, 10));
        assert_eq!(classify("./demo 3"), (TaskKind::Program, 3));
    }

    #[test]
    fn unusable_bursts_fall_back_to_default() {
        assert_eq!(classify("demo"), (TaskKind::Program, 5));
        assert_eq!(classify("demo 0"), (TaskKind::Program, 5));
        assert_eq!(classify("demo -4"), (TaskKind::Program, 5));
        assert_eq!(classify("./demo soon"), (TaskKind::Program, 5));
    }

    #[test]
    fn new_task_starts_waiting_in_round_one() {
        let task = Task::new(7, MemSink::new(), "./demo 4");
        assert_eq!(task.client_id, 7);
        assert_eq!(task.kind, TaskKind::Program);
        assert_eq!(task.total_burst, 4);
        assert_eq!(task.remaining, 4);
        assert_eq!(task.state, TaskState::Waiting);
        assert_eq!(task.round, 1);
        assert!(!task.just_executed);
        assert!(!task.preempted);
        assert_eq!(task.bytes_sent, 0);
    }

    #[test]
    fn closed_mem_sink_rejects_delivery() {
        let sink = MemSink::new();
        assert!(sink.deliver(b"one"));
        sink.close();
        assert!(!sink.deliver(b"two"));
        assert_eq!(sink.contents(), "one");
    }
}
