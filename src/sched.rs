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

use std::cmp;
use std::mem;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use time;

use super::common;
use super::common::{COLOR_BLUE, COLOR_GREEN, COLOR_RED, COLOR_YELLOW};
use super::config::ServerConfig;
use super::engine::Engine;
use super::task::{Task, TaskKind, TaskRef, TaskState};
use super::timer::SliceTimer;

/// What happened to a job when its slice was handed back to the queue.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SliceOutcome {
    /// The job still has burst left and went back to Waiting.
    Requeued,

    /// The job's burst reached zero; it was completed and removed.
    Completed,

    /// The job's client disconnected while it ran; it was removed without
    /// completing.
    Removed,
}

// The queue proper plus everything else the one lock protects.
struct Inner {
    // All live tasks in submission order. The vector order is the FCFS
    // order; selection scans it rather than reordering it.
    tasks: Vec<Task>,

    // Source of task identifiers. Incremented under the lock, never reused.
    next_id: u64,

    // Cleared by stop(). await_next() returns None once this is false.
    running: bool,
}

/// The central task queue: a bounded container with blocking semantics on
/// emptiness, owning every submitted task. Exactly one mutex protects the
/// container and all task mutable fields; one condition variable ("non
/// empty") is signalled on submit and on stop.
///
/// Session workers submit and purge; the scheduler thread selects, executes
/// (with the lock released), and hands slices back.
pub struct TaskQueue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    capacity: usize,
    quantum_first: i32,
    quantum_later: i32,
    colors: bool,
}

impl TaskQueue {
    pub fn new(config: &ServerConfig) -> TaskQueue {
        TaskQueue {
            inner: Mutex::new(Inner {
                tasks: Vec::with_capacity(config.capacity),
                next_id: 0,
                running: true,
            }),
            not_empty: Condvar::new(),
            capacity: config.capacity,
            quantum_first: config.quantum_first,
            quantum_later: config.quantum_later,
            colors: config.colors,
        }
    }

    /// Whether log markers produced on behalf of this queue carry ANSI
    /// colors.
    pub fn colors(&self) -> bool {
        self.colors
    }

    /// Appends a task to the queue and wakes the scheduler.
    ///
    /// The task's identifier and arrival timestamp are assigned here, under
    /// the lock, so identifiers and arrival order agree process-wide.
    ///
    /// # Return
    ///
    /// True if the task was accepted. False if the queue was at capacity, in
    /// which case the task is dropped (the submitting client is not told).
    pub fn submit(&self, mut task: Task) -> bool {
        let mut inner = self.inner.lock().unwrap();

        if inner.tasks.len() >= self.capacity {
            warn!("task queue is full");
            return false;
        }

        inner.next_id += 1;
        task.id = inner.next_id;
        task.arrival_time = time::precise_time_ns();
        inner.tasks.push(task);

        self.not_empty.notify_one();
        true
    }

    /// Blocks until a task is eligible to run, then selects one under the
    /// policy, marks it Running, and returns a working copy for the engine.
    ///
    /// # Return
    ///
    /// None once `stop` has been called; the scheduler loop exits on that.
    pub fn await_next(&self) -> Option<TaskRef> {
        let mut inner = self.inner.lock().unwrap();

        let chosen = loop {
            if !inner.running {
                return None;
            }
            if let Some(index) = select(&inner.tasks) {
                break index;
            }
            inner = self.not_empty.wait(inner).unwrap();
        };

        // The anti-starvation flag tracks only the most recent selection.
        for task in inner.tasks.iter_mut() {
            task.just_executed = false;
        }

        let task = &mut inner.tasks[chosen];
        task.just_executed = true;
        task.state = TaskState::Running;
        Some(TaskRef::from_task(task))
    }

    /// The quantum granted to a job in the given round.
    pub fn quantum(&self, round: u32) -> i32 {
        if round <= 1 {
            self.quantum_first
        } else {
            self.quantum_later
        }
    }

    /// Hands a job's slice back to the queue and applies the post-slice
    /// rules: burst accounting, requeue-or-complete, and orphan removal.
    ///
    /// # Arguments
    ///
    /// * `id`:       Identifier of the job that just ran.
    /// * `executed`: Seconds of the slice that elapsed.
    /// * `bytes`:    Payload bytes the engine delivered during the slice.
    pub fn return_task(&self, id: u64, executed: i32, bytes: usize) -> SliceOutcome {
        let mut inner = self.inner.lock().unwrap();

        let index = match inner.tasks.iter().position(|t| t.id == id) {
            Some(index) => index,
            None => return SliceOutcome::Removed,
        };

        {
            let task = &mut inner.tasks[index];
            task.bytes_sent += bytes;

            if !task.orphaned {
                task.remaining -= executed;

                if task.remaining > 0 {
                    task.state = TaskState::Waiting;
                    task.round += 1;
                    task.preempted = true;
                    info!(
                        "{}",
                        common::paint(
                            COLOR_YELLOW,
                            format!("[{}]--- waiting ({})", task.client_id, task.remaining),
                            self.colors
                        )
                    );
                    return SliceOutcome::Requeued;
                }

                task.state = TaskState::Completed;
            }
        }

        let task = inner.tasks.remove(index);
        if task.orphaned {
            info!(
                "{}",
                common::paint(
                    COLOR_RED,
                    format!("[{}]--- removed ({})", task.client_id, task.remaining),
                    self.colors
                )
            );
            SliceOutcome::Removed
        } else {
            info!(
                "{}",
                common::paint(
                    COLOR_RED,
                    format!("[{}]--- ended ({})", task.client_id, task.remaining),
                    self.colors
                )
            );
            SliceOutcome::Completed
        }
    }

    /// Removes a shell command after its single atomic slice.
    ///
    /// # Return
    ///
    /// `Completed` normally; `Removed` if the client disconnected while the
    /// command ran and the purger flagged the task as orphaned.
    pub fn complete_and_remove(&self, id: u64, bytes: usize) -> SliceOutcome {
        let mut inner = self.inner.lock().unwrap();

        let index = match inner.tasks.iter().position(|t| t.id == id) {
            Some(index) => index,
            None => return SliceOutcome::Removed,
        };

        let mut task = inner.tasks.remove(index);
        task.bytes_sent += bytes;

        if task.orphaned {
            info!(
                "{}",
                common::paint(
                    COLOR_RED,
                    format!("[{}]--- removed ({})", task.client_id, task.remaining),
                    self.colors
                )
            );
            SliceOutcome::Removed
        } else {
            task.state = TaskState::Completed;
            info!(
                "{}",
                common::paint(
                    COLOR_RED,
                    format!("[{}]--- ended ({})", task.client_id, task.remaining),
                    self.colors
                )
            );
            SliceOutcome::Completed
        }
    }

    /// Removes every Waiting task belonging to a client and marks a Running
    /// one, if any, as orphaned so the post-slice update drops it.
    ///
    /// Safe to call more than once for the same client; the second call
    /// finds nothing to do.
    pub fn purge_client(&self, client_id: usize) {
        let mut inner = self.inner.lock().unwrap();

        let tasks = mem::replace(&mut inner.tasks, Vec::new());
        let mut kept = Vec::with_capacity(tasks.len());

        for mut task in tasks {
            if task.client_id != client_id {
                kept.push(task);
            } else if task.state == TaskState::Running {
                task.orphaned = true;
                kept.push(task);
            } else {
                info!(
                    "{}",
                    common::paint(
                        COLOR_RED,
                        format!("[{}]--- removed ({})", task.client_id, task.remaining),
                        self.colors
                    )
                );
            }
        }

        inner.tasks = kept;
    }

    /// A read-only view of the queue for the summary line: (client id,
    /// remaining) per task, in queue order.
    pub fn snapshot(&self) -> Vec<(usize, i32)> {
        let inner = self.inner.lock().unwrap();
        inner
            .tasks
            .iter()
            .map(|t| (t.client_id, t.remaining))
            .collect()
    }

    /// The queue summary in its wire shape: `[[cid]-[rem]-[cid]-[rem]]`, or
    /// `[]` when the queue is empty.
    pub fn summary_string(&self) -> String {
        let snapshot = self.snapshot();

        let mut summary = String::from("[");
        for (i, &(client_id, remaining)) in snapshot.iter().enumerate() {
            if i > 0 {
                summary.push('-');
            }
            summary.push_str(&format!("[{}]-[{}]", client_id, remaining));
        }
        summary.push(']');
        summary
    }

    /// Logs the blue queue summary. Called after every completion.
    pub fn log_summary(&self) {
        info!(
            "{}",
            common::paint(COLOR_BLUE, self.summary_string(), self.colors)
        );
    }

    /// Number of tasks currently owned by the queue.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().tasks.len()
    }

    /// Shuts the queue down: clears the running flag and wakes the scheduler
    /// so it can observe it. Pending tasks are dropped with the queue.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.running = false;
        self.not_empty.notify_all();
    }

    #[cfg(test)]
    fn states(&self) -> Vec<TaskState> {
        let inner = self.inner.lock().unwrap();
        inner.tasks.iter().map(|t| t.state).collect()
    }
}

// The selection policy, applied to the waiting set under the queue lock.
//
// Shell commands win outright, earliest submitted first. Otherwise jobs are
// picked shortest-remaining-first, skipping the task that ran last whenever
// at least one other candidate is waiting; equal remainders fall back to
// arrival order.
fn select(tasks: &[Task]) -> Option<usize> {
    // Priority override: the earliest waiting shell command, if any. The
    // vector is in submission order, so the first hit is the earliest.
    for (index, task) in tasks.iter().enumerate() {
        if task.state == TaskState::Waiting && task.kind == TaskKind::Shell {
            return Some(index);
        }
    }

    let waiting = tasks
        .iter()
        .filter(|t| t.state == TaskState::Waiting)
        .count();

    let mut best: Option<usize> = None;
    for (index, task) in tasks.iter().enumerate() {
        if task.state != TaskState::Waiting || task.kind != TaskKind::Program {
            continue;
        }
        if waiting > 1 && task.just_executed {
            continue;
        }

        best = match best {
            None => Some(index),
            Some(current) => {
                let incumbent = &tasks[current];
                if task.remaining < incumbent.remaining
                    || (task.remaining == incumbent.remaining
                        && task.arrival_time < incumbent.arrival_time)
                {
                    Some(index)
                } else {
                    Some(current)
                }
            }
        };
    }

    best
}

/// Handle on the scheduler thread. Owns the thread; `stop` shuts the loop
/// down and joins it.
pub struct Scheduler {
    queue: Arc<TaskQueue>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Scheduler {
    /// Spawns the scheduler loop against the given queue.
    pub fn start(queue: Arc<TaskQueue>, engine: Engine) -> Scheduler {
        let loop_queue = queue.clone();
        let thread = thread::Builder::new()
            .name("scheduler".to_string())
            .spawn(move || scheduler_loop(loop_queue, engine))
            .expect("ERROR: Failed to spawn scheduler thread.");

        Scheduler {
            queue: queue,
            thread: Some(thread),
        }
    }

    pub fn queue(&self) -> Arc<TaskQueue> {
        self.queue.clone()
    }

    /// Stops the loop and joins the thread. A slice in flight is allowed to
    /// finish; nothing new is selected afterwards.
    pub fn stop(mut self) {
        self.queue.stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// The single thread that binds queue, policy, and engine together. Total: no
// error escapes it, so a misbehaving command can never take the scheduler
// down.
fn scheduler_loop(queue: Arc<TaskQueue>, engine: Engine) {
    info!("Scheduler thread started");

    let mut timer = SliceTimer::new(16);

    while let Some(task) = queue.await_next() {
        let slice = match task.kind {
            TaskKind::Shell => -1,
            TaskKind::Program => cmp::min(task.remaining, queue.quantum(task.round)),
        };

        info!(
            "{}",
            common::paint(
                COLOR_GREEN,
                format!("[{}]--- started ({})", task.client_id, task.remaining),
                queue.colors()
            )
        );

        timer.start();
        let bytes = engine.execute(&task, slice);
        timer.stop();

        match task.kind {
            TaskKind::Shell => {
                queue.complete_and_remove(task.id, bytes);
                queue.log_summary();
            }

            TaskKind::Program => match queue.return_task(task.id, slice, bytes) {
                SliceOutcome::Requeued => {}
                SliceOutcome::Completed | SliceOutcome::Removed => queue.log_summary(),
            },
        }
    }

    info!("Scheduler thread stopped");
}

#[cfg(test)]
mod test {
    use super::super::config::ServerConfig;
    use super::super::task::testing::MemSink;
    use super::super::task::{Task, TaskKind, TaskState};
    use super::*;

    fn queue() -> TaskQueue {
        let mut config = ServerConfig::default();
        config.colors = false;
        TaskQueue::new(&config)
    }

    fn submit(queue: &TaskQueue, client_id: usize, command: &str) {
        assert!(queue.submit(Task::new(client_id, MemSink::new(), command)));
    }

    #[test]
    fn shell_commands_preempt_jobs() {
        let queue = queue();
        submit(&queue, 1, "./demo 3");
        submit(&queue, 1, "ls");
        submit(&queue, 2, "./demo 1");

        let task = queue.await_next().unwrap();
        assert_eq!(task.kind, TaskKind::Shell);
        assert_eq!(task.command, "ls");
    }

    #[test]
    fn earliest_shell_command_wins() {
        let queue = queue();
        submit(&queue, 1, "pwd");
        submit(&queue, 2, "ls");

        let task = queue.await_next().unwrap();
        assert_eq!(task.command, "pwd");
    }

    #[test]
    fn srtf_picks_the_shortest_job() {
        let queue = queue();
        submit(&queue, 1, "./demo 10");
        submit(&queue, 2, "./demo 5");
        submit(&queue, 3, "./demo 7");

        let task = queue.await_next().unwrap();
        assert_eq!(task.client_id, 2);
        assert_eq!(task.remaining, 5);
    }

    #[test]
    fn equal_remainders_fall_back_to_arrival_order() {
        let queue = queue();
        submit(&queue, 1, "./demo 5");
        submit(&queue, 2, "./demo 5");

        let task = queue.await_next().unwrap();
        assert_eq!(task.client_id, 1);
    }

    #[test]
    fn just_executed_job_is_skipped_when_peers_wait() {
        let queue = queue();
        submit(&queue, 1, "./demo 4");
        submit(&queue, 2, "./demo 9");

        let first = queue.await_next().unwrap();
        assert_eq!(first.client_id, 1);
        assert_eq!(queue.return_task(first.id, 3, 0), SliceOutcome::Requeued);

        // Client 1's job has the shorter remainder (1 < 9) but ran last.
        let second = queue.await_next().unwrap();
        assert_eq!(second.client_id, 2);
    }

    #[test]
    fn sole_job_runs_even_after_just_running() {
        let queue = queue();
        submit(&queue, 1, "./demo 8");

        let first = queue.await_next().unwrap();
        assert_eq!(queue.return_task(first.id, 3, 0), SliceOutcome::Requeued);

        let second = queue.await_next().unwrap();
        assert_eq!(second.client_id, 1);
        assert_eq!(second.remaining, 5);
        assert_eq!(second.round, 2);
        assert!(second.preempted);
    }

    // The slice schedule for a 10s and a 5s job submitted back to back: the
    // 5s job goes first (SRTF), the two then alternate under the
    // anti-starvation rule until the short one drains, and the long one
    // finishes under the grown quantum.
    #[test]
    fn short_and_long_jobs_interleave() {
        let queue = queue();
        submit(&queue, 1, "./demo 10");
        submit(&queue, 1, "./demo 5");

        let a = queue.await_next().unwrap();
        assert_eq!(a.command, "./demo 5");
        let slice = ::std::cmp::min(a.remaining, queue.quantum(a.round));
        assert_eq!(slice, 3);
        assert_eq!(queue.return_task(a.id, slice, 0), SliceOutcome::Requeued);

        let b = queue.await_next().unwrap();
        assert_eq!(b.command, "./demo 10");
        assert_eq!(queue.return_task(b.id, 3, 0), SliceOutcome::Requeued);

        let c = queue.await_next().unwrap();
        assert_eq!(c.command, "./demo 5");
        assert_eq!(c.remaining, 2);
        let slice = ::std::cmp::min(c.remaining, queue.quantum(c.round));
        assert_eq!(slice, 2);
        assert_eq!(queue.return_task(c.id, slice, 0), SliceOutcome::Completed);

        let d = queue.await_next().unwrap();
        assert_eq!(d.command, "./demo 10");
        assert_eq!(d.remaining, 7);
        assert_eq!(d.round, 2);
        let slice = ::std::cmp::min(d.remaining, queue.quantum(d.round));
        assert_eq!(slice, 7);
        assert_eq!(queue.return_task(d.id, slice, 0), SliceOutcome::Completed);

        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn rounds_progress_contiguously() {
        let queue = queue();
        submit(&queue, 1, "./demo 12");

        let mut rounds = Vec::new();
        loop {
            let task = queue.await_next().unwrap();
            rounds.push(task.round);
            let slice = ::std::cmp::min(task.remaining, queue.quantum(task.round));
            if queue.return_task(task.id, slice, 0) != SliceOutcome::Requeued {
                break;
            }
        }

        // 12 seconds of burst: 3 in round one, 7 in round two, 2 in round
        // three.
        assert_eq!(rounds, vec![1, 2, 3]);
    }

    #[test]
    fn at_most_one_task_runs() {
        let queue = queue();
        submit(&queue, 1, "./demo 5");
        submit(&queue, 2, "./demo 6");

        let task = queue.await_next().unwrap();
        let running = queue
            .states()
            .into_iter()
            .filter(|s| *s == TaskState::Running)
            .count();
        assert_eq!(running, 1);
        queue.return_task(task.id, 3, 0);
    }

    #[test]
    fn full_queue_drops_submissions() {
        let mut config = ServerConfig::default();
        config.capacity = 2;
        config.colors = false;
        let queue = TaskQueue::new(&config);

        assert!(queue.submit(Task::new(1, MemSink::new(), "echo a")));
        assert!(queue.submit(Task::new(1, MemSink::new(), "echo b")));
        assert!(!queue.submit(Task::new(1, MemSink::new(), "echo c")));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn purge_removes_waiting_tasks() {
        let queue = queue();
        submit(&queue, 1, "./demo 5");
        submit(&queue, 2, "./demo 6");
        submit(&queue, 1, "ls");

        queue.purge_client(1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.snapshot(), vec![(2, 6)]);

        // Idempotent: purging again finds nothing.
        queue.purge_client(1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn purge_orphans_the_running_task() {
        let queue = queue();
        submit(&queue, 1, "./demo 9");

        let task = queue.await_next().unwrap();
        queue.purge_client(1);
        // Still present: a running slice cannot be cancelled mid-flight.
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.return_task(task.id, 3, 0), SliceOutcome::Removed);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn purge_orphans_a_running_shell_command() {
        let queue = queue();
        submit(&queue, 1, "ls");

        let task = queue.await_next().unwrap();
        queue.purge_client(1);
        // The atomic slice is allowed to finish.
        assert_eq!(queue.len(), 1);

        assert_eq!(
            queue.complete_and_remove(task.id, 0),
            SliceOutcome::Removed
        );
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn finished_shell_commands_complete_normally() {
        let queue = queue();
        submit(&queue, 1, "ls");

        let task = queue.await_next().unwrap();
        assert_eq!(
            queue.complete_and_remove(task.id, 4),
            SliceOutcome::Completed
        );
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn task_ids_are_never_reused() {
        let queue = queue();
        submit(&queue, 1, "echo a");
        let first = queue.await_next().unwrap();
        queue.complete_and_remove(first.id, 0);

        submit(&queue, 1, "echo b");
        let second = queue.await_next().unwrap();
        assert!(second.id > first.id);
        queue.complete_and_remove(second.id, 0);
    }

    #[test]
    fn summary_renders_queue_order() {
        let queue = queue();
        submit(&queue, 1, "./demo 10");
        submit(&queue, 2, "./demo 5");

        assert_eq!(queue.summary_string(), "[[1]-[10]-[2]-[5]]");
    }

    #[test]
    fn summary_renders_empty_queue() {
        let queue = queue();
        assert_eq!(queue.summary_string(), "[]");
    }

    #[test]
    fn stopped_queue_yields_none() {
        let queue = queue();
        queue.stop();
        assert!(queue.await_next().is_none());
    }

    #[test]
    fn quantum_grows_after_the_first_round() {
        let queue = queue();
        assert_eq!(queue.quantum(1), 3);
        assert_eq!(queue.quantum(2), 7);
        assert_eq!(queue.quantum(9), 7);
    }
}
