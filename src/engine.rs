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

use std::thread;
use std::time::Duration;

use bytes::Bytes;

use super::common;
use super::common::COLOR_BLUE;
use super::executor;
use super::parser;
use super::task::{TaskKind, TaskRef};

/// The task execution engine: consumes one slice of a selected task,
/// produces output on the task's sink, and reports what it delivered.
///
/// The engine never touches the task queue or its lock. It tolerates a dead
/// sink at every write: failed deliveries are dropped silently and excluded
/// from the byte count, and cancellation of the task itself is the purger's
/// business, not the engine's.
pub struct Engine {
    colors: bool,
}

impl Engine {
    pub fn new(colors: bool) -> Engine {
        Engine { colors: colors }
    }

    /// Executes one slice of the given task.
    ///
    /// # Arguments
    ///
    /// * `task`:  Working copy of the selected task.
    /// * `slice`: Slice length in seconds for a job; ignored for a shell
    ///            command, which always runs to completion.
    ///
    /// # Return
    ///
    /// The number of payload bytes successfully delivered to the sink during
    /// this slice. Prompt bytes are never counted.
    pub fn execute(&self, task: &TaskRef, slice: i32) -> usize {
        match task.kind {
            TaskKind::Shell => self.run_shell(task),
            TaskKind::Program => self.run_program(task, slice),
        }
    }

    // The atomic shell path: parse, execute with a private capture sink,
    // deliver the captured bytes, and close with a prompt.
    fn run_shell(&self, task: &TaskRef) -> usize {
        let mut captured = if task.command.contains('|') {
            self.run_shell_pipeline(&task.command)
        } else {
            match parser::parse(&task.command) {
                Ok(cmd) => executor::run_command(&cmd),
                Err(err) => format!("{}Parsing error.\n", err.message()).into_bytes(),
            }
        };

        captured.truncate(common::MAX_OUTPUT_SIZE);
        let captured = Bytes::from(captured);

        let mut sent = 0;
        if task.sink.deliver(&captured) {
            sent = captured.len();
        }
        task.sink.deliver(common::PROMPT.as_bytes());

        info!("[{}]<<< {} bytes sent", task.client_id, sent);
        sent
    }

    fn run_shell_pipeline(&self, command: &str) -> Vec<u8> {
        let segments = match parser::split_pipeline(command) {
            Ok(segments) => segments,
            Err(err) => return err.message().as_bytes().to_vec(),
        };

        let mut cmds = Vec::with_capacity(segments.len());
        for segment in &segments {
            match parser::parse(segment) {
                Ok(cmd) => cmds.push(cmd),
                Err(err) => {
                    return format!("{}Parsing error in pipeline command.\n", err.message())
                        .into_bytes()
                }
            }
        }

        executor::run_pipeline(&cmds)
    }

    // The sliced job path: stream one progress line per second of the slice.
    // The lines across a job's slices form the contiguous sequence
    // `Demo 1/N` through `Demo N/N`, each emitted exactly once.
    fn run_program(&self, task: &TaskRef, slice: i32) -> usize {
        if task.preempted {
            info!(
                "{}",
                common::paint(
                    COLOR_BLUE,
                    format!("[{}]--- running ({})", task.client_id, task.remaining),
                    self.colors
                )
            );
        }

        let mut sent = 0;
        for i in 0..slice {
            let step = task.total_burst - task.remaining + i + 1;
            let line = Bytes::from(format!("Demo {}/{}\n", step, task.total_burst));
            if task.sink.deliver(&line) {
                sent += line.len();
            }
            thread::sleep(Duration::from_secs(1));
        }

        // This slice drained the burst; the job is done once the queue
        // applies the update, so the prompt goes out now.
        if slice == task.remaining {
            task.sink.deliver(common::PROMPT.as_bytes());
        }

        sent
    }
}
