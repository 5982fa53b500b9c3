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

use std::env;
use std::fs::File;
use std::io;
use std::io::Read;
use std::process;
use std::thread;

use super::parser::Command;

/// Runs a single parsed command to completion and returns its captured
/// output.
///
/// The child runs with its stdout and stderr connected to private capture
/// pipes (unless redirected to files), so nothing a command prints can leak
/// into the server's own output. The built-in `cd` is handled directly in
/// this process, since a child's working directory change would be lost.
///
/// # Arguments
///
/// * `cmd`: The command to execute.
///
/// # Return
///
/// Everything the command wrote to its captured stdout followed by its
/// captured stderr. Failures to launch the command are reported the same
/// way, as message bytes.
pub fn run_command(cmd: &Command) -> Vec<u8> {
    if cmd.args[0] == "cd" {
        return change_directory(cmd);
    }

    let mut builder = process::Command::new(&cmd.args[0]);
    builder.args(&cmd.args[1..]);

    match cmd.input_file {
        Some(ref path) => match File::open(path) {
            Ok(file) => {
                builder.stdin(process::Stdio::from(file));
            }
            Err(ref err) => return format!("open input file: {}\n", err).into_bytes(),
        },
        // No controlling terminal here; a command that reads stdin gets EOF.
        None => {
            builder.stdin(process::Stdio::null());
        }
    }

    match cmd.output_file {
        Some(ref path) => match File::create(path) {
            Ok(file) => {
                builder.stdout(process::Stdio::from(file));
            }
            Err(ref err) => return format!("open output file: {}\n", err).into_bytes(),
        },
        None => {
            builder.stdout(process::Stdio::piped());
        }
    }

    match cmd.error_file {
        Some(ref path) => match File::create(path) {
            Ok(file) => {
                builder.stderr(process::Stdio::from(file));
            }
            Err(ref err) => return format!("open error file: {}\n", err).into_bytes(),
        },
        None => {
            builder.stderr(process::Stdio::piped());
        }
    }

    let mut child = match builder.spawn() {
        Ok(child) => child,
        Err(ref err) => return spawn_failure(&cmd.args[0], err),
    };

    // Drain stderr on a helper thread while this one drains stdout, so a
    // child filling both pipes cannot wedge the capture.
    let stderr_thread = drain_stderr(&mut child);

    let mut captured = Vec::new();
    if let Some(ref mut stdout) = child.stdout {
        let _ = stdout.read_to_end(&mut captured);
    }

    if let Some(thread) = stderr_thread {
        if let Ok(bytes) = thread.join() {
            captured.extend_from_slice(&bytes);
        }
    }

    let _ = child.wait();
    captured
}

/// Runs a pipeline of parsed commands, wiring each segment's stdout to the
/// next segment's stdin, and returns the captured output.
///
/// Per-segment redirections behave as in a shell: an explicit `<` beats the
/// upstream pipe, an explicit `>` diverts that segment's output to a file. A
/// segment that fails to launch is reported in the captured output and the
/// rest of the pipeline keeps running (downstream segments see end-of-input).
///
/// # Arguments
///
/// * `cmds`: The pipeline segments, in order. Must not be empty.
///
/// # Return
///
/// The final segment's captured stdout, followed by the captured stderr of
/// every segment, followed by any launch diagnostics.
pub fn run_pipeline(cmds: &[Command]) -> Vec<u8> {
    let mut children: Vec<process::Child> = Vec::with_capacity(cmds.len());
    let mut diagnostics: Vec<u8> = Vec::new();
    let mut upstream: Option<process::ChildStdout> = None;
    let last = cmds.len() - 1;

    for (i, cmd) in cmds.iter().enumerate() {
        let mut builder = process::Command::new(&cmd.args[0]);
        builder.args(&cmd.args[1..]);

        let inherited = upstream.take();
        match cmd.input_file {
            Some(ref path) => match File::open(path) {
                Ok(file) => {
                    builder.stdin(process::Stdio::from(file));
                }
                Err(ref err) => {
                    let message = format!("open input file: {}\n", err);
                    diagnostics.extend_from_slice(message.as_bytes());
                    continue;
                }
            },
            None => match inherited {
                Some(stdout) => {
                    builder.stdin(process::Stdio::from(stdout));
                }
                None => {
                    builder.stdin(process::Stdio::null());
                }
            },
        }

        match cmd.output_file {
            Some(ref path) => match File::create(path) {
                Ok(file) => {
                    builder.stdout(process::Stdio::from(file));
                }
                Err(ref err) => {
                    let message = format!("open output file: {}\n", err);
                    diagnostics.extend_from_slice(message.as_bytes());
                    continue;
                }
            },
            None => {
                builder.stdout(process::Stdio::piped());
            }
        }

        match cmd.error_file {
            Some(ref path) => match File::create(path) {
                Ok(file) => {
                    builder.stderr(process::Stdio::from(file));
                }
                Err(ref err) => {
                    let message = format!("open error file: {}\n", err);
                    diagnostics.extend_from_slice(message.as_bytes());
                    continue;
                }
            },
            None => {
                builder.stderr(process::Stdio::piped());
            }
        }

        match builder.spawn() {
            Ok(mut child) => {
                if i < last {
                    upstream = child.stdout.take();
                }
                children.push(child);
            }
            Err(ref err) => {
                diagnostics.extend_from_slice(&spawn_failure(&cmd.args[0], err));
            }
        }
    }

    let mut stderr_threads = Vec::with_capacity(children.len());
    for child in children.iter_mut() {
        if let Some(thread) = drain_stderr(child) {
            stderr_threads.push(thread);
        }
    }

    let mut captured = Vec::new();
    if let Some(child) = children.last_mut() {
        if let Some(ref mut stdout) = child.stdout {
            let _ = stdout.read_to_end(&mut captured);
        }
    }

    for thread in stderr_threads {
        if let Ok(bytes) = thread.join() {
            captured.extend_from_slice(&bytes);
        }
    }

    for child in children.iter_mut() {
        let _ = child.wait();
    }

    captured.extend_from_slice(&diagnostics);
    captured
}

// The built-in `cd`. With no argument, changes to $HOME.
fn change_directory(cmd: &Command) -> Vec<u8> {
    let target = match cmd.args.get(1) {
        Some(dir) => dir.clone(),
        None => match env::var("HOME") {
            Ok(home) => home,
            Err(_) => return b"cd: HOME not set\n".to_vec(),
        },
    };

    match env::set_current_dir(&target) {
        Ok(_) => Vec::new(),
        Err(ref err) => format!("cd: {}: {}\n", target, err).into_bytes(),
    }
}

// Moves a child's stderr onto a drain thread. The thread collects everything
// the child writes there until it exits.
fn drain_stderr(child: &mut process::Child) -> Option<thread::JoinHandle<Vec<u8>>> {
    child.stderr.take().map(|mut stderr| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf);
            buf
        })
    })
}

// Turns a failed spawn into the message delivered to the client.
fn spawn_failure(name: &str, err: &io::Error) -> Vec<u8> {
    if err.kind() == io::ErrorKind::NotFound {
        format!("Command not found: \"{}\"\n", name).into_bytes()
    } else {
        format!("{}: {}\n", name, err).into_bytes()
    }
}
