use std::time::{Duration, Instant};

/// Wall-clock accounting for executed slices. Accumulates slice runtimes and
/// reports the running average every `measurement_count` slices, so slow
/// shell commands show up in the server log without per-slice noise.
pub struct SliceTimer {
    total: Duration,
    start_time: Option<Instant>,
    run_count: u64,
    measurement_count: u64,
}

impl SliceTimer {
    pub fn new(measurement_count: u64) -> SliceTimer {
        SliceTimer {
            total: Duration::new(0, 0),
            start_time: None,
            run_count: 0,
            measurement_count: measurement_count,
        }
    }

    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
    }

    pub fn stop(&mut self) -> Duration {
        let elapsed = match self.start_time.take() {
            Some(start) => start.elapsed(),
            None => Duration::new(0, 0),
        };

        self.total += elapsed;
        self.run_count += 1;
        if self.run_count == self.measurement_count {
            debug!(
                "average slice runtime over {} slices: {:?}",
                self.run_count,
                self.total / self.run_count as u32
            );
            self.run_count = 0;
            self.total = Duration::new(0, 0);
        }

        elapsed
    }
}
