//! Performance statistics collection for `--stats` output.

use std::time::{Duration, Instant};

/// Collects phase timings and counters for one run.
///
/// Created when `--stats` is passed, threaded as `Option<&mut Stats>`.
/// Zero cost when `None`: no timing calls, no counter increments.
pub struct Stats {
    total_start: Instant,
    phases: Vec<(&'static str, Duration)>,
    // Collective round (accumulated over convolve calls)
    pub broadcast: Duration,
    pub pad: Duration,
    pub compute: Duration,
    pub gather: Duration,
    // Counters
    pub convolutions: u32,
    pub workers: usize,
    pub kernel_size: usize,
    pub local_rows: usize,
    pub pixels_evaluated: u64,
    pub bytes_gathered: u64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            total_start: Instant::now(),
            phases: Vec::new(),
            broadcast: Duration::ZERO,
            pad: Duration::ZERO,
            compute: Duration::ZERO,
            gather: Duration::ZERO,
            convolutions: 0,
            workers: 0,
            kernel_size: 0,
            local_rows: 0,
            pixels_evaluated: 0,
            bytes_gathered: 0,
        }
    }

    /// Record a completed phase with its duration.
    pub fn add_phase(&mut self, name: &'static str, duration: Duration) {
        self.phases.push((name, duration));
    }

    /// Print the stats table to stderr.
    pub fn display(&self) {
        let total = self.total_start.elapsed();
        eprintln!();
        eprintln!("=== Halosharp Performance Stats ===");

        for (name, dur) in &self.phases {
            eprintln!("  {:<24} {:>8.3}s", name, dur.as_secs_f64());
        }

        if self.convolutions > 0 {
            eprintln!("  Convolutions:           {}", self.convolutions);
            eprintln!("    Broadcast:            {:>8.3}s", self.broadcast.as_secs_f64());
            eprintln!("    Pad:                  {:>8.3}s", self.pad.as_secs_f64());
            eprintln!("    Compute:              {:>8.3}s", self.compute.as_secs_f64());
            eprintln!("    Gather:               {:>8.3}s", self.gather.as_secs_f64());
            eprintln!("  Workers:                {}", self.workers);
            eprintln!("  Kernel size:            {}", self.kernel_size);
            eprintln!("  Local rows (root):      {}", self.local_rows);
            eprintln!("  Pixels evaluated:       {}", self.pixels_evaluated);
            eprintln!("  Bytes gathered:         {}", self.bytes_gathered);
        }

        eprintln!("  ─────────────────────────────────");
        eprintln!("  Total:                  {:>8.3}s", total.as_secs_f64());
    }
}
