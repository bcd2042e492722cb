use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::time::Duration;

use crate::models::Classification;
use crate::scheduler::RunEvent;
use crate::utils::format_duration;

/// Progress bars on stderr for a running harness, driven by scheduler events.
pub struct RunProgress {
    multi: MultiProgress,
    overall: ProgressBar,
    running: HashMap<usize, ProgressBar>,
    failures: usize,
    start_time: std::time::Instant,
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {bar:30.cyan/dark_gray} {pos}/{len} examples | {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("    {spinner:.yellow} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

impl RunProgress {
    pub fn new(total: usize) -> Self {
        Self::with_target(total, ProgressDrawTarget::stderr())
    }

    /// Progress that tracks state without drawing anything.
    pub fn hidden(total: usize) -> Self {
        Self::with_target(total, ProgressDrawTarget::hidden())
    }

    fn with_target(total: usize, target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        let overall = multi.add(ProgressBar::new(total as u64));
        overall.set_style(bar_style());
        overall.set_message("starting");
        Self {
            multi,
            overall,
            running: HashMap::new(),
            failures: 0,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn handle_event(&mut self, event: &RunEvent) {
        match event {
            RunEvent::Queued { total } => {
                self.overall.set_length(*total as u64);
            }
            RunEvent::Started { index, id } => {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(spinner_style());
                bar.set_message(id.clone());
                bar.enable_steady_tick(Duration::from_millis(100));
                self.running.insert(*index, bar);
            }
            RunEvent::Finished { index, id, classification, elapsed_ms } => {
                if let Some(bar) = self.running.remove(index) {
                    bar.finish_and_clear();
                }
                self.overall.inc(1);
                match classification {
                    Classification::HarnessError | Classification::Inconclusive => {
                        self.failures += 1;
                        let elapsed = elapsed_ms.map(format_duration).unwrap_or_else(|| "-".into());
                        self.println(&format!(
                            "  {} {} {} ({})",
                            style("!").for_stderr().yellow(),
                            id,
                            classification,
                            elapsed
                        ));
                    }
                    _ => {}
                }
                self.overall.set_message(format!(
                    "{} | {} not confirmed",
                    format_duration(self.start_time.elapsed().as_millis() as u64),
                    self.failures
                ));
            }
        }
    }

    pub fn finish(&mut self) {
        for (_, bar) in self.running.drain() {
            bar.finish_and_clear();
        }
        self.overall.finish_and_clear();
    }

    pub fn position(&self) -> u64 {
        self.overall.position()
    }

    pub fn in_flight(&self) -> usize {
        self.running.len()
    }

    /// Print a line without tearing the bars.
    pub fn println(&self, msg: &str) {
        let _ = self.multi.println(msg);
    }
}
