//! Episode loggers for training telemetry.
//!
//! Provides different logging backends for the per-episode reports learners
//! emit. Logging is observational only.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// One completed-episode report.
#[derive(Debug, Clone)]
pub struct TrainingSnapshot {
    /// Reporting learner index.
    pub learner_id: usize,
    /// Global step when the episode ended.
    pub global_t: u64,
    /// Total episode reward.
    pub episode_reward: f32,
    /// Episode length in environment steps.
    pub episode_length: u64,
    /// Best evaluation reward seen so far.
    pub best_reward: f32,
}

/// Logger trait for different logging backends.
pub trait MetricsLogger: Send {
    /// Log an episode report.
    fn log(&mut self, snapshot: &TrainingSnapshot);

    /// Flush any buffered output.
    fn flush(&mut self);
}

/// Console logger with interval gating on the global step.
pub struct ConsoleLogger {
    log_interval: u64,
    last_log_step: u64,
    start_time: Instant,
    show_header: bool,
}

impl ConsoleLogger {
    /// Create a console logger that prints at most once per `log_interval`
    /// global steps.
    pub fn new(log_interval: u64) -> Self {
        Self {
            log_interval,
            last_log_step: 0,
            start_time: Instant::now(),
            show_header: true,
        }
    }

    fn print_header(&self) {
        println!(
            "{:>10} {:>8} {:>10} {:>8} {:>10} {:>8}",
            "Step", "Learner", "Reward", "Length", "Best", "Elapsed"
        );
        println!("{}", "-".repeat(60));
    }
}

impl MetricsLogger for ConsoleLogger {
    fn log(&mut self, snapshot: &TrainingSnapshot) {
        if snapshot.global_t < self.last_log_step + self.log_interval {
            return;
        }
        if self.show_header {
            self.print_header();
            self.show_header = false;
        }
        println!(
            "{:>10} {:>8} {:>10.2} {:>8} {:>10.2} {:>7.0}s",
            snapshot.global_t,
            snapshot.learner_id,
            snapshot.episode_reward,
            snapshot.episode_length,
            snapshot.best_reward,
            self.start_time.elapsed().as_secs_f32(),
        );
        self.last_log_step = snapshot.global_t;
    }

    fn flush(&mut self) {
        // stdout is line-buffered, nothing to do
    }
}

/// CSV file logger for offline analysis.
pub struct CSVLogger {
    writer: BufWriter<File>,
}

impl CSVLogger {
    /// Create a CSV logger writing to `path`.
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "global_t,learner_id,episode_reward,episode_length,best_reward")?;
        Ok(Self { writer })
    }
}

impl MetricsLogger for CSVLogger {
    fn log(&mut self, snapshot: &TrainingSnapshot) {
        let _ = writeln!(
            self.writer,
            "{},{},{:.4},{},{:.4}",
            snapshot.global_t,
            snapshot.learner_id,
            snapshot.episode_reward,
            snapshot.episode_length,
            snapshot.best_reward,
        );
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

impl Drop for CSVLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Multi-logger that writes to several backends. An empty multi-logger is a
/// convenient null logger for tests.
pub struct MultiLogger {
    loggers: Vec<Box<dyn MetricsLogger>>,
}

impl MultiLogger {
    /// Create an empty multi-logger.
    pub fn new() -> Self {
        Self {
            loggers: Vec::new(),
        }
    }

    /// Add a backend.
    pub fn add<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }
}

impl Default for MultiLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsLogger for MultiLogger {
    fn log(&mut self, snapshot: &TrainingSnapshot) {
        for logger in &mut self.loggers {
            logger.log(snapshot);
        }
    }

    fn flush(&mut self) {
        for logger in &mut self.loggers {
            logger.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn snapshot(global_t: u64) -> TrainingSnapshot {
        TrainingSnapshot {
            learner_id: 0,
            global_t,
            episode_reward: 1.5,
            episode_length: 30,
            best_reward: 2.0,
        }
    }

    #[test]
    fn test_csv_logger_writes_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("episodes.csv");
        {
            let mut logger = CSVLogger::new(&path).unwrap();
            logger.log(&snapshot(10));
            logger.log(&snapshot(20));
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3); // header + 2 rows
        assert!(contents.lines().nth(1).unwrap().starts_with("10,0,"));
    }

    #[test]
    fn test_multi_logger_fans_out() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("episodes.csv");
        let mut multi = MultiLogger::new().add(CSVLogger::new(&path).unwrap());
        multi.log(&snapshot(5));
        multi.flush();
        assert!(std::fs::read_to_string(&path).unwrap().contains("5,0,"));
    }
}
