//! Progress display module
//!
//! Renders one transfer's event stream on the terminal.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::debug;

use crate::transfer::{ProgressReceiver, TransferEvent};

const SPINNER: &[char] = &['|', '/', '-', '\\'];

/// Transfer statistics for progress display
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    /// Bytes transferred so far
    pub transferred: u64,
    /// Total bytes of the transfer
    pub total: u64,
    /// Speed in bytes per second
    pub speed: f64,
}

impl TransferStats {
    /// Stats for `transferred` of `total` bytes after `elapsed`
    pub fn new(transferred: u64, total: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let speed = if secs > 0.0 { transferred as f64 / secs } else { 0.0 };
        Self { transferred, total, speed }
    }

    /// Completion ratio (0.0 to 1.0); an empty transfer counts as complete
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.transferred as f64 / self.total as f64
        }
    }

    /// Format bytes to human readable string
    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_index])
    }

    /// Format speed to human readable string
    pub fn format_speed(bytes_per_sec: f64) -> String {
        format!("{}/s", Self::format_bytes(bytes_per_sec as u64))
    }

    /// Format duration to human readable string
    pub fn format_duration(duration: Duration) -> String {
        let total_secs = duration.as_secs();
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Calculate ETA based on speed and remaining bytes
    pub fn calculate_eta(transferred: u64, total: u64, speed: f64) -> Option<Duration> {
        if speed <= 0.0 || transferred >= total {
            return None;
        }

        let remaining = total.saturating_sub(transferred) as f64;
        Some(Duration::from_secs_f64(remaining / speed))
    }

    /// The bar line shown while bytes move
    pub fn progress_line(&self, name: &str) -> String {
        let bar_width: usize = 40;
        let ratio = self.progress().clamp(0.0, 1.0);
        let filled = (ratio * bar_width as f64) as usize;
        let bar = "=".repeat(filled) + &" ".repeat(bar_width - filled);

        let eta = Self::calculate_eta(self.transferred, self.total, self.speed)
            .map(Self::format_duration)
            .unwrap_or_else(|| "-".to_string());

        format!(
            "{} [{}] {:.1}% | {} / {} | {} | ETA: {}",
            name,
            bar,
            ratio * 100.0,
            Self::format_bytes(self.transferred),
            Self::format_bytes(self.total),
            Self::format_speed(self.speed),
            eta,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum View {
    Idle,
    Spinning { name: String, frame: usize },
    Bar { name: String, total: u64, done: u64 },
}

/// Progress display for CLI
pub struct ProgressDisplay {
    /// Start of the current transfer
    start_time: Instant,
    /// Last redraw
    last_update: Instant,
    /// Minimum time between redraws of the bar
    update_interval: Duration,
    /// Quiet mode (no progress output)
    quiet: bool,
    view: View,
}

impl ProgressDisplay {
    /// Create a new progress display
    pub fn new(quiet: bool) -> Self {
        Self::with_interval(quiet, Duration::from_millis(200))
    }

    /// Create a progress display with custom update interval
    pub fn with_interval(quiet: bool, interval: Duration) -> Self {
        Self {
            start_time: Instant::now(),
            last_update: Instant::now(),
            update_interval: interval,
            quiet,
            view: View::Idle,
        }
    }

    /// Apply one event and redraw
    pub fn handle(&mut self, event: &TransferEvent) -> io::Result<()> {
        match event {
            TransferEvent::Resolving { name } => {
                self.view = View::Spinning { name: name.clone(), frame: 0 };
                self.draw()
            }
            TransferEvent::Start { name, total_size } => {
                self.start_time = Instant::now();
                self.view = View::Bar {
                    name: name.clone(),
                    total: *total_size,
                    done: 0,
                };
                self.draw()
            }
            TransferEvent::Progress { bytes_transferred } => {
                if let View::Bar { done, total, .. } = &mut self.view {
                    *done = *bytes_transferred;
                    let last = *done >= *total;
                    if last || self.last_update.elapsed() >= self.update_interval {
                        return self.draw();
                    }
                }
                Ok(())
            }
            TransferEvent::Finish { success } => {
                let line = self.finish_line(*success);
                self.view = View::Idle;
                if self.quiet {
                    return Ok(());
                }
                let mut out = io::stdout();
                writeln!(out, "\r\x1b[2K{}", line)?;
                out.flush()
            }
        }
    }

    /// Advance the spinner, if one is showing
    pub fn tick(&mut self) -> io::Result<()> {
        if let View::Spinning { frame, .. } = &mut self.view {
            *frame = (*frame + 1) % SPINNER.len();
            return self.draw();
        }
        Ok(())
    }

    fn stats(&self) -> Option<(String, TransferStats)> {
        match &self.view {
            View::Bar { name, total, done } => {
                Some((name.clone(), TransferStats::new(*done, *total, self.start_time.elapsed())))
            }
            _ => None,
        }
    }

    /// Current status line, if anything is in flight
    fn current_line(&self) -> Option<String> {
        match &self.view {
            View::Idle => None,
            View::Spinning { name, frame } => Some(format!("{} {} (resolving)", SPINNER[*frame], name)),
            View::Bar { .. } => self.stats().map(|(name, stats)| stats.progress_line(&name)),
        }
    }

    fn finish_line(&self, success: bool) -> String {
        let elapsed = TransferStats::format_duration(self.start_time.elapsed());
        match (&self.view, success) {
            (View::Bar { name, done, .. }, true) => {
                format!("{}: done, {} in {}", name, TransferStats::format_bytes(*done), elapsed)
            }
            (View::Bar { name, done, total }, false) => format!(
                "{}: failed after {} of {}",
                name,
                TransferStats::format_bytes(*done),
                TransferStats::format_bytes(*total)
            ),
            (View::Spinning { name, .. }, _) => format!("{}: failed", name),
            (View::Idle, _) => String::new(),
        }
    }

    fn draw(&mut self) -> io::Result<()> {
        self.last_update = Instant::now();
        if self.quiet {
            return Ok(());
        }
        if let Some(line) = self.current_line() {
            let mut out = io::stdout();
            write!(out, "\r\x1b[2K{}", line)?;
            out.flush()?;
        }
        Ok(())
    }

    /// Print an error message
    pub fn print_error(&self, message: &str) -> io::Result<()> {
        eprintln!("\r\x1b[2KError: {}", message);
        Ok(())
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

/// Render events from `rx` until the sending side is dropped
pub fn spawn_renderer(mut rx: ProgressReceiver, quiet: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut display = ProgressDisplay::new(quiet);
        let mut ticker = tokio::time::interval(Duration::from_millis(120));
        loop {
            let result = tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => display.handle(&event),
                    None => break,
                },
                _ = ticker.tick() => display.tick(),
            };
            if let Err(e) = result {
                debug!("Progress output failed: {}", e);
            }
        }
    })
}
