use std::io::{IsTerminal, Write};
use std::time::{Duration, Instant};
use crossterm::cursor::MoveToColumn;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use tokio::sync::broadcast;
use crate::core::UploadEvent;
use crate::utils::{SpeedCalculator, format_bytes, format_duration, format_speed, percentage};

/// Minimum spacing between progress lines when stderr is not a terminal.
const PLAIN_INTERVAL: Duration = Duration::from_secs(5);

/// Renders upload progress on stderr.
pub struct ProgressReporter {
    title: String,
    speed: SpeedCalculator,
    interactive: bool,
    last_plain: Option<Instant>,
}

impl ProgressReporter {
    /// `interactive` redraws a single line in place; otherwise lines are
    /// appended at most every few seconds.
    pub fn new(interactive: bool) -> Self {
        Self {
            title: String::new(),
            speed: SpeedCalculator::new(Duration::from_secs(5)),
            interactive,
            last_plain: None,
        }
    }

    pub fn for_stderr() -> Self {
        Self::new(std::io::stderr().is_terminal())
    }

    /// Consume events until every sender is gone.
    pub async fn run(mut self, mut events: broadcast::Receiver<UploadEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.handle(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// `title  42.0%  1.00 MB / 2.38 MB  512.00 KB/s  ETA 3s`
    pub fn render_line(&self, bytes_sent: u64, total_bytes: u64) -> String {
        let mut line = format!(
            "{}  {:5.1}%  {} / {}",
            self.title,
            percentage(bytes_sent, total_bytes),
            format_bytes(bytes_sent),
            format_bytes(total_bytes),
        );

        let speed = self.speed.current_speed();
        if speed > 0.0 {
            line.push_str(&format!("  {}", format_speed(speed)));
        }
        if let Some(eta) = self.speed.estimate_eta(total_bytes.saturating_sub(bytes_sent)) {
            line.push_str(&format!("  ETA {}", format_duration(eta)));
        }
        line
    }

    fn handle(&mut self, event: UploadEvent) {
        match event {
            UploadEvent::Started { title, .. } => {
                self.title = title;
                self.speed = SpeedCalculator::new(Duration::from_secs(5));
                self.last_plain = None;
            }
            UploadEvent::Progress { bytes_sent, total_bytes, .. } => {
                self.speed.add_data_point(bytes_sent);
                let line = self.render_line(bytes_sent, total_bytes);
                self.draw(&line, bytes_sent == total_bytes);
            }
            UploadEvent::Completed { .. } | UploadEvent::Failed { .. } => {
                if self.interactive {
                    eprintln!();
                }
            }
            UploadEvent::StateChanged { .. } | UploadEvent::Retrying { .. } => {}
        }
    }

    fn draw(&mut self, line: &str, done: bool) {
        if self.interactive {
            let mut stderr = std::io::stderr();
            let _ = crossterm::execute!(
                stderr,
                MoveToColumn(0),
                Clear(ClearType::CurrentLine),
                Print(line)
            );
            let _ = stderr.flush();
            return;
        }

        let due = self
            .last_plain
            .is_none_or(|last| last.elapsed() >= PLAIN_INTERVAL);
        if due || done {
            eprintln!("{line}");
            self.last_plain = Some(Instant::now());
        }
    }
}
