use std::time::{Duration, Instant};

/// Real time and time spent loading since the timer started
#[derive(Debug, Clone)]
pub struct LoadTimer {
    started: Instant,
    loading_since: Option<Instant>,
    loading_total: Duration,
    loads: u32,
}

impl LoadTimer {
    pub fn new(started: Instant) -> Self {
        Self {
            started,
            loading_since: None,
            loading_total: Duration::ZERO,
            loads: 0,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading_since.is_some()
    }

    /// Number of loads that have started
    pub fn loads(&self) -> u32 {
        self.loads
    }

    /// Record the loading state at `now`; returns whether it changed
    pub fn set_loading(&mut self, loading: bool, now: Instant) -> bool {
        match (self.loading_since, loading) {
            (None, true) => {
                self.loading_since = Some(now);
                self.loads += 1;
                true
            }
            (Some(since), false) => {
                self.loading_total += now.saturating_duration_since(since);
                self.loading_since = None;
                true
            }
            _ => false,
        }
    }

    pub fn real_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    pub fn loading_time(&self, now: Instant) -> Duration {
        let running = self
            .loading_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or(Duration::ZERO);
        self.loading_total + running
    }

    /// Real time with loads removed
    pub fn game_time(&self, now: Instant) -> Duration {
        self.real_time(now).saturating_sub(self.loading_time(now))
    }
}

/// `h:mm:ss.mmm`, or `m:ss.mmm` under an hour
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    let (hours, rest) = (millis / 3_600_000, millis % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    let (seconds, millis) = (rest / 1000, rest % 1000);
    if hours > 0 {
        format!("{}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
    } else {
        format!("{}:{:02}.{:03}", minutes, seconds, millis)
    }
}
