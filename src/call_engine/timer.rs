//! Anruf-Timer
//!
//! Tickt einmal pro Sekunde und veröffentlicht die vergangene Zeit als
//! `MM:SS`. Minuten laufen über 59 hinaus weiter (`61:01`). Ein gestoppter
//! Timer kann nicht neu gestartet werden, für einen neuen Anruf wird ein
//! neuer Timer erzeugt.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

const TICK: Duration = Duration::from_secs(1);

/// Formatiert vergangene Sekunden als `MM:SS`
pub fn format_elapsed(elapsed_secs: u64) -> String {
    format!("{:02}:{:02}", elapsed_secs / 60, elapsed_secs % 60)
}

/// Laufender Timer eines Anrufs
#[derive(Debug)]
pub struct CallTimer {
    elapsed: watch::Receiver<String>,
    task: JoinHandle<()>,
}

impl CallTimer {
    /// Startet den Timer sofort
    pub fn start() -> Self {
        Self::start_after(Duration::ZERO)
    }

    /// Startet den Timer nach `delay`; bis dahin steht er auf `00:00`
    pub fn start_after(delay: Duration) -> Self {
        let (tx, rx) = watch::channel(format_elapsed(0));

        let task = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();
            let mut ticks = interval_at(start + TICK, TICK);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticks.tick().await;
                let elapsed = start.elapsed().as_secs();
                if tx.send(format_elapsed(elapsed)).is_err() {
                    break;
                }
            }
        });

        Self { elapsed: rx, task }
    }

    /// Aktuell angezeigte Zeit
    pub fn current(&self) -> String {
        self.elapsed.borrow().clone()
    }

    /// Receiver, der bei jedem Tick aktualisiert wird
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.elapsed.clone()
    }

    /// Stoppt den Timer endgültig
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for CallTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(9), "00:09");
        assert_eq!(format_elapsed(75), "01:15");
        assert_eq!(format_elapsed(3599), "59:59");
    }

    #[test]
    fn test_minutes_are_not_capped() {
        assert_eq!(format_elapsed(3661), "61:01");
        assert_eq!(format_elapsed(6000 * 60 + 5), "6000:05");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_ticks_every_second() {
        let timer = CallTimer::start();
        assert_eq!(timer.current(), "00:00");

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(timer.current(), "00:03");

        tokio::time::sleep(Duration::from_secs(72)).await;
        assert_eq!(timer.current(), "01:15");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_waits_for_start_delay() {
        let timer = CallTimer::start_after(Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(timer.current(), "00:00");

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(timer.current(), "00:01");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_timer_does_not_advance() {
        let timer = CallTimer::start();
        let elapsed = timer.subscribe();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        timer.stop();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*elapsed.borrow(), "00:02");
    }
}
