//! # Status Indicator
//!
//! Output channel for authentication feedback. On the door unit this is a
//! pair of LEDs; the default implementation writes to the log.
//!
//! Each pulse holds for a configured duration and then turns off. Pulses
//! block the handler that raised them, so at most one is visible at a time.

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// What a pulse reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorSignal {
    /// Card recognised, waiting for the PIN.
    RfidAccepted,
    /// PIN verified, record forwarded.
    PinAccepted,
    /// Any rejection or processing failure.
    Error,
}

impl std::fmt::Display for IndicatorSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndicatorSignal::RfidAccepted => write!(f, "rfid_accepted"),
            IndicatorSignal::PinAccepted => write!(f, "pin_accepted"),
            IndicatorSignal::Error => write!(f, "error"),
        }
    }
}

/// Feedback output.
#[async_trait]
pub trait Indicator: Send + Sync {
    /// Shows `signal` for `hold`, then clears it.
    async fn pulse(&self, signal: IndicatorSignal, hold: Duration);
}

/// Indicator that logs on/off transitions.
#[derive(Debug, Default, Clone)]
pub struct LogIndicator;

#[async_trait]
impl Indicator for LogIndicator {
    async fn pulse(&self, signal: IndicatorSignal, hold: Duration) {
        info!(signal = %signal, hold_ms = hold.as_millis() as u64, "Indicator on");
        tokio::time::sleep(hold).await;
        info!(signal = %signal, "Indicator off");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_log_indicator_holds() {
        let start = tokio::time::Instant::now();
        LogIndicator
            .pulse(IndicatorSignal::PinAccepted, Duration::from_secs(2))
            .await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
