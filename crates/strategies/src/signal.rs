use chrono::{DateTime, Duration, Utc};
use core_types::{CloseSignal, OpenSignal, PatternKind};

/// Where the per-bar signal machine stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalPhase {
    #[default]
    Idle,
    /// A pattern was found and awaits oscillator confirmation.
    PatternPending,
    /// A confirmed entry signal is live.
    Confirmed,
    /// The entry signal was used up by an open position.
    SignalConsumed,
}

/// The fully computed outcome of one bar evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalSnapshot {
    pub pattern: PatternKind,
    pub open: OpenSignal,
    pub close: CloseSignal,
}

impl SignalSnapshot {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Per-bar signal state for one controller.
///
/// Only [`SignalState::commit`] changes the signals, and it takes a complete
/// snapshot, so an evaluation that fails half way leaves the state untouched.
#[derive(Debug, Clone, Default)]
pub struct SignalState {
    phase: SignalPhase,
    open: OpenSignal,
    close: CloseSignal,
    next_bar_open: Option<DateTime<Utc>>,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SignalPhase {
        self.phase
    }

    pub fn open_signal(&self) -> OpenSignal {
        self.open
    }

    pub fn close_signal(&self) -> CloseSignal {
        self.close
    }

    pub fn next_bar_open(&self) -> Option<DateTime<Utc>> {
        self.next_bar_open
    }

    /// Whether a new bar boundary has been reached since the last commit.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_bar_open.is_none_or(|next| now >= next)
    }

    /// Applies a successful evaluation of the bar that opened at `bar_open`.
    /// The previous bar's signals are superseded.
    pub fn commit(&mut self, snapshot: SignalSnapshot, bar_open: DateTime<Utc>, period: Duration) {
        // Idle -> PatternPending when the scan found something; the filter's
        // verdict then resolves it to Confirmed or back to Idle.
        self.phase = if snapshot.pattern == PatternKind::None {
            SignalPhase::Idle
        } else {
            SignalPhase::PatternPending
        };
        if self.phase == SignalPhase::PatternPending {
            self.phase = if snapshot.open.is_none() {
                SignalPhase::Idle
            } else {
                SignalPhase::Confirmed
            };
        }

        self.open = if self.phase == SignalPhase::Confirmed {
            snapshot.open
        } else {
            OpenSignal::None
        };
        // An entry signal suppresses the oscillator exit path for the bar.
        self.close = if self.open.is_none() {
            snapshot.close
        } else {
            CloseSignal::None
        };
        self.next_bar_open = Some(bar_open + period);
    }

    /// Marks the entry signal as used by an open position.
    pub fn consume_open(&mut self) {
        if self.phase == SignalPhase::Confirmed {
            self.phase = SignalPhase::SignalConsumed;
        }
        self.open = OpenSignal::None;
    }

    /// Clears the exit signal once no matching position remains.
    pub fn consume_close(&mut self) {
        self.close = CloseSignal::None;
    }
}
