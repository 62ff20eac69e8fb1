//! Bounded rescan of a freshly created or moved-in directory.
//!
//! A directory may still be filling up when its creation event arrives, so it
//! is listed several times with a short pause before each listing. The
//! schedule is an explicit state machine; the pause is delegated to a
//! [`Sleeper`] so the schedule can be driven without real time.

use std::future::Future;
use std::time::Duration;

/// Number of listings performed after a directory event
pub const DEFAULT_ROUNDS: u32 = 3;

/// Pause before each listing
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

/// How often and how far apart a directory is rescanned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RescanPolicy {
    pub rounds: u32,
    pub delay: Duration,
}

impl Default for RescanPolicy {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_ROUNDS,
            delay: DEFAULT_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanState {
    Idle,
    Waiting { round: u32 },
    Scanning { round: u32 },
    Done,
}

/// What the driver should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanStep {
    Wait(Duration),
    Scan { round: u32 },
    Done,
}

/// Idle -> Waiting(1) -> Scanning(1) -> ... -> Scanning(N) -> Done
#[derive(Debug)]
pub struct RescanMachine {
    policy: RescanPolicy,
    state: RescanState,
}

impl RescanMachine {
    pub fn new(policy: RescanPolicy) -> Self {
        Self {
            policy,
            state: RescanState::Idle,
        }
    }

    pub fn state(&self) -> RescanState {
        self.state
    }

    /// Move to the next state and return the step it calls for
    pub fn advance(&mut self) -> RescanStep {
        self.state = match self.state {
            RescanState::Idle if self.policy.rounds == 0 => RescanState::Done,
            RescanState::Idle => RescanState::Waiting { round: 1 },
            RescanState::Waiting { round } => RescanState::Scanning { round },
            RescanState::Scanning { round } if round < self.policy.rounds => {
                RescanState::Waiting { round: round + 1 }
            }
            RescanState::Scanning { .. } | RescanState::Done => RescanState::Done,
        };

        match self.state {
            RescanState::Waiting { .. } => RescanStep::Wait(self.policy.delay),
            RescanState::Scanning { round } => RescanStep::Scan { round },
            RescanState::Idle | RescanState::Done => RescanStep::Done,
        }
    }

    /// Abandon the remaining rounds
    pub fn cancel(&mut self) {
        self.state = RescanState::Done;
    }
}

/// Source of the pause between rescans
pub trait Sleeper: Send + Sync + 'static {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Real time, via tokio's timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
