use std::thread;
use std::time::Duration;

/// Pause after every narrated step, so the interleaving stays readable.
pub const STEP_DELAY: Duration = Duration::from_millis(100);

/// Pause between two rounds of the seller.
pub const ROUND_DELAY: Duration = Duration::from_secs(5);

/// Pause between starting two participants.
pub const SPAWN_DELAY: Duration = Duration::from_secs(1);

/// Human-oriented pacing of the simulation.
///
/// None of these delays affect the protocol; [`Pacing::none`] runs the
/// exchange as fast as the scheduler allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub step_delay: Duration,
    pub round_delay: Duration,
    pub spawn_delay: Duration,
}

impl Pacing {
    pub const fn none() -> Self {
        Self {
            step_delay: Duration::ZERO,
            round_delay: Duration::ZERO,
            spawn_delay: Duration::ZERO,
        }
    }

    #[inline]
    pub fn after_step(&self) {
        pause(self.step_delay);
    }

    #[inline]
    pub fn after_round(&self) {
        pause(self.round_delay);
    }

    #[inline]
    pub fn after_spawn(&self) {
        pause(self.spawn_delay);
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            step_delay: STEP_DELAY,
            round_delay: ROUND_DELAY,
            spawn_delay: SPAWN_DELAY,
        }
    }
}

fn pause(d: Duration) {
    if !d.is_zero() {
        thread::sleep(d);
    }
}

/// Settings shared by the seller and smoker loops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleConfig {
    pub pacing: Pacing,
    /// Stop cleanly after this many complete rounds; `None` runs forever.
    pub rounds: Option<u64>,
    /// Seed for the seller's ingredient picks; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl RoleConfig {
    /// Unpaced configuration that stops after `rounds` rounds.
    pub fn bounded(rounds: u64) -> Self {
        Self {
            pacing: Pacing::none(),
            rounds: Some(rounds),
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// `true` while round number `completed` (zero-based count of finished
    /// rounds) should still be played.
    #[inline]
    pub fn keep_going(&self, completed: u64) -> bool {
        self.rounds.is_none_or(|limit| completed < limit)
    }
}
