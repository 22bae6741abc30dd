use crate::addressing::{Phase, tag, target_smoker};
use crate::config::RoleConfig;
use crate::error::{AddressingError, RoleError, StepContext};
use crate::ingredient::{Ingredient, IngredientPair, SmokerId};
use crate::mailbox::{Mailbox, Payload};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, info_span, warn};

/// Source of the two ingredients the seller puts on the table each round.
pub trait Supply {
    fn draw(&mut self) -> (Ingredient, Ingredient);
}

/// Draws two distinct ingredients uniformly at random.
#[derive(Debug, Clone)]
pub struct RandomSupply<R = StdRng> {
    rng: R,
}

impl RandomSupply<StdRng> {
    /// Seeds from `seed` if given, otherwise from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::with_rng(rng)
    }
}

impl<R: Rng> RandomSupply<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    fn pick(&mut self) -> Ingredient {
        Ingredient::ALL[self.rng.random_range(0..Ingredient::ALL.len())]
    }
}

impl<R: Rng> Supply for RandomSupply<R> {
    fn draw(&mut self) -> (Ingredient, Ingredient) {
        let first = self.pick();
        let second = loop {
            let second = self.pick();
            if second != first {
                break second;
            }
        };
        (first, second)
    }
}

impl<F: FnMut() -> (Ingredient, Ingredient)> Supply for F {
    fn draw(&mut self) -> (Ingredient, Ingredient) {
        self()
    }
}

/// What a single seller round ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// The full handshake completed with `target`.
    Served {
        target: SmokerId,
        pair: IngredientPair,
    },
    /// No smoker could use the draw; nothing was put on the table.
    Skipped(AddressingError),
}

/// The seller: the only producer of ingredients.
///
/// A round goes through `PICK -> DELIVER -> AWAIT_REQUEST -> GRANT ->
/// AWAIT_DONE`. Both waits are selective on the target's own tags, so
/// requests from other smokers stay queued and are never granted by
/// accident. The next round starts only after the target's done message
/// has been received, which keeps at most one smoker at the table.
#[derive(Debug)]
pub struct Seller<M, S> {
    mailbox: M,
    supply: S,
    config: RoleConfig,
}

impl<M: Mailbox, S: Supply> Seller<M, S> {
    pub fn new(mailbox: M, supply: S, config: RoleConfig) -> Self {
        Self {
            mailbox,
            supply,
            config,
        }
    }

    /// Plays one round.
    ///
    /// An impossible draw is logged and reported as
    /// [`RoundOutcome::Skipped`]; only mailbox failures are errors.
    pub fn round(&mut self) -> Result<RoundOutcome, RoleError> {
        let pacing = self.config.pacing;

        let (first, second) = self.supply.draw();
        info!("pulled out some brand new ingredients: {first} and {second}");
        pacing.after_step();

        let target = match target_smoker(first, second) {
            Ok(target) => target,
            Err(err) => {
                warn!("got ingredients for unknown smoker? {err}");
                pacing.after_step();
                return Ok(RoundOutcome::Skipped(err));
            }
        };
        let pair = IngredientPair::new(first, second);

        let deliver = tag(target, Phase::Deliver);
        info!("putting ingredients on the table...");
        pacing.after_step();
        self.mailbox
            .send(deliver, &pair.to_payload())
            .during("put ingredients on the table")?;
        info!(tag = %deliver, "ingredients for {target} are on the table");
        pacing.after_step();

        let request = tag(target, Phase::Request);
        info!("waiting for smoke request...");
        pacing.after_step();
        self.mailbox
            .recv_matching(request)
            .during("await smoke request")?;
        info!(tag = %request, "got request from {target}");
        pacing.after_step();

        let grant = tag(target, Phase::Grant);
        self.mailbox
            .send(grant, &Payload::empty())
            .during("send confirmation")?;
        info!(tag = %grant, "you may smoke, {target}");
        pacing.after_step();

        info!("no one else touches the table");
        pacing.after_step();
        let done = tag(target, Phase::Done);
        self.mailbox
            .recv_matching(done)
            .during("await done rolling")?;
        info!(tag = %done, "ok, acquiring more ingredients...");
        pacing.after_step();

        Ok(RoundOutcome::Served { target, pair })
    }

    /// Runs rounds until the configured limit, or forever.
    ///
    /// Skipped rounds count towards the limit.
    pub fn run(&mut self) -> Result<(), RoleError> {
        let span = info_span!("seller");
        let _enter = span.enter();

        let mut completed = 0u64;
        while self.config.keep_going(completed) {
            self.round()?;
            completed += 1;
            if self.config.keep_going(completed) {
                self.config.pacing.after_round();
            }
        }
        Ok(())
    }
}

/// Entry point for the seller: runs the round loop over `mailbox` with
/// randomly drawn ingredients.
pub fn run_producer<M: Mailbox>(mailbox: M, config: &RoleConfig) -> Result<(), RoleError> {
    let supply = RandomSupply::new(config.seed);
    Seller::new(mailbox, supply, config.clone()).run()
}
