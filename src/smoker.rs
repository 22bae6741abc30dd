use crate::addressing::{Phase, tag};
use crate::config::RoleConfig;
use crate::error::{RoleError, StepContext};
use crate::ingredient::{IngredientPair, SmokerId};
use crate::mailbox::{Mailbox, Payload};
use tracing::{info, info_span, warn};

/// One smoker at the table.
///
/// Each round walks the same states:
///
/// 1. **Request**: ask to smoke, unconditionally.
/// 2. **Await grant**: block on this smoker's grant tag. The seller only
///    grants after it has put the ingredients on this smoker's delivery tag
///    and seen this smoker's request, so a grant proves the delivery is
///    already queued.
/// 3. **Take**: pick the two ingredients up from the delivery tag.
/// 4. **Roll**: local work, no mailbox traffic.
/// 5. **Done**: tell the seller the table is free.
/// 6. **Smoke**: local work again, outside the exchange.
#[derive(Debug)]
pub struct Smoker<M> {
    id: SmokerId,
    mailbox: M,
    config: RoleConfig,
}

impl<M: Mailbox> Smoker<M> {
    pub fn new(id: SmokerId, mailbox: M, config: RoleConfig) -> Self {
        Self {
            id,
            mailbox,
            config,
        }
    }

    /// Plays one complete round and returns the ingredients taken.
    pub fn round(&self) -> Result<IngredientPair, RoleError> {
        let id = self.id;
        let pacing = &self.config.pacing;

        let request = tag(id, Phase::Request);
        info!(%id, tag = %request, "can I smoke? I only have {}", id.held());
        pacing.after_step();
        self.mailbox
            .send(request, &Payload::empty())
            .during("request to smoke")?;

        let grant = tag(id, Phase::Grant);
        self.mailbox
            .recv_matching(grant)
            .during("await confirmation")?;
        info!(%id, tag = %grant, "received confirmation");
        pacing.after_step();

        let deliver = tag(id, Phase::Deliver);
        let msg = self
            .mailbox
            .recv_matching(deliver)
            .during("take ingredients")?;
        let pair = IngredientPair::from_payload(&msg.payload).during("take ingredients")?;
        info!(%id, tag = %deliver, "took {pair} from the table");
        if !pair.is_distinct() || pair.contains(id.held()) {
            warn!(%id, "{pair} is not what {id} was missing");
        }
        pacing.after_step();

        info!(%id, "thanks! rolling cigarette...");
        pacing.after_step();

        let done = tag(id, Phase::Done);
        info!(%id, tag = %done, "done rolling!");
        pacing.after_step();
        self.mailbox
            .send(done, &Payload::empty())
            .during("signal done rolling")?;

        info!(%id, "smoking...");
        pacing.after_step();

        Ok(pair)
    }

    /// Runs rounds until the configured limit, or forever.
    ///
    /// Returns only once the limit is reached or on the first failure.
    pub fn run(&self) -> Result<(), RoleError> {
        let span = info_span!("smoker", id = self.id.get());
        let _enter = span.enter();

        let mut completed = 0u64;
        while self.config.keep_going(completed) {
            self.round()?;
            completed += 1;
        }
        Ok(())
    }
}

/// Entry point for smoker `id`: runs the smoker loop over `mailbox`.
pub fn run_consumer<M: Mailbox>(
    id: SmokerId,
    mailbox: M,
    config: &RoleConfig,
) -> Result<(), RoleError> {
    Smoker::new(id, mailbox, config.clone()).run()
}
