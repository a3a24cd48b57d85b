use anyhow::Result;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info};

use crate::daemon::storage::entry_store::EntryStore;

use super::{Effect, Sample, SessionState, advance};

/// Consumes the sampler's output and owns everything that changes: the
/// session state and the entry store. Being the only writer is what keeps
/// the single-open-entry invariant intact without locks.
pub struct SessionModule<S> {
    receiver: Receiver<Sample>,
    store: S,
    state: SessionState,
}

impl<S: EntryStore> SessionModule<S> {
    pub fn new(receiver: Receiver<Sample>, store: S) -> Self {
        Self {
            receiver,
            store,
            state: SessionState::default(),
        }
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(sample) = self.receiver.recv().await {
            debug!("Processing sample {:?}", sample);
            self.step(&sample).await;
        }

        let result = self.store.flush().await;
        self.receiver.close();
        result
    }

    async fn step(&mut self, sample: &Sample) {
        let (next, effects) = advance(self.state, sample);

        for effect in effects {
            // A failed write is logged and the state moves on anyway. The
            // next startup's discard pass cleans up whatever this leaves
            // half-recorded.
            if let Err(e) = self.apply(effect).await {
                error!("Failed to persist {:?}: {e:?}", effect);
            }
        }

        if next != self.state {
            info!("Session {:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }

    async fn apply(&mut self, effect: Effect) -> Result<()> {
        match effect {
            Effect::Open { program, at } => self.store.open_entry(program, at).await,
            Effect::Close { program, at } => self.store.close_entry(program, at).await,
        }
    }
}
