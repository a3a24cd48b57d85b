use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use sampling::{SamplerModule, idle::IdleGate};
use session::{Sample, module::SessionModule};
use storage::{
    entry_store::{EntryStore, LocalEntryStore},
    registry::{ProgramRegistry, RegistryWatcher},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    probe::{ActivityProbe, GenericProbe},
    utils::clock::{Clock, DefaultClock},
};

pub mod args;
pub mod config;
pub mod sampling;
pub mod session;
pub mod shutdown;
pub mod storage;

/// How often the foreground window and idle time get sampled.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf) -> Result<()> {
    std::env::set_current_dir("/")?;

    let config = config::load_or_create(&dir);

    let mut store = LocalEntryStore::new(dir.join("records"))?;
    let discarded = store.discard_open_entries().await?;
    info!("Discarded {discarded} entries left unterminated by a previous run");

    let (sender, receiver) = mpsc::channel::<Sample>(1);
    let probe = GenericProbe::new()?;

    let shutdown_token = CancellationToken::new();

    let sampler = create_sampler(
        sender,
        probe,
        &shutdown_token,
        &config,
        RegistryWatcher::new(ProgramRegistry::new(&dir)),
        DefaultClock,
    );

    let session = SessionModule::new(receiver, store);

    let (_, sampling_result, session_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token),
        sampler.run(),
        session.run(),
    );

    if let Err(sampling_result) = sampling_result {
        error!("Sampling module got an error {:?}", sampling_result);
    }

    if let Err(session_result) = session_result {
        error!("Session module got an error {:?}", session_result);
    }

    Ok(())
}

fn create_sampler(
    sender: mpsc::Sender<Sample>,
    probe: impl ActivityProbe + 'static,
    shutdown_token: &CancellationToken,
    config: &config::Config,
    programs: RegistryWatcher,
    clock: impl Clock,
) -> SamplerModule {
    SamplerModule::new(
        sender,
        Box::new(probe),
        shutdown_token.clone(),
        IdleGate::from_seconds(config.mouse_timeout),
        programs,
        POLL_INTERVAL,
        Box::new(clock),
    )
}
