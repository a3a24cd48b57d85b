//! The polling half of the daemon: one fixed-cadence loop that asks the
//! platform probe what the user is doing and hands the session module a
//! [Sample] per tick.

pub mod idle;

use std::time::Duration;

use anyhow::Result;
use idle::IdleGate;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    daemon::{session::Sample, storage::registry::RegistryWatcher},
    probe::{ActivityProbe, resolve_foreground},
    utils::clock::Clock,
};

pub struct SamplerModule {
    next: mpsc::Sender<Sample>,
    probe: Box<dyn ActivityProbe>,
    shutdown: CancellationToken,
    idle_gate: IdleGate,
    programs: RegistryWatcher,
    poll_interval: Duration,
    time_provider: Box<dyn Clock>,
}

impl SamplerModule {
    pub fn new(
        next: mpsc::Sender<Sample>,
        probe: Box<dyn ActivityProbe>,
        shutdown: CancellationToken,
        idle_gate: IdleGate,
        programs: RegistryWatcher,
        poll_interval: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            probe,
            shutdown,
            idle_gate,
            programs,
            poll_interval,
            time_provider,
        }
    }

    /// A tick never fails as a whole. A probe that errors out is read as
    /// "no foreground program this tick", and idleness is checked first so
    /// an idle tick skips foreground resolution entirely.
    fn take_sample(&mut self) -> Sample {
        let at = self.time_provider.time();

        let idle_ms = match self.probe.idle_millis() {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to query idle time, assuming active {e:?}");
                0
            }
        };
        if self.idle_gate.is_idle(idle_ms) {
            return Sample {
                at,
                idle: true,
                foreground: None,
            };
        }

        let programs = self.programs.current();
        let foreground = match resolve_foreground(
            self.probe.as_mut(),
            programs.iter().map(|p| p.process_name.as_str()),
        ) {
            Ok(matched) => matched.and_then(|name| {
                programs
                    .iter()
                    .find(|p| p.process_name == name)
                    .map(|p| p.id)
            }),
            Err(e) => {
                warn!("Failed to resolve foreground window {e:?}");
                None
            }
        };

        Sample {
            at,
            idle: false,
            foreground,
        }
    }

    /// Executes the polling event loop.
    pub async fn run(mut self) -> Result<()> {
        let mut tick_point = self.time_provider.instant();
        loop {
            tick_point += self.poll_interval;

            let sample = self.take_sample();
            debug!("Sending sample {:?}", sample);
            self.next
                .send(sample)
                .await
                .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;

            tokio::select! {
                // Cancelation stops the event loop. That also drops the
                // sender channel and consequently stops the session module.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(tick_point) => ()
            }
        }
    }
}
