use log::{debug, error, info};
use tokio::time;

use super::{Dispatcher, RunOutcome};
use crate::request::{CollectionRequest, LocalConfig};
use crate::sink::{Payload, RecordKey};

impl Dispatcher {
    /// Snapshot loop over this host's proc filesystem
    pub(super) async fn run_local(&self, request: &CollectionRequest, local: &LocalConfig) -> RunOutcome {
        info!("Collecting data from local server");

        let mut records = 0;
        loop {
            records += self.collect_once(request, local).await;

            if local.is_bounded() {
                return RunOutcome::Completed { records };
            }

            // The pause starts after this iteration's submissions return
            if self.shutdown.guard(time::sleep(local.interval)).await.is_none() {
                info!("Local collection stopped after {} records", records);
                return RunOutcome::Interrupted { records };
            }
        }
    }

    /// One iteration: process state, then machine state.
    ///
    /// A snapshot that fails is logged and left out; the other one is
    /// still sent.
    async fn collect_once(&self, request: &CollectionRequest, local: &LocalConfig) -> u64 {
        let processes = self
            .provider
            .snapshot_processes(&local.proc_root, local.agent_url.as_deref())
            .await;
        let machine = self.provider.snapshot_machine(&local.proc_root).await;

        let mut sent = 0;
        match processes {
            Ok(info) => {
                debug!("Sending {} process entries", info.procs.len());
                self.sink
                    .submit(request.send_request(RecordKey::ProcessInfo, Payload::Process(info)))
                    .await;
                sent += 1;
            }
            Err(e) => error!("Error collecting process info from {}: {}", self.provider.name(), e),
        }

        match machine {
            Ok(info) => {
                self.sink
                    .submit(request.send_request(RecordKey::MachineInfo, Payload::Machine(info)))
                    .await;
                sent += 1;
            }
            Err(e) => error!("Error collecting machine info from {}: {}", self.provider.name(), e),
        }

        sent
    }
}
