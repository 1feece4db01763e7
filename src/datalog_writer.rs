use crate::prelude::*;
use crate::channels::ChannelData;
use crate::inverter::poller::CycleOutcome;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Appends every valid status record to a file, one JSON object per line.
#[derive(Debug, Clone)]
pub struct DatalogWriter {
    file: Arc<Mutex<std::fs::File>>,
    path: String,
    records_written: Arc<Mutex<u64>>,
}

impl DatalogWriter {
    pub fn new(path: &str) -> Result<Self> {
        info!("Opening datalog file at {}", path);

        // Ensure the directory exists
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                error!("Failed to open datalog file {}: {}", path, e);
                return Err(e.into());
            }
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)) {
                error!("Failed to set permissions on datalog file {}: {}", path, e);
                return Err(e.into());
            }
        }

        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            path: path.to_string(),
            records_written: Arc::new(Mutex::new(0)),
        })
    }

    pub fn records_written(&self) -> u64 {
        self.records_written.lock().map(|n| *n).unwrap_or(0)
    }

    pub fn write_status(&self, status: &StatusRecord, mode: &ModeRecord, demo: bool) -> Result<()> {
        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

        let line = serde_json::json!({
            "utc_timestamp": timestamp,
            "demo": demo,
            "mode_code": mode.display_code().to_string(),
            "mode_name": mode.name(),
            "status": status,
        });
        let json_string = serde_json::to_string(&line)?;

        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow!("Failed to lock datalog file"))?;
        if let Err(e) = writeln!(file, "{}", json_string).and_then(|_| file.flush()) {
            error!("Failed to write to datalog file {}: {}", self.path, e);
            return Err(e.into());
        }

        let mut records_written = self
            .records_written
            .lock()
            .map_err(|_| anyhow!("Failed to lock records counter"))?;
        *records_written += 1;
        debug!("Total records stored in datalog file: {}", *records_written);

        Ok(())
    }

    /// Writes the store's record after every cycle that left it valid, until
    /// the poller shuts down. `receiver` should be subscribed before the
    /// poller starts so the first cycle isn't missed.
    pub async fn start(
        &self,
        mut receiver: broadcast::Receiver<ChannelData>,
        store: TelemetryStore,
    ) -> Result<()> {
        debug!("datalog writer starting");

        loop {
            match receiver.recv().await {
                Ok(ChannelData::CycleComplete(outcome)) => {
                    let telemetry = store.snapshot();
                    if telemetry.valid {
                        let demo = outcome == CycleOutcome::Demo;
                        if let Err(e) = self.write_status(&telemetry.status, &telemetry.mode, demo) {
                            warn!("datalog write failed: {}", e);
                        }
                    }
                }
                Ok(ChannelData::Shutdown) => break,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("datalog writer lagged, {} cycles not written", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        info!("datalog writer exiting, {} records written", self.records_written());
        Ok(())
    }
}
