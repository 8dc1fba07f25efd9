//! Snapshot file handling and write-through persistence.
//!
//! [`SnapshotWriter`] owns a channel of [`SurfaceUpdateEvent`]s. The store's
//! update listener feeds the channel, and a background thread folds events
//! into its own copy of the surface and rewrites the snapshot file once per
//! batch of queued events.

use super::point::{StrikeKey, SurfaceUpdateEvent, VolatilityPoint};
use super::snapshot::{SurfaceSnapshot, SurfaceSnapshotPackage};
use super::store::{UpdateListener, VolatilitySurfaceStore};
use crate::error::SurfaceError;
use crate::utils::current_time_millis;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use tracing::{error, info, trace};

/// A checksum-protected snapshot on disk.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    /// Snapshot stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the snapshot.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and validates the snapshot. A missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<SurfaceSnapshot>, SurfaceError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        let snapshot = SurfaceSnapshotPackage::from_json(&data)?.into_snapshot()?;
        Ok(Some(snapshot))
    }

    /// Loads the snapshot into `store`, returning how many points were restored.
    pub fn restore_into(&self, store: &VolatilitySurfaceStore) -> Result<usize, SurfaceError> {
        match self.load()? {
            Some(snapshot) => store.restore_from_snapshot(snapshot),
            None => {
                info!("No surface snapshot at {}", self.path.display());
                Ok(0)
            }
        }
    }

    /// Writes the package next to the target and renames it into place so
    /// readers never observe a partial file.
    pub fn write(&self, package: &SurfaceSnapshotPackage) -> Result<(), SurfaceError> {
        let json = package.to_json()?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, json)?;
        fs::rename(&staging, &self.path)?;
        trace!(
            "wrote {} surface points to {}",
            package.snapshot.points.len(),
            self.path.display()
        );
        Ok(())
    }
}

type PointKey = (String, NaiveDate, StrikeKey);

/// Routes store updates to a background thread that persists them.
pub struct SnapshotWriter {
    /// Sender cloned into every listener
    sender: mpsc::Sender<SurfaceUpdateEvent>,
    /// Receiver (taken when the writer starts)
    receiver: Option<mpsc::Receiver<SurfaceUpdateEvent>>,
}

impl SnapshotWriter {
    /// Create a writer with an empty event channel.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver: Some(receiver),
        }
    }

    /// Listener to install on a [`VolatilitySurfaceStore`].
    pub fn listener(&self) -> UpdateListener {
        let sender = self.sender.clone();
        Arc::new(move |event: &SurfaceUpdateEvent| {
            if let Err(e) = sender.send(event.clone()) {
                error!(
                    "Failed to queue surface update for {}: {}",
                    event.point.symbol, e
                );
            }
        })
    }

    /// Start the writer thread, seeded with the points already in the store.
    ///
    /// The thread exits once this writer and every listener it handed out
    /// have been dropped, after persisting whatever was still queued.
    pub fn start(
        &mut self,
        file: SnapshotFile,
        seed: Vec<VolatilityPoint>,
    ) -> Result<thread::JoinHandle<()>, SurfaceError> {
        let receiver = self.receiver.take().ok_or_else(|| {
            SurfaceError::invalid_input("snapshot writer already started")
        })?;

        let mut surface: BTreeMap<PointKey, VolatilityPoint> = BTreeMap::new();
        for point in seed {
            Self::apply(&mut surface, point);
        }

        Ok(thread::spawn(move || {
            info!("Snapshot writer started for {}", file.path().display());

            while let Ok(event) = receiver.recv() {
                Self::apply(&mut surface, event.point);
                let mut batch = 1;
                while let Ok(event) = receiver.try_recv() {
                    Self::apply(&mut surface, event.point);
                    batch += 1;
                }
                trace!("persisting batch of {} surface updates", batch);
                Self::persist(&file, &surface);
            }

            info!("Snapshot writer stopped");
        }))
    }

    fn apply(surface: &mut BTreeMap<PointKey, VolatilityPoint>, point: VolatilityPoint) {
        match StrikeKey::new(point.strike) {
            Ok(key) => {
                surface.insert((point.symbol.clone(), point.expiry, key), point);
            }
            Err(e) => error!("Dropping surface update with invalid strike: {}", e),
        }
    }

    fn persist(file: &SnapshotFile, surface: &BTreeMap<PointKey, VolatilityPoint>) {
        let snapshot = SurfaceSnapshot {
            timestamp: current_time_millis(),
            points: surface.values().cloned().collect(),
        };
        let result = SurfaceSnapshotPackage::new(snapshot).and_then(|package| file.write(&package));
        if let Err(e) = result {
            error!(
                "Failed to write surface snapshot to {}: {}",
                file.path().display(),
                e
            );
        }
    }
}

impl Default for SnapshotWriter {
    fn default() -> Self {
        Self::new()
    }
}
