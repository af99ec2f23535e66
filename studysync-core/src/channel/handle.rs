use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};

use super::actor::Command;
use super::{ChannelKind, ChannelSnapshot, ChannelState};
use crate::error::SyncError;
use crate::session::pending::Reply;
use crate::session::{pointer_for_key, Patch};

/// Access to one channel's session document.
///
/// Reads are served from the local replica and never contact the
/// coordinator; each returns an independent copy. Mutations build JSON-Patch
/// operations and resolve once the coordinator acknowledged, rejected or
/// ignored them.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    kind: ChannelKind,
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<ChannelSnapshot>,
}

impl SessionHandle {
    pub(crate) fn new(
        kind: ChannelKind,
        commands: mpsc::UnboundedSender<Command>,
        snapshot: watch::Receiver<ChannelSnapshot>,
    ) -> Self {
        Self {
            kind,
            commands,
            snapshot,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Current snapshot of the channel.
    pub fn snapshot(&self) -> ChannelSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified whenever the channel publishes a new snapshot.
    pub fn subscribe(&self) -> watch::Receiver<ChannelSnapshot> {
        self.snapshot.clone()
    }

    pub fn state(&self) -> ChannelState {
        self.snapshot.borrow().state
    }

    pub fn version(&self) -> Option<u64> {
        self.snapshot.borrow().version
    }

    /// Copy of a first-level field.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.snapshot.borrow().document.get(name)
    }

    pub fn get_all(&self) -> Value {
        self.snapshot.borrow().document.get_all()
    }

    /// Copy of the value at a JSON pointer.
    pub fn find(&self, path: &str) -> Result<Option<Value>, SyncError> {
        self.snapshot.borrow().document.find(path)
    }

    pub fn test(&self, path: &str, value: &Value) -> Result<bool, SyncError> {
        self.snapshot.borrow().document.test(path, value)
    }

    pub fn defined(&self, path: &str) -> Result<bool, SyncError> {
        self.snapshot.borrow().document.defined(path)
    }

    pub async fn add(&self, path: &str, value: Value) -> Result<(), SyncError> {
        self.send_patches(vec![Patch::add(path, value)]).await
    }

    /// Like [`add`](Self::add) but addresses a first-level field by name.
    pub async fn set(&self, name: &str, value: Value) -> Result<(), SyncError> {
        self.add(&pointer_for_key(name), value).await
    }

    /// Replaces the whole document.
    pub async fn set_all(&self, value: Value) -> Result<(), SyncError> {
        self.replace("", value).await
    }

    pub async fn remove(&self, path: &str) -> Result<(), SyncError> {
        self.send_patches(vec![Patch::remove(path)]).await
    }

    /// Clears the whole document for every participant.
    pub async fn clear(&self) -> Result<(), SyncError> {
        self.remove("/").await
    }

    pub async fn replace(&self, path: &str, value: Value) -> Result<(), SyncError> {
        self.send_patches(vec![Patch::replace(path, value)]).await
    }

    pub async fn copy(&self, from: &str, path: &str) -> Result<(), SyncError> {
        self.send_patches(vec![Patch::copy(from, path)]).await
    }

    pub async fn move_to(&self, from: &str, path: &str) -> Result<(), SyncError> {
        self.send_patches(vec![Patch::move_from(from, path)]).await
    }

    /// Sends a patch list as one mutation.
    ///
    /// Fails without any I/O if the channel is not open or another
    /// mutation is still waiting for its answer.
    pub async fn send_patches(&self, patches: Vec<Patch>) -> Result<(), SyncError> {
        self.request(|reply| Command::SendPatches { patches, reply })
            .await
    }

    /// Enables or disables versioning for subsequent sends.
    pub fn set_versioning(&self, enabled: bool) {
        let _ = self.commands.send(Command::SetVersioning(enabled));
    }

    pub(crate) async fn request(
        &self,
        make: impl FnOnce(Reply<()>) -> Command,
    ) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| self.stopped())?;
        rx.await.map_err(|_| self.stopped())?
    }

    pub(crate) fn command(&self, command: Command) -> Result<(), SyncError> {
        self.commands.send(command).map_err(|_| self.stopped())
    }

    fn stopped(&self) -> SyncError {
        SyncError::Connection(format!("{} channel stopped", self.kind.title()))
    }
}
