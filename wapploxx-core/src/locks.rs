//! Convenience wrappers over the controller operations
//!
//! State cached here (`is_open`, `armed`) is updated optimistically after a
//! successful command and is not re-read from the controller unless asked.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::controller::Controller;
use crate::error::{Error, Result};
use crate::models::{LockDescriptor, PanelStatus, Tristate};
use crate::protocol::{PanelAction, RemoteAccessAction};
use crate::transport::Transport;

/// A smartlock bound to its descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lock {
    #[serde(flatten)]
    descriptor: LockDescriptor,
    is_open: bool,
}

impl Lock {
    pub fn new(descriptor: LockDescriptor) -> Self {
        Self {
            descriptor,
            is_open: false,
        }
    }

    /// Look a lock up by id in the controller's lock list
    pub async fn fetch<T: Transport>(controller: &mut Controller<T>, id: u32) -> Result<Self> {
        controller
            .get_user_smartloxx()
            .await?
            .items
            .into_iter()
            .find(|d| d.id == id)
            .map(Self::new)
            .ok_or(Error::UnknownLock(id))
    }

    pub fn id(&self) -> u32 {
        self.descriptor.id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn disabled(&self) -> bool {
        self.descriptor.disabled
    }

    pub fn descriptor(&self) -> &LockDescriptor {
        &self.descriptor
    }

    /// Last known state; may be stale
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub async fn open<T: Transport>(&mut self, controller: &mut Controller<T>) -> Result<()> {
        controller
            .set_remote_access(self.id(), RemoteAccessAction::Start)
            .await?;
        self.is_open = true;
        Ok(())
    }

    pub async fn close<T: Transport>(&mut self, controller: &mut Controller<T>) -> Result<()> {
        controller
            .set_remote_access(self.id(), RemoteAccessAction::Stop)
            .await?;
        self.is_open = false;
        Ok(())
    }

    /// Seconds until the lock closes by itself, from a fresh panel status
    pub async fn access_time<T: Transport>(&self, controller: &mut Controller<T>) -> Result<Option<u32>> {
        Ok(controller.get_panel_status().await?.remote_access_time(self.id()))
    }

    /// Re-read `is_open` from the panel status
    pub async fn refresh<T: Transport>(&mut self, controller: &mut Controller<T>) -> Result<bool> {
        self.is_open = self.access_time(controller).await?.is_some_and(|secs| secs > 0);
        Ok(self.is_open)
    }
}

/// Failures of a fan-out over several locks. Every lock is attempted.
#[derive(Debug, Error)]
#[error("{} of {attempted} locks failed: {}", .failures.len(), FailedIds(&.failures))]
pub struct FanOutError {
    pub attempted: usize,
    pub failures: Vec<(u32, Error)>,
}

struct FailedIds<'a>(&'a [(u32, Error)]);

impl fmt::Display for FailedIds<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (id, err)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} ({})", id, err)?;
        }
        Ok(())
    }
}

/// All locks visible to the account
#[derive(Debug, Clone, Default, Serialize)]
pub struct Locks {
    locks: Vec<Lock>,
}

impl Locks {
    pub async fn fetch<T: Transport>(controller: &mut Controller<T>) -> Result<Self> {
        let page = controller.get_user_smartloxx().await?;
        Ok(Self::from_descriptors(page.items))
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = LockDescriptor>) -> Self {
        Self {
            locks: descriptors.into_iter().map(Lock::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Lock> {
        self.locks.iter()
    }

    pub fn get(&self, id: u32) -> Option<&Lock> {
        self.locks.iter().find(|l| l.id() == id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Lock> {
        self.locks.iter_mut().find(|l| l.id() == id)
    }

    pub fn find_by_name(&self, name: &str, case_sensitive: bool) -> Option<&Lock> {
        self.locks.iter().find(|l| {
            if case_sensitive {
                l.name() == name
            } else {
                l.name().to_lowercase() == name.to_lowercase()
            }
        })
    }

    /// Open every lock, continuing past failures
    pub async fn open_all<T: Transport>(&mut self, controller: &mut Controller<T>) -> std::result::Result<(), FanOutError> {
        self.fan_out(controller, RemoteAccessAction::Start).await
    }

    /// Close every lock, continuing past failures
    pub async fn close_all<T: Transport>(&mut self, controller: &mut Controller<T>) -> std::result::Result<(), FanOutError> {
        self.fan_out(controller, RemoteAccessAction::Stop).await
    }

    async fn fan_out<T: Transport>(
        &mut self,
        controller: &mut Controller<T>,
        action: RemoteAccessAction,
    ) -> std::result::Result<(), FanOutError> {
        let mut failures = Vec::new();

        for lock in &mut self.locks {
            let outcome = match action {
                RemoteAccessAction::Start => lock.open(controller).await,
                RemoteAccessAction::Stop => lock.close(controller).await,
            };
            if let Err(e) = outcome {
                tracing::warn!(lock_id = lock.id(), error = %e, "lock {:?} failed", action);
                failures.push((lock.id(), e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(FanOutError {
                attempted: self.locks.len(),
                failures,
            })
        }
    }
}

impl<'a> IntoIterator for &'a Locks {
    type Item = &'a Lock;
    type IntoIter = std::slice::Iter<'a, Lock>;

    fn into_iter(self) -> Self::IntoIter {
        self.locks.iter()
    }
}

/// Alarm panel
#[derive(Debug, Clone, Default)]
pub struct Panel {
    armed: Tristate,
}

impl Panel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known arm state; may be stale
    pub fn armed(&self) -> Tristate {
        self.armed
    }

    pub async fn status<T: Transport>(&mut self, controller: &mut Controller<T>) -> Result<PanelStatus> {
        let status = controller.get_panel_status().await?;
        self.armed = status.armed;
        Ok(status)
    }

    pub async fn arm<T: Transport>(&mut self, controller: &mut Controller<T>) -> Result<()> {
        self.control(controller, PanelAction::Arm).await
    }

    pub async fn disarm<T: Transport>(&mut self, controller: &mut Controller<T>) -> Result<()> {
        self.control(controller, PanelAction::Disarm).await
    }

    pub async fn force_disarm<T: Transport>(&mut self, controller: &mut Controller<T>) -> Result<()> {
        self.control(controller, PanelAction::ForceDisarm).await
    }

    async fn control<T: Transport>(&mut self, controller: &mut Controller<T>, action: PanelAction) -> Result<()> {
        controller.set_panel(action).await?;
        self.armed = match action {
            PanelAction::Arm => Tristate::On,
            PanelAction::Disarm | PanelAction::ForceDisarm => Tristate::Off,
        };
        Ok(())
    }
}
