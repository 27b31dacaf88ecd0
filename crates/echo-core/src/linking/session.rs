use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::LinkError;

/// Holds the phone of the one linking session allowed in flight.
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionSlot {
    active: Arc<Mutex<Option<String>>>,
}

impl SessionSlot {
    pub(crate) fn acquire(&self, phone: &str) -> Result<SessionGuard, LinkError> {
        let mut active = self.lock();
        if let Some(current) = active.as_ref() {
            return Err(LinkError::SessionActive {
                phone: current.clone(),
            });
        }
        *active = Some(phone.to_owned());
        Ok(SessionGuard { slot: self.clone() })
    }

    pub(crate) fn active(&self) -> Option<String> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Frees the slot when the session ends, whichever way it ends.
#[derive(Debug)]
pub(crate) struct SessionGuard {
    slot: SessionSlot,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}
