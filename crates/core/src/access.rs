//! Owner and keeper permissions.

use alloy::primitives::Address;
use std::collections::HashMap;

use crate::error::SliceError;

/// Owner with two-step handoff plus an explicit keeper set.
#[derive(Debug, Clone)]
pub struct AccessControl {
    owner: Address,
    pending_owner: Option<Address>,
    keepers: HashMap<Address, bool>,
}

impl AccessControl {
    /// Create access control owned by `owner` with no keepers.
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            pending_owner: None,
            keepers: HashMap::new(),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn pending_owner(&self) -> Option<Address> {
        self.pending_owner
    }

    /// Whether `identity` is an explicitly enabled keeper.
    pub fn is_keeper(&self, identity: &Address) -> bool {
        self.keepers.get(identity).copied().unwrap_or(false)
    }

    /// May `caller` trigger a slice? The owner always may.
    pub fn is_authorized(&self, caller: &Address) -> bool {
        *caller == self.owner || self.is_keeper(caller)
    }

    /// Fail with `Unauthorized` unless `caller` is the owner.
    pub fn ensure_owner(&self, caller: &Address) -> Result<(), SliceError> {
        if *caller == self.owner {
            Ok(())
        } else {
            Err(SliceError::Unauthorized(*caller))
        }
    }

    /// Enable or disable a keeper. Idempotent.
    pub fn set_keeper(
        &mut self,
        caller: &Address,
        identity: Address,
        enabled: bool,
    ) -> Result<(), SliceError> {
        self.ensure_owner(caller)?;
        self.keepers.insert(identity, enabled);
        Ok(())
    }

    /// Start handing ownership to `new_owner`. Overwrites any pending handoff.
    pub fn transfer_ownership(
        &mut self,
        caller: &Address,
        new_owner: Address,
    ) -> Result<(), SliceError> {
        self.ensure_owner(caller)?;
        self.pending_owner = Some(new_owner);
        Ok(())
    }

    /// Complete a handoff. Only the pending owner may call this.
    /// Returns the previous owner.
    pub fn accept_ownership(&mut self, caller: &Address) -> Result<Address, SliceError> {
        match self.pending_owner {
            Some(pending) if pending == *caller => {
                let previous = std::mem::replace(&mut self.owner, pending);
                self.pending_owner = None;
                Ok(previous)
            }
            _ => Err(SliceError::Unauthorized(*caller)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn test_owner_is_implicitly_authorized() {
        let access = AccessControl::new(addr(1));
        assert!(access.is_authorized(&addr(1)));
        assert!(!access.is_keeper(&addr(1)));
        assert!(!access.is_authorized(&addr(2)));
    }

    #[test]
    fn test_set_keeper() {
        let mut access = AccessControl::new(addr(1));
        access.set_keeper(&addr(1), addr(2), true).unwrap();
        assert!(access.is_authorized(&addr(2)));

        // Idempotent
        access.set_keeper(&addr(1), addr(2), true).unwrap();
        assert!(access.is_keeper(&addr(2)));

        access.set_keeper(&addr(1), addr(2), false).unwrap();
        assert!(!access.is_authorized(&addr(2)));

        let err = access.set_keeper(&addr(2), addr(3), true).unwrap_err();
        assert!(matches!(err, SliceError::Unauthorized(a) if a == addr(2)));
    }

    #[test]
    fn test_two_step_ownership() {
        let mut access = AccessControl::new(addr(1));

        assert!(access.transfer_ownership(&addr(2), addr(2)).is_err());

        access.transfer_ownership(&addr(1), addr(2)).unwrap();
        assert_eq!(access.pending_owner(), Some(addr(2)));
        // Still owner until accepted
        assert_eq!(access.owner(), addr(1));

        assert!(access.accept_ownership(&addr(3)).is_err());

        let previous = access.accept_ownership(&addr(2)).unwrap();
        assert_eq!(previous, addr(1));
        assert_eq!(access.owner(), addr(2));
        assert_eq!(access.pending_owner(), None);
        assert!(!access.is_authorized(&addr(1)));

        // Nothing pending any more
        assert!(access.accept_ownership(&addr(2)).is_err());
    }
}
