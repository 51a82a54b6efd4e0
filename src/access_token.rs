//! Sharing-mode check result, issued at open time and released on close.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::error;

use crate::access_mask::NtAccessMask;
use crate::ids::UniqueId;
use crate::sharing::SharingMode;

/// Returned by the sharing-mode check at open time. A never-released token
/// is a programming error and is logged on drop.
pub struct AccessToken {
    pub unique_id: UniqueId,
    pub access: NtAccessMask,
    pub sharing: SharingMode,
    pub attributes_only: bool,
    released: AtomicBool,
}

impl AccessToken {
    pub fn issue(unique_id: UniqueId, access: NtAccessMask, sharing: SharingMode, attributes_only: bool) -> Self {
        AccessToken { unique_id, access, sharing, attributes_only, released: AtomicBool::new(false) }
    }

    pub fn release(&self) {
        self.released.store(true, Ordering::Release);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for AccessToken {
    fn drop(&mut self) {
        if !self.released.load(Ordering::Acquire) {
            error!(unique_id = self.unique_id.0, "access token dropped without being released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_token_does_not_log_on_drop() {
        let token = AccessToken::issue(
            UniqueId(1),
            NtAccessMask::from_bits(NtAccessMask::NT_READ),
            SharingMode::default(),
            false,
        );
        token.release();
        assert!(token.is_released());
    }

    #[test]
    fn unreleased_token_is_observably_unreleased() {
        let token = AccessToken::issue(
            UniqueId(1),
            NtAccessMask::from_bits(NtAccessMask::NT_READ),
            SharingMode::default(),
            false,
        );
        assert!(!token.is_released());
    }
}
