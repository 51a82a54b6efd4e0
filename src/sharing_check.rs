//! Sharing-mode conflict resolution performed at open time.

use crate::access_mask::NtAccessMask;
use crate::access_token::AccessToken;
use crate::error::{SmbError, SmbResult};
use crate::ids::UniqueId;
use crate::sharing::SharingMode;

/// One currently-open request against a unique id, as seen by the sharing
/// check.
#[derive(Debug, Copy, Clone)]
pub struct OpenRequestView {
    pub access: NtAccessMask,
    pub sharing: SharingMode,
}

/// Checks a new `(access, sharing)` request against every already-open
/// request for the same unique id and either issues an [`AccessToken`] or
/// reports `FileSharing`.
///
/// A conflict exists when the new request wants an access the existing
/// opener doesn't share, or the existing opener wants an access the new
/// request doesn't share — sharing is checked symmetrically against both
/// read and write data access.
pub fn check_sharing(
    unique_id: UniqueId,
    existing: &[OpenRequestView],
    new_access: NtAccessMask,
    new_sharing: SharingMode,
    attributes_only: bool,
) -> SmbResult<AccessToken> {
    for open in existing {
        if conflicts(open.access, open.sharing, new_access, new_sharing) {
            return Err(SmbError::FileSharing);
        }
    }
    Ok(AccessToken::issue(unique_id, new_access, new_sharing, attributes_only))
}

fn wants_read(access: NtAccessMask) -> bool {
    access.contains(NtAccessMask::READ)
}

fn wants_write(access: NtAccessMask) -> bool {
    access.contains(NtAccessMask::WRITE) || access.contains(NtAccessMask::APPEND)
}

fn conflicts(
    existing_access: NtAccessMask,
    existing_sharing: SharingMode,
    new_access: NtAccessMask,
    new_sharing: SharingMode,
) -> bool {
    let existing_blocks_new = (wants_read(new_access) && !existing_sharing.allows(SharingMode::READ))
        || (wants_write(new_access) && !existing_sharing.allows(SharingMode::WRITE));

    let new_blocks_existing = (wants_read(existing_access) && !new_sharing.allows(SharingMode::READ))
        || (wants_write(existing_access) && !new_sharing.allows(SharingMode::WRITE));

    existing_blocks_new || new_blocks_existing
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access(bits: u32) -> NtAccessMask {
        NtAccessMask::from_bits(bits)
    }

    fn sharing(bits: u8) -> SharingMode {
        SharingMode::from_bits(bits)
    }

    #[test]
    fn write_with_no_sharing_blocks_a_concurrent_read() {
        let existing = [OpenRequestView { access: access(NtAccessMask::WRITE), sharing: sharing(SharingMode::NONE) }];
        let result = check_sharing(
            UniqueId(1),
            &existing,
            access(NtAccessMask::READ),
            sharing(SharingMode::READ_WRITE),
            false,
        );
        assert_eq!(result.err(), Some(SmbError::FileSharing));
    }

    #[test]
    fn read_with_read_sharing_allows_a_concurrent_read() {
        let existing =
            [OpenRequestView { access: access(NtAccessMask::READ), sharing: sharing(SharingMode::READ) }];
        let result =
            check_sharing(UniqueId(1), &existing, access(NtAccessMask::READ), sharing(SharingMode::READ), false);
        assert!(result.is_ok());
    }

    #[test]
    fn closing_the_blocking_open_lets_the_retry_succeed() {
        // Scenario 3: close(A) removes it from the "existing" view entirely.
        let existing: [OpenRequestView; 0] = [];
        let result = check_sharing(
            UniqueId(1),
            &existing,
            access(NtAccessMask::READ),
            sharing(SharingMode::READ_WRITE),
            false,
        );
        assert!(result.is_ok());
    }
}
