//! Create disposition and the legacy `FileAction` lookup table.

/// The six-valued NT create disposition.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CreateDisposition {
    Supersede,
    Open,
    Create,
    OpenIf,
    Overwrite,
    OverwriteIf,
}

impl CreateDisposition {
    /// `true` for `Supersede`/`Overwrite`/`OverwriteIf`.
    pub fn is_overwrite(self) -> bool {
        matches!(self, CreateDisposition::Supersede | CreateDisposition::Overwrite | CreateDisposition::OverwriteIf)
    }

    /// Converts the legacy Core/LanMan `FileAction` bit combination
    /// (`create | truncate | openIf`, bits 0/1/4 of the two-byte `FileAction`
    /// field) via a fixed six-entry table. Unmatched combinations fall back
    /// to `Open`.
    pub fn from_legacy_action(action: u16) -> Self {
        const CREATE: u16 = 0x10;
        const TRUNCATE: u16 = 0x02;
        const OPEN_IF: u16 = 0x01;

        let create = action & CREATE != 0;
        let truncate = action & TRUNCATE != 0;
        let open_if = action & OPEN_IF != 0;

        match (create, truncate, open_if) {
            (false, false, false) => CreateDisposition::Open,
            (false, true, false) => CreateDisposition::Overwrite,
            (false, true, true) => CreateDisposition::OverwriteIf,
            (true, false, false) => CreateDisposition::Create,
            (true, false, true) => CreateDisposition::OpenIf,
            (true, true, true) => CreateDisposition::Supersede,
            _ => CreateDisposition::Open,
        }
    }
}
