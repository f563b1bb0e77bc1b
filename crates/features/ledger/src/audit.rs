/// A blob whose recorded link count disagrees with the entries referencing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMismatch {
    pub blob_uuid: String,
    pub recorded: u64,
    pub live: u64,
}

/// Result of [`Ledger::audit_links`](crate::Ledger::audit_links).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkAudit {
    /// Blobs examined.
    pub checked: usize,
    pub mismatches: Vec<LinkMismatch>,
    /// Blobs with no live reference, by uuid.
    pub orphans: Vec<String>,
}

impl LinkAudit {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}
