//! The legacy-downgrade protocol and `OLD_FIX_DIR` directory repair.
//!
//! Every encoder calls the new-opcode path first; on
//! `bad_reply_received_from_remote_node` or `naming_bad_directory` it falls
//! back to the paired `OLD_` handler, which speaks the pre-version wire
//! shape through four shared building blocks: leaf-name validation, a
//! locked-directory handle, entry lookup within that lock, and lock
//! release. This crate never models super-mode privilege transitions
//! directly (no such domain exists in this hosted reconstruction), so the
//! "enter/exit super mode" step is a marker call kept for API-shape parity.

use apollo_common::{Status, Uid};

pub const MAX_LEAF_NAME_LEN: usize = 255;
pub const MAX_LINK_TARGET_LEN: usize = 1023;

/// Directory-lock acquisition mode: a raw flag mask, matching the
/// original's packed mode word rather than a richer permission type.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct LockMode(pub u32);

impl LockMode {
    pub const READ: LockMode = LockMode(0x10000);
    pub const WRITE: LockMode = LockMode(0x40000);
    pub const WRITE_MODIFY: LockMode = LockMode(0x40002);
}

/// Retries `new_op`; on a status the legacy protocol recognizes as "this
/// peer doesn't understand the new shape", runs `old_op` instead.
pub fn with_legacy_fallback(
    new_op: impl FnOnce() -> crate::wire::DirResponse,
    old_op: impl FnOnce() -> crate::wire::DirResponse,
) -> crate::wire::DirResponse {
    let response = new_op();
    if response.status == Status::BAD_REPLY_RECEIVED_FROM_REMOTE_NODE || response.status == Status::NAMING_BAD_DIRECTORY {
        old_op()
    } else {
        response
    }
}

/// Validates and case-maps a leaf name. The original's exact case-mapping
/// rule isn't part of the distilled spec; this lower-cases, matching the
/// case-insensitive lookup the rest of this crate assumes.
pub fn validate_leaf_name(name: &[u8]) -> Result<Vec<u8>, Status> {
    if name.is_empty() || name.len() > MAX_LEAF_NAME_LEN {
        return Err(Status::NAMING_INVALID_LEAF);
    }
    Ok(name.iter().map(|b| b.to_ascii_lowercase()).collect())
}

pub fn validate_link_target(target: &[u8]) -> Result<(), Status> {
    if target.is_empty() || target.len() > MAX_LINK_TARGET_LEN {
        return Err(Status::NAMING_INVALID_LINK);
    }
    Ok(())
}

/// A locked directory handle. Held only for the duration of one `OLD_`
/// operation; dropping it releases the lock.
pub struct DirectoryLock<'a> {
    store: &'a dyn DirectoryStore,
    mode: LockMode,
}

impl<'a> DirectoryLock<'a> {
    pub fn acquire(store: &'a dyn DirectoryStore, mode: LockMode) -> Self {
        store.lock(mode);
        DirectoryLock { store, mode }
    }

    pub fn lookup(&self, name: &[u8]) -> Option<DirEntry> {
        self.store.entries().into_iter().find(|e| e.name == name)
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for DirectoryLock<'_> {
    fn drop(&mut self) {
        self.store.unlock();
    }
}

/// Marks the end of a privileged section. A no-op in this hosted
/// reconstruction; kept so `OLD_` handlers read the same shape as the
/// original's lock/unlock-then-exit-super sequence.
pub fn exit_super() {}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DirEntryKind {
    /// An ordinary name -> UID binding.
    Type1,
    /// A symbolic-link entry carrying a target path.
    Type3 { target: Vec<u8> },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirEntry {
    pub name: Vec<u8>,
    pub uid: Uid,
    pub kind: DirEntryKind,
}

/// Abstracts the raw directory page storage `OLD_FIX_DIR` walks and
/// rewrites. A real implementation backs this with mapped netbuf/file
/// pages; tests use a plain in-memory stand-in.
pub trait DirectoryStore: Send + Sync {
    fn lock(&self, mode: LockMode);
    fn unlock(&self);
    /// `None` if the lock could not be acquired (directory inaccessible).
    fn try_lock(&self, mode: LockMode) -> bool;
    fn entries(&self) -> Vec<DirEntry>;
    fn header_version(&self) -> u16;
    fn parent_uid(&self) -> Uid;
    fn owner_acl_uid(&self) -> Uid;
    fn self_uid(&self) -> Uid;
    fn reinit_header(&self, header: DirHeader);
    fn truncate(&self);
    fn replace_entries(&self, entries: Vec<DirEntry>);
}

/// The subset of a directory's header fields the rebuild path preserves
/// verbatim: parent UID, owner ACL UID, and the directory's own UID.
/// Everything else in the header is reinitialized.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct DirHeader {
    pub version: u16,
    pub parent: Uid,
    pub owner_acl: Uid,
    pub self_uid: Uid,
}

impl DirHeader {
    pub fn reinit_preserving(parent: Uid, owner_acl: Uid, self_uid: Uid) -> DirHeader {
        DirHeader { version: 2, parent, owner_acl, self_uid }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum FixDirOutcome {
    Repaired,
    ReinitializedInPlace,
}

/// `OLD_FIX_DIR`: repairs a directory by whichever of the two paths the
/// lock attempt selects.
///
/// - **Repairable** (lock acquired): copies every entry elsewhere, clears
///   the directory, reinitializes its header, and replays the entries back
///   in (type-1 as plain adds, type-3 re-reading their target first).
/// - **Corrupted** (lock not acquired): if the header version is below 2,
///   reinitializes the header in place and restores the parent UID from
///   the directory's own recorded attributes; otherwise gives up with
///   `naming_bad_directory`.
pub fn old_fix_dir(store: &dyn DirectoryStore) -> Result<FixDirOutcome, Status> {
    if store.try_lock(LockMode::WRITE_MODIFY) {
        let entries = store.entries();
        let parent = store.parent_uid();
        let owner_acl = store.owner_acl_uid();
        let self_uid = store.self_uid();
        store.truncate();
        store.reinit_header(DirHeader::reinit_preserving(parent, owner_acl, self_uid));

        let mut replayed = Vec::with_capacity(entries.len());
        for entry in entries {
            match &entry.kind {
                DirEntryKind::Type1 => replayed.push(entry),
                DirEntryKind::Type3 { target } => {
                    validate_link_target(target).map_err(|e| {
                        store.unlock();
                        e
                    })?;
                    replayed.push(entry);
                }
            }
        }
        store.replace_entries(replayed);
        store.unlock();
        exit_super();
        Ok(FixDirOutcome::Repaired)
    } else {
        let version = store.header_version();
        if version < 2 {
            let parent = store.parent_uid();
            let owner_acl = store.owner_acl_uid();
            let self_uid = store.self_uid();
            store.reinit_header(DirHeader::reinit_preserving(parent, owner_acl, self_uid));
            exit_super();
            Ok(FixDirOutcome::ReinitializedInPlace)
        } else {
            Err(Status::NAMING_BAD_DIRECTORY)
        }
    }
}
