//! DIR: the `DIR_$DO_OP` dispatcher. Resolves a directory UID's route
//! hints, tries each in turn (locally or through a remote peer), and falls
//! back to the pre-version wire shape via the legacy downgrade protocol
//! when a peer doesn't understand the current one.

mod dispatch;
mod legacy;
mod opcode;
mod wire;

pub use dispatch::{
    dir_do_op, CallerKind, LocalHandler, RemoteFileSender, MAX_ADDRESS_SPACE_RETRIES,
};
pub use legacy::{
    exit_super, old_fix_dir, validate_leaf_name, validate_link_target, DirEntry, DirEntryKind,
    DirHeader, DirectoryLock, DirectoryStore, FixDirOutcome, LockMode, MAX_LEAF_NAME_LEN,
    MAX_LINK_TARGET_LEN, with_legacy_fallback,
};
pub use opcode::{Opcode, OpcodeInfo, CURRENT_VERSION};
pub use wire::{
    DirRequest, DirResponse, MAX_LEAF_LEN, MAX_LINK_LEN, MAX_REQUEST_LEN, REQUEST_OPCODE_OFFSET,
    REQUEST_PAYLOAD_OFFSET, REQUEST_UID_OFFSET, REQUEST_VERSION_OFFSET, RESPONSE_CONTINUATION_OFFSET,
    RESPONSE_DATA_OFFSET, RESPONSE_LOOP_OFFSET, RESPONSE_STATUS_OFFSET,
};
