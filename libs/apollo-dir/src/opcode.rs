//! The DIR opcode space: 2-byte step opcodes from `0x2A` to `0x5C`, one per
//! local directory operation. `op_half = opcode >> 1` indexes the
//! per-opcode version floor below.

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[repr(u16)]
pub enum Opcode {
    Add = 0x2A,
    AddHardLink = 0x2C,
    Delete = 0x2E,
    DropHardLink = 0x30,
    Rename = 0x32,
    CreateDir = 0x34,
    DeleteDir = 0x36,
    ReadLink = 0x38,
    DropLink = 0x3A,
    AddLink = 0x3C,
    ReadLinkExt = 0x3E,
    CreateDirExt = 0x40,
    DirRead = 0x42,
    GetEntry = 0x44,
    GetNext = 0x46,
    FixDir = 0x48,
    SetAcl = 0x4A,
    SetDefaultAcl = 0x4C,
    GetDefaultAcl = 0x4E,
    ValidateName = 0x50,
    SetProt = 0x52,
    SetProtExt = 0x54,
    GetProt = 0x56,
    Resolve = 0x58,
    Mount = 0x5A,
    DropMount = 0x5C,
}

pub const CURRENT_VERSION: u16 = 3;

/// Per-opcode entry of the dispatch table: the minimum wire version a
/// remote peer must report handling this opcode at, and how many bytes
/// past the fixed status header a successful response carries. Both
/// fields are read off the offsets the original's per-opcode switch
/// writes into (`do_op.c`); response sizes below are the byte budget
/// implied by the furthest offset each case writes to, not a field-by-
/// field reconstruction of the response layout.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct OpcodeInfo {
    pub min_version: u16,
    pub resp_extra_len: u16,
}

/// Indexed in the same order as [`Opcode::ALL`]; look up through
/// [`Opcode::info`] rather than indexing this directly.
const OPCODE_INFO: [OpcodeInfo; 26] = [
    OpcodeInfo { min_version: 1, resp_extra_len: 0 },    // Add
    OpcodeInfo { min_version: 1, resp_extra_len: 0 },    // AddHardLink
    OpcodeInfo { min_version: 1, resp_extra_len: 0 },    // Delete
    OpcodeInfo { min_version: 1, resp_extra_len: 0 },    // DropHardLink
    OpcodeInfo { min_version: 1, resp_extra_len: 0 },    // Rename
    OpcodeInfo { min_version: 1, resp_extra_len: 0 },    // CreateDir
    OpcodeInfo { min_version: 1, resp_extra_len: 0 },    // DeleteDir
    OpcodeInfo { min_version: 1, resp_extra_len: 0 },    // ReadLink
    OpcodeInfo { min_version: 1, resp_extra_len: 0 },    // DropLink
    OpcodeInfo { min_version: 1, resp_extra_len: 0 },    // AddLink
    OpcodeInfo { min_version: 1, resp_extra_len: 0x0C }, // ReadLinkExt
    OpcodeInfo { min_version: 1, resp_extra_len: 0x04 }, // CreateDirExt
    OpcodeInfo { min_version: 1, resp_extra_len: 0x400 }, // DirRead
    OpcodeInfo { min_version: 1, resp_extra_len: 0x20 }, // GetEntry
    OpcodeInfo { min_version: 1, resp_extra_len: 0x20 }, // GetNext
    OpcodeInfo { min_version: 1, resp_extra_len: 0 },    // FixDir
    OpcodeInfo { min_version: 1, resp_extra_len: 0 },    // SetAcl
    OpcodeInfo { min_version: 1, resp_extra_len: 0 },    // SetDefaultAcl
    OpcodeInfo { min_version: 1, resp_extra_len: 0x08 }, // GetDefaultAcl
    OpcodeInfo { min_version: 1, resp_extra_len: 0 },    // ValidateName
    OpcodeInfo { min_version: 1, resp_extra_len: 0 },    // SetProt
    OpcodeInfo { min_version: 1, resp_extra_len: 0 },    // SetProtExt
    OpcodeInfo { min_version: 1, resp_extra_len: 0x28 }, // GetProt
    OpcodeInfo { min_version: 2, resp_extra_len: 0x20 }, // Resolve
    OpcodeInfo { min_version: 1, resp_extra_len: 0 },    // Mount
    OpcodeInfo { min_version: 1, resp_extra_len: 0 },    // DropMount
];

impl Opcode {
    pub const ALL: [Opcode; 26] = [
        Opcode::Add,
        Opcode::AddHardLink,
        Opcode::Delete,
        Opcode::DropHardLink,
        Opcode::Rename,
        Opcode::CreateDir,
        Opcode::DeleteDir,
        Opcode::ReadLink,
        Opcode::DropLink,
        Opcode::AddLink,
        Opcode::ReadLinkExt,
        Opcode::CreateDirExt,
        Opcode::DirRead,
        Opcode::GetEntry,
        Opcode::GetNext,
        Opcode::FixDir,
        Opcode::SetAcl,
        Opcode::SetDefaultAcl,
        Opcode::GetDefaultAcl,
        Opcode::ValidateName,
        Opcode::SetProt,
        Opcode::SetProtExt,
        Opcode::GetProt,
        Opcode::Resolve,
        Opcode::Mount,
        Opcode::DropMount,
    ];

    pub fn from_u16(v: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|op| *op as u16 == v)
    }

    pub fn op_half(self) -> u16 {
        (self as u16) >> 1
    }

    fn index(self) -> usize {
        Self::ALL.iter().position(|op| *op == self).expect("every Opcode is in ALL")
    }

    /// The parameter-version floor and response-size budget for this
    /// opcode, looked up by position in [`Opcode::ALL`] the same way the
    /// original indexes its two tables by `op_half`.
    pub fn info(self) -> OpcodeInfo {
        OPCODE_INFO[self.index()]
    }

    /// The minimum wire version a remote peer must report handling this
    /// opcode at. `Resolve` was introduced at version 2; everything else
    /// has been present since version 1.
    pub fn min_version(self) -> u16 {
        self.info().min_version
    }
}
