use bitflags::bitflags;

bitflags! {
    /// Access to request for a file and its mapping.
    ///
    /// `WRITE` implies `READ`, and `RESIZE` implies `WRITE`: the composite values carry the bits
    /// of what they imply, so `contains` answers the expected question.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const READ = 0x0001;
        const WRITE = 0x0003;
        /// Private copy-on-write mapping. Writes never reach the file.
        const COPY = 0x0004;
        const EXEC = 0x0008;
        /// Create the file if it does not exist.
        const CREATE = 0x0010;
        /// Set the file length to exactly what the mapping request covers.
        const RESIZE = 0x0023;
        /// Pages can not be accessed at all. Wins over every other protection bit.
        const NO_ACCESS = 0x0040;

        const DEFAULT = Self::WRITE.bits() | Self::CREATE.bits();
        const READ_ONLY = Self::READ.bits();
        const READ_WRITE = Self::WRITE.bits();
        const WRITE_COPY = Self::WRITE.bits() | Self::COPY.bits();
        const READ_EXEC = Self::READ.bits() | Self::EXEC.bits();
    }
}

impl AccessFlags {
    const WRITE_BIT: u32 = 0x0002;
    const RESIZE_BIT: u32 = 0x0020;

    pub fn is_readable(self) -> bool {
        !self.contains(Self::NO_ACCESS) && self.contains(Self::READ)
    }

    pub fn is_writable(self) -> bool {
        !self.contains(Self::NO_ACCESS) && self.bits() & Self::WRITE_BIT != 0
    }

    pub fn is_executable(self) -> bool {
        !self.contains(Self::NO_ACCESS) && self.contains(Self::EXEC)
    }

    /// Whether the file should be opened for writing.
    ///
    /// Unlike [`Self::is_writable`] this ignores `NO_ACCESS`, which only concerns the pages.
    pub fn opens_for_write(self) -> bool {
        self.bits() & Self::WRITE_BIT != 0
    }

    pub fn is_copy(self) -> bool {
        self.contains(Self::COPY)
    }

    /// The file length is forced to the extent of the mapping request.
    pub fn must_resize(self) -> bool {
        self.bits() & Self::RESIZE_BIT != 0
    }

    /// The file may be grown to satisfy a mapping request that reaches past its end.
    pub fn may_grow(self) -> bool {
        self.must_resize() || (self.contains(Self::CREATE) && self.opens_for_write())
    }
}

impl Default for AccessFlags {
    fn default() -> Self {
        AccessFlags::DEFAULT
    }
}

/// A usage hint for the pages of a mapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Advice {
    #[default]
    Normal,
    Random,
    Sequential,
    WillNeed,
    DontNeed,
}

#[test]
fn presets_imply_their_parts() {
    assert!(AccessFlags::DEFAULT.is_readable());
    assert!(AccessFlags::DEFAULT.is_writable());
    assert!(AccessFlags::DEFAULT.may_grow());
    assert!(!AccessFlags::DEFAULT.must_resize());

    assert!(AccessFlags::READ_ONLY.is_readable());
    assert!(!AccessFlags::READ_ONLY.is_writable());
    assert!(!AccessFlags::READ_ONLY.may_grow());

    assert!(AccessFlags::RESIZE.contains(AccessFlags::WRITE));
    assert!(AccessFlags::RESIZE.must_resize());
    assert!(AccessFlags::WRITE_COPY.is_copy());
    assert!(AccessFlags::READ_EXEC.is_executable());

    let none = AccessFlags::READ_WRITE | AccessFlags::NO_ACCESS;
    assert!(!none.is_readable());
    assert!(!none.is_writable());
    assert!(none.opens_for_write());
}
