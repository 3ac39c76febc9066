//! The Linux kernel's `KERN_*` log level markers.
//!
//! In the kernel, `KERN_WARNING` and friends expand to a two byte string: the ASCII SOH character
//! followed by a single level character. These get prepended to the format string passed to
//! `printk`. Only the level character is looked up here.

/// A kernel log level, as encoded in the second byte of a `KERN_*` marker.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum KernLogLevel {
    Emerg,
    Alert,
    Crit,
    Err,
    Warning,
    Notice,
    Info,
    Debug,
    /// Continuation of a previous line, rather than an actual level
    Cont,
}

impl KernLogLevel {
    /// All levels, in order of their encoding byte
    pub const ALL: [KernLogLevel; 9] = [
        KernLogLevel::Emerg,
        KernLogLevel::Alert,
        KernLogLevel::Crit,
        KernLogLevel::Err,
        KernLogLevel::Warning,
        KernLogLevel::Notice,
        KernLogLevel::Info,
        KernLogLevel::Debug,
        KernLogLevel::Cont,
    ];

    /// Decode the byte following SOH
    pub fn from_level_byte(b: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.level_byte() == b)
    }

    /// The byte that follows SOH for this level
    pub fn level_byte(self) -> u8 {
        use KernLogLevel::*;
        match self {
            Emerg => b'0',
            Alert => b'1',
            Crit => b'2',
            Err => b'3',
            Warning => b'4',
            Notice => b'5',
            Info => b'6',
            Debug => b'7',
            Cont => b'c',
        }
    }

    /// The name of the macro in the kernel sources
    pub fn macro_name(self) -> &'static str {
        use KernLogLevel::*;
        match self {
            Emerg => "KERN_EMERG",
            Alert => "KERN_ALERT",
            Crit => "KERN_CRIT",
            Err => "KERN_ERR",
            Warning => "KERN_WARNING",
            Notice => "KERN_NOTICE",
            Info => "KERN_INFO",
            Debug => "KERN_DEBUG",
            Cont => "KERN_CONT",
        }
    }
}

impl std::fmt::Display for KernLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.macro_name())
    }
}

/// Map the level byte of a `KERN_*` marker back to the macro's name. `None` if unknown.
pub fn log_level_name_from_byte(b: u8) -> Option<&'static str> {
    KernLogLevel::from_level_byte(b).map(KernLogLevel::macro_name)
}
