//! Static lookup from syscall numbers to decoding metadata.

use std::collections::BTreeMap;


/// Decoding metadata for a single syscall: its name and the declared type
/// of each argument register it consumes, in ABI order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SyscallInfo {
    pub name: &'static str,
    pub arg_types: Vec<&'static str>,
}

impl SyscallInfo {
    pub fn arg_count(&self) -> usize {
        self.arg_types.len()
    }
}

const TABLE: &str = include_str!("data/syscalls_x86_64.tsv");

/// Process-wide table mapping x86-64 syscall numbers to [`SyscallInfo`].
///
/// Loaded once at program start and only read afterwards. Numbers missing
/// from the table are rendered by callers with a numeric placeholder.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    entries: BTreeMap<u64, SyscallInfo>,
}

impl Catalog {
    /// Parse the embedded table. Columns are `nr`, `name`, and an optional
    /// comma-separated list of argument types.
    pub fn load() -> Self {
        let mut entries = BTreeMap::new();

        for line in TABLE.split_terminator('\n') {
            let mut cols = line.splitn(3, '\t');

            let Some(nr) = cols.next().and_then(|col| col.parse::<u64>().ok()) else {
                continue;
            };
            let Some(name) = cols.next() else {
                continue;
            };
            let arg_types = match cols.next() {
                None | Some("") => Vec::new(),
                Some(types) => types.split(", ").collect(),
            };

            entries.insert(nr, SyscallInfo { name, arg_types });
        }

        // Work around in-band communication in the impl of `rt_sigreturn()`.
        entries.insert(
            -1i64 as u64,
            SyscallInfo { name: "rt_sigreturn", arg_types: Vec::new() },
        );

        Self { entries }
    }

    pub fn get(&self, nr: u64) -> Option<&SyscallInfo> {
        self.entries.get(&nr)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
