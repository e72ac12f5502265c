//! The fixed, frozen column schema for one capture interface.
//!
//! Every directory holds exactly `ColIdxCount` column files: four per-flow
//! attribute columns and the four `Counters` fields written out as columns
//! in their own right, so a query can range-scan bytes/packets without
//! touching the attribute columns at all.

/// Number of column files per directory. Frozen — never renegotiated.
pub const COL_IDX_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Column {
    Sip = 0,
    Dip = 1,
    Dport = 2,
    Proto = 3,
    BytesRcvd = 4,
    BytesSent = 5,
    PacketsRcvd = 6,
    PacketsSent = 7,
}

impl Column {
    pub const ALL: [Column; COL_IDX_COUNT] = [
        Column::Sip,
        Column::Dip,
        Column::Dport,
        Column::Proto,
        Column::BytesRcvd,
        Column::BytesSent,
        Column::PacketsRcvd,
        Column::PacketsSent,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Option<Self> {
        Self::ALL.get(i).copied()
    }

    /// Stable on-disk file stem (the `.gpf` suffix is appended by the caller).
    pub fn file_stem(self) -> &'static str {
        match self {
            Column::Sip => "sip",
            Column::Dip => "dip",
            Column::Dport => "dport",
            Column::Proto => "proto",
            Column::BytesRcvd => "bytes_rcvd",
            Column::BytesSent => "bytes_sent",
            Column::PacketsRcvd => "packets_rcvd",
            Column::PacketsSent => "packets_sent",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.gpf", self.file_stem())
    }
}
