//! Day-directory path layout and the bit-packed stats suffix codec.
//!
//! ```text
//! <root>/<iface>/<YYYY>/<MM>/<daystart_unix>[_<suffix>]/
//! ```
//!
//! The suffix is a one-character width prefix followed by a `-`-separated
//! sequence of seven fields in a fixed order: `num_v4_entries,
//! num_v6_entries, num_drops, bytes_rcvd, bytes_sent, packets_rcvd,
//! packets_sent`. All seven fields share one width `w` (1..8 bytes),
//! determined by the leading-zero byte count of the largest of the seven
//! values, so a quiet directory (small counters) gets a short suffix and a
//! busy one gets up to the 8-byte-per-field ceiling. Each field's low `w`
//! bytes (big-endian) are rendered through a fixed-width-per-chunk,
//! base64-style alphabet. Worst case (`w == 8`) is `1 + 7*12 + 6 == 91`
//! bytes, safely under the 96-byte upper bound this format documents.
//!
//! The alphabet avoids `-` (the field separator) and `/` (the path
//! separator): `A-Z`, `a-z`, `0-9`, `+`, `_`.

use std::path::{Path, PathBuf};

use chrono::{Datelike, TimeZone, Utc};

use crate::error::Error;
use crate::metadata::{Counters, Stats, TrafficTotals};

const SECONDS_PER_DAY: i64 = 86_400;

/// Floor `ts` to the start of its UTC calendar day.
pub fn day_start(ts: i64) -> i64 {
    ts.div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY
}

/// Build `<root>/<iface>/<YYYY>/<MM>/<daystart>[_<suffix>]`.
pub fn dir_path(root: &Path, iface: &str, ts: i64, suffix: Option<&str>) -> PathBuf {
    let daystart = day_start(ts);
    let dt = Utc.timestamp_opt(daystart, 0).single().expect("day_start produces a valid timestamp");
    let mut name = daystart.to_string();
    if let Some(suffix) = suffix {
        name.push('_');
        name.push_str(suffix);
    }
    root.join(iface)
        .join(format!("{:04}", dt.year()))
        .join(format!("{:02}", dt.month()))
        .join(name)
}

/// Parse the month directory (`<root>/<iface>/<YYYY>/<MM>`) for `ts`.
pub fn month_dir(root: &Path, iface: &str, ts: i64) -> PathBuf {
    let daystart = day_start(ts);
    let dt = Utc.timestamp_opt(daystart, 0).single().expect("day_start produces a valid timestamp");
    root.join(iface).join(format!("{:04}", dt.year())).join(format!("{:02}", dt.month()))
}

/// Parse a day-directory's basename back into its `daystart` timestamp.
pub fn parse_dir_name(name: &str) -> Result<i64, Error> {
    let ts_part = name.split('_').next().unwrap_or(name);
    ts_part.parse::<i64>().map_err(|_| Error::InvalidDirName(name.to_string()))
}

/// Binary-search the lexicographically sorted listing of a month directory
/// for the first entry named exactly `<daystart>` or prefixed `<daystart>_`.
/// `entries` must already be sorted lexicographically (as `std::fs::read_dir`
/// entries are NOT guaranteed to be, callers must sort first).
pub fn find_day_dir_by_prefix<'a>(entries: &'a [String], daystart: i64) -> Option<&'a str> {
    let prefix = daystart.to_string();
    let idx = entries.partition_point(|e| e.as_str() < prefix.as_str());
    let candidate = entries.get(idx)?;
    if candidate == &prefix || candidate.strip_prefix(&prefix).map(|rest| rest.starts_with('_')).unwrap_or(false) {
        Some(candidate.as_str())
    } else {
        None
    }
}

// ---- suffix codec ---------------------------------------------------------

const MAX_SUFFIX_LEN: usize = 96;
const NUM_FIELDS: usize = 7;

const B64_ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+_";

fn b64_index(c: u8) -> Result<u32, Error> {
    B64_ALPHABET
        .iter()
        .position(|&a| a == c)
        .map(|i| i as u32)
        .ok_or_else(|| Error::InvalidDirName((c as char).to_string()))
}

/// Minimum number of bytes needed to hold `value`, 1..=8 (zero still takes
/// one byte — there is no zero-width field).
fn min_bytes(value: u64) -> usize {
    if value == 0 {
        1
    } else {
        8 - (value.leading_zeros() as usize / 8)
    }
}

/// Encode `value`'s low `width` big-endian bytes as a base64-style string.
fn encode_field(value: u64, width: usize) -> String {
    let full = value.to_be_bytes();
    let bytes = &full[8 - width..];
    let mut out = String::with_capacity(((width + 2) / 3) * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = chunk.get(1).copied().unwrap_or(0) as u32;
        let b2 = chunk.get(2).copied().unwrap_or(0) as u32;
        let n = (b0 << 16) | (b1 << 8) | b2;
        let chars = [
            B64_ALPHABET[(n >> 18 & 0x3f) as usize],
            B64_ALPHABET[(n >> 12 & 0x3f) as usize],
            B64_ALPHABET[(n >> 6 & 0x3f) as usize],
            B64_ALPHABET[(n & 0x3f) as usize],
        ];
        match chunk.len() {
            3 => out.push_str(std::str::from_utf8(&chars).unwrap()),
            2 => {
                out.push(chars[0] as char);
                out.push(chars[1] as char);
                out.push(chars[2] as char);
                out.push('=');
            }
            1 => {
                out.push(chars[0] as char);
                out.push(chars[1] as char);
                out.push('=');
                out.push('=');
            }
            _ => unreachable!(),
        }
    }
    out
}

/// Decode a `width`-byte field (rendered at `ceil(width/3)*4` characters,
/// `=`-padded to a multiple of 4) back into its `u64`.
fn decode_field(field: &str, width: usize) -> Result<u64, Error> {
    let expected_len = ((width + 2) / 3) * 4;
    let bytes = field.as_bytes();
    if bytes.len() != expected_len {
        return Err(Error::InvalidDirName(field.to_string()));
    }
    let mut decoded = Vec::with_capacity(width);
    for group in bytes.chunks(4) {
        let pad3 = group[3] == b'=';
        let pad2 = group[2] == b'=';
        if pad2 && !pad3 {
            return Err(Error::InvalidDirName(field.to_string()));
        }
        let c0 = b64_index(group[0])?;
        let c1 = b64_index(group[1])?;
        let c2 = if pad2 { 0 } else { b64_index(group[2])? };
        let c3 = if pad3 { 0 } else { b64_index(group[3])? };
        let n = (c0 << 18) | (c1 << 12) | (c2 << 6) | c3;
        let triple = [(n >> 16) as u8, (n >> 8) as u8, n as u8];
        let produced = if pad2 { 1 } else if pad3 { 2 } else { 3 };
        decoded.extend_from_slice(&triple[..produced]);
    }
    if decoded.len() != width {
        return Err(Error::InvalidDirName(field.to_string()));
    }
    let mut out = [0u8; 8];
    out[8 - width..].copy_from_slice(&decoded);
    Ok(u64::from_be_bytes(out))
}

/// Render a directory's aggregate `Stats` into the width-prefixed,
/// seven-field suffix. All seven fields share one width: the minimum
/// number of bytes (1..8) able to hold the largest of them. Fails if the
/// encoded length would exceed the documented upper bound — a genuine
/// runtime check, not a debug-only assertion, since a malformed or widened
/// encoding must not silently produce an over-length directory name in a
/// release build.
pub fn marshal_suffix(stats: &Stats) -> Result<String, Error> {
    let fields = [
        stats.traffic.num_v4_entries,
        stats.traffic.num_v6_entries,
        stats.traffic.num_drops,
        stats.counters.bytes_rcvd,
        stats.counters.bytes_sent,
        stats.counters.packets_rcvd,
        stats.counters.packets_sent,
    ];
    let width = fields.iter().copied().map(min_bytes).max().unwrap_or(1);
    debug_assert!((1..=8).contains(&width));

    let mut suffix = String::with_capacity(1 + MAX_SUFFIX_LEN);
    suffix.push(B64_ALPHABET[width - 1] as char);
    suffix.push_str(&fields.iter().map(|&v| encode_field(v, width)).collect::<Vec<_>>().join("-"));

    if suffix.len() > MAX_SUFFIX_LEN {
        return Err(Error::SuffixTooLong { len: suffix.len(), max: MAX_SUFFIX_LEN });
    }
    Ok(suffix)
}

/// Parse a suffix back into its seven-tuple (as a `Stats`).
pub fn parse_suffix(suffix: &str) -> Result<Stats, Error> {
    let mut chars = suffix.chars();
    let prefix = chars.next().ok_or_else(|| Error::InvalidDirName(suffix.to_string()))?;
    let width = b64_index(prefix as u8)? as usize + 1;
    if !(1..=8).contains(&width) {
        return Err(Error::InvalidDirName(suffix.to_string()));
    }
    let rest = chars.as_str();

    let parts: Vec<&str> = rest.split('-').collect();
    if parts.len() != NUM_FIELDS {
        return Err(Error::InvalidDirName(suffix.to_string()));
    }
    let values: Result<Vec<u64>, Error> = parts.iter().map(|p| decode_field(p, width)).collect();
    let v = values?;
    Ok(Stats {
        traffic: TrafficTotals {
            num_v4_entries: v[0],
            num_v6_entries: v[1],
            num_drops: v[2],
        },
        counters: Counters {
            bytes_rcvd: v[3],
            bytes_sent: v[4],
            packets_rcvd: v[5],
            packets_sent: v[6],
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_start_floors_to_midnight_utc() {
        assert_eq!(day_start(1_000_000), 1_000_000 / 86_400 * 86_400);
        assert_eq!(day_start(86_400 + 5), 86_400);
    }

    #[test]
    fn dir_path_roundtrips_timestamp() {
        let root = Path::new("/db");
        let ts = 1_700_000_000i64;
        let path = dir_path(root, "eth0", ts, None);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(parse_dir_name(name).unwrap(), day_start(ts));
    }

    #[test]
    fn dir_path_with_suffix_parses_back_to_daystart() {
        let root = Path::new("/db");
        let ts = 1_700_000_000i64;
        let path = dir_path(root, "eth0", ts, Some("1:01-1:00-1:00-1:01-1:00-1:00-1:00"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(parse_dir_name(name).unwrap(), day_start(ts));
    }

    #[test]
    fn suffix_roundtrip_recovers_exact_values() {
        let stats = Stats {
            traffic: TrafficTotals { num_v4_entries: 10, num_v6_entries: 5, num_drops: 0 },
            counters: Counters { bytes_rcvd: 100, bytes_sent: 200, packets_rcvd: 1, packets_sent: 2 },
        };
        let suffix = marshal_suffix(&stats).unwrap();
        let restored = parse_suffix(&suffix).unwrap();
        assert_eq!(restored, stats);
    }

    #[test]
    fn suffix_roundtrip_handles_large_values() {
        let stats = Stats {
            traffic: TrafficTotals { num_v4_entries: u64::MAX, num_v6_entries: 0, num_drops: 1 },
            counters: Counters { bytes_rcvd: u64::MAX, bytes_sent: 0, packets_rcvd: 0, packets_sent: 0 },
        };
        let suffix = marshal_suffix(&stats).unwrap();
        // Worst case: width == 8, one prefix char + 7 * 12-char fields + 6 dashes.
        assert_eq!(suffix.len(), 1 + NUM_FIELDS * 12 + (NUM_FIELDS - 1));
        assert!(suffix.len() <= MAX_SUFFIX_LEN);
        let restored = parse_suffix(&suffix).unwrap();
        assert_eq!(restored, stats);
    }

    #[test]
    fn suffix_shrinks_for_small_values() {
        let zero = Stats::default();
        let max = Stats {
            traffic: TrafficTotals { num_v4_entries: u64::MAX, num_v6_entries: u64::MAX, num_drops: u64::MAX },
            counters: Counters { bytes_rcvd: u64::MAX, bytes_sent: u64::MAX, packets_rcvd: u64::MAX, packets_sent: u64::MAX },
        };
        let zero_suffix = marshal_suffix(&zero).unwrap();
        let max_suffix = marshal_suffix(&max).unwrap();
        assert!(zero_suffix.len() < max_suffix.len());
        assert_eq!(parse_suffix(&zero_suffix).unwrap(), zero);
        assert_eq!(parse_suffix(&max_suffix).unwrap(), max);
    }

    #[test]
    fn suffix_width_prefix_matches_largest_field() {
        let stats = Stats {
            traffic: TrafficTotals { num_v4_entries: 300, num_v6_entries: 0, num_drops: 0 },
            counters: Counters::default(),
        };
        // 300 needs 2 bytes, everything else needs 1 -> shared width is 2.
        assert_eq!(min_bytes(300), 2);
        let suffix = marshal_suffix(&stats).unwrap();
        assert_eq!(b64_index(suffix.as_bytes()[0]).unwrap() as usize + 1, 2);
    }

    #[test]
    fn find_day_dir_by_prefix_matches_suffixed_sibling() {
        let entries = vec![
            "1699900000_1:01-1:00-1:00-1:00-1:00-1:00-1:00".to_string(),
            "1700000000_1:02-1:00-1:00-1:00-1:00-1:00-1:00".to_string(),
            "1700100000".to_string(),
        ];
        assert_eq!(find_day_dir_by_prefix(&entries, 1_700_000_000).unwrap(), entries[1]);
        assert_eq!(find_day_dir_by_prefix(&entries, 1_700_100_000).unwrap(), entries[2]);
        assert_eq!(find_day_dir_by_prefix(&entries, 1_234_567), None);
    }

    #[test]
    fn invalid_dir_name_is_rejected() {
        assert!(parse_dir_name("not-a-number").is_err());
    }

    #[test]
    fn malformed_suffix_is_rejected() {
        assert!(parse_suffix("only-two-fields").is_err());
    }
}
