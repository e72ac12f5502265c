use proptest::prelude::*;

use godb::codec::{get_codec, CodecTag};
use godb::path::{day_start, dir_path, marshal_suffix, parse_suffix};
use godb::{Counters, Stats, TrafficTotals};

fn roundtrip_codec(tag: CodecTag, level: i32, data: &[u8]) {
    let mut enc = get_codec(tag);
    enc.set_level(level);
    let mut scratch = Vec::new();
    let mut sink = Vec::new();
    enc.compress(data, &mut scratch, &mut sink).unwrap();

    let mut dec = get_codec(tag);
    let mut out = vec![0u8; data.len()];
    dec.decompress(&sink, &mut out).unwrap();
    assert_eq!(out, data);
}

proptest! {
    #[test]
    fn zstd_compress_decompress_is_identity(data in prop::collection::vec(any::<u8>(), 0..4096), level in 1i32..20) {
        roundtrip_codec(CodecTag::Zstd, level, &data);
    }

    #[test]
    fn lz4_compress_decompress_is_identity(data in prop::collection::vec(any::<u8>(), 0..4096)) {
        roundtrip_codec(CodecTag::Lz4, 0, &data);
    }

    #[test]
    fn null_compress_decompress_is_identity(data in prop::collection::vec(any::<u8>(), 0..4096)) {
        roundtrip_codec(CodecTag::Null, 0, &data);
    }

    /// Suffix round-trip: marshal_suffix -> parse_suffix recovers the exact
    /// seven-tuple of counters, for any combination of magnitudes across the
    /// full u64 domain each field is actually stored in.
    #[test]
    fn suffix_roundtrip_recovers_exact_tuple(
        v4 in any::<u64>(), v6 in any::<u64>(), drops in any::<u64>(),
        b_rcvd in any::<u64>(), b_sent in any::<u64>(),
        p_rcvd in any::<u64>(), p_sent in any::<u64>(),
    ) {
        let stats = Stats {
            traffic: TrafficTotals { num_v4_entries: v4, num_v6_entries: v6, num_drops: drops },
            counters: Counters { bytes_rcvd: b_rcvd, bytes_sent: b_sent, packets_rcvd: p_rcvd, packets_sent: p_sent },
        };
        let suffix = marshal_suffix(&stats).unwrap();
        prop_assert!(suffix.len() <= 96);
        let restored = parse_suffix(&suffix).unwrap();
        prop_assert_eq!(restored, stats);
    }

    /// Directory path round-trip: for every valid day timestamp,
    /// path(ts) -> parse_timestamp(path) recovers floor(ts/86400)*86400.
    #[test]
    fn dir_path_roundtrips_any_timestamp(ts in 0i64..4_102_444_800) {
        let root = std::path::Path::new("/db");
        let path = dir_path(root, "eth0", ts, None);
        let name = path.file_name().unwrap().to_str().unwrap();
        let recovered: i64 = name.parse().unwrap();
        prop_assert_eq!(recovered, day_start(ts));
    }
}
