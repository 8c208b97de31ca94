// ── Zone → partition decoding ──
//
// The `PRT` field of a zone says which partitions it belongs to, but
// panels and firmwares disagree on the encoding: an `ALL` marker, an
// explicit list, a decimal or hex bitmask where bit *i* is partition *i*,
// or a bitmask where bit *i* is the *i*-th configured partition.

/// Strategy for turning a zone's raw `PRT` value into partition ids.
pub trait PartitionDecoder: Send + Sync {
    /// `known` is the sorted list of configured partition ids.
    fn decode(&self, raw: &str, known: &[u32]) -> Vec<u32>;
}

/// Decodes every known encoding and, for masks, picks whichever reading
/// best fits the configured partitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicPartitionDecoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MaskReading {
    Compact,
    Direct,
}

impl PartitionDecoder for HeuristicPartitionDecoder {
    fn decode(&self, raw: &str, known: &[u32]) -> Vec<u32> {
        let s = raw.trim();
        if s.is_empty() {
            return Vec::new();
        }
        let upper = s.to_ascii_uppercase();
        if upper == "ALL" || upper == "ALLALL" {
            return known.to_vec();
        }

        if s.contains(',') || s.contains(char::is_whitespace) {
            let ids = s
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter_map(|tok| tok.trim().parse::<u32>().ok());
            return normalized(ids);
        }

        let masks = mask_candidates(s, &upper);
        let mut best: Option<((usize, isize, usize, u8), Vec<u32>)> = None;
        for mask in masks {
            for reading in [MaskReading::Direct, MaskReading::Compact] {
                let ids = read_mask(mask, reading, known);
                if ids.is_empty() {
                    continue;
                }
                let score = score(&ids, reading, known);
                if best.as_ref().is_none_or(|(current, _)| score < *current) {
                    best = Some((score, ids));
                }
            }
        }
        best.map(|(_, ids)| normalized(ids)).unwrap_or_default()
    }
}

/// Numeric readings of `s`: decimal (floats truncated) and, when it
/// looks like hex, hexadecimal.
fn mask_candidates(s: &str, upper: &str) -> Vec<u64> {
    let mut out = Vec::new();
    if let Ok(n) = s.parse::<f64>() {
        if n.is_finite() && n >= 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            out.push(n.trunc() as u64);
        }
    }
    let hex = match upper.strip_prefix("0X") {
        Some(digits) => Some(digits),
        None if s.len() >= 2 && s.chars().all(|c| c.is_ascii_hexdigit()) => Some(s),
        None => None,
    };
    if let Some(n) = hex.and_then(|digits| u64::from_str_radix(digits, 16).ok()) {
        out.push(n);
    }
    out
}

fn read_mask(mask: u64, reading: MaskReading, known: &[u32]) -> Vec<u32> {
    let bits = match reading {
        MaskReading::Direct => known.iter().copied().max().unwrap_or(0).max(32),
        MaskReading::Compact => u32::try_from(known.len()).unwrap_or(u32::MAX).max(32),
    }
    .min(64);

    (1..=bits)
        .filter(|bit| mask & (1u64 << (bit - 1)) != 0)
        .filter_map(|bit| match reading {
            MaskReading::Direct => Some(bit),
            MaskReading::Compact => known.get(bit as usize - 1).copied(),
        })
        .collect()
}

/// Lower is better: fewest unknown ids, most known ids, fewest ids,
/// compact before direct.
fn score(ids: &[u32], reading: MaskReading, known: &[u32]) -> (usize, isize, usize, u8) {
    let (unknown, matched) = if known.is_empty() {
        (0, ids.len())
    } else {
        let matched = ids.iter().filter(|id| known.contains(id)).count();
        (ids.len() - matched, matched)
    };
    let order = match reading {
        MaskReading::Compact => 0,
        MaskReading::Direct => 1,
    };
    (
        unknown,
        -isize::try_from(matched).unwrap_or(isize::MAX),
        ids.len(),
        order,
    )
}

fn normalized(ids: impl IntoIterator<Item = u32>) -> Vec<u32> {
    let mut out: Vec<u32> = ids.into_iter().filter(|id| *id > 0).collect();
    out.sort_unstable();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn decode(raw: &str, known: &[u32]) -> Vec<u32> {
        HeuristicPartitionDecoder.decode(raw, known)
    }

    #[test]
    fn all_marker_returns_every_partition() {
        assert_eq!(decode("ALL", &[1, 2, 5]), vec![1, 2, 5]);
        assert_eq!(decode("allall", &[3]), vec![3]);
    }

    #[test]
    fn explicit_lists() {
        assert_eq!(decode("3, 1 1,0,x", &[1, 2, 3]), vec![1, 3]);
    }

    #[test]
    fn empty_input() {
        assert!(decode("  ", &[1]).is_empty());
        assert!(decode("zz", &[1]).is_empty());
    }

    #[test]
    fn direct_mask_when_ids_exist() {
        // 0b110: bits 2 and 3
        assert_eq!(decode("6", &[1, 2, 3]), vec![2, 3]);
    }

    #[test]
    fn compact_mask_when_direct_points_nowhere() {
        // bit 1 → first configured partition (10)
        assert_eq!(decode("1", &[10, 20]), vec![10]);
        // bits 1 and 2 → 10 and 20
        assert_eq!(decode("3", &[10, 20]), vec![10, 20]);
    }

    #[test]
    fn hex_without_prefix_is_considered() {
        // decimal 40 sets bits 4 and 6; hex 0x40 sets bit 7
        assert_eq!(decode("40", &[7]), vec![7]);
        assert_eq!(decode("0x4", &[1, 2, 3]), vec![3]);
    }

    #[test]
    fn no_known_partitions_prefers_compact_then_fewest() {
        // compact reading yields nothing without known ids, direct wins
        assert_eq!(decode("5", &[]), vec![1, 3]);
    }
}
