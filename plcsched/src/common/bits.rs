pub(crate) fn num_bytes_for_bits(count: u16) -> usize {
    (count as usize + 7) / 8
}

/// pack bits LSB-first, groups of 8 starting at the first value
pub(crate) fn pack(values: &[bool], dest: &mut Vec<u8>) {
    for chunk in values.chunks(8) {
        let mut acc: u8 = 0;
        for (i, value) in chunk.iter().enumerate() {
            if *value {
                acc |= 1 << i;
            }
        }
        dest.push(acc);
    }
}

/// the value of bit `index` in an LSB-first bitmap
pub(crate) fn get(bytes: &[u8], index: usize) -> Option<bool> {
    bytes
        .get(index / 8)
        .map(|byte| (byte & (1 << (index % 8))) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_byte_count() {
        assert_eq!(num_bytes_for_bits(1), 1);
        assert_eq!(num_bytes_for_bits(8), 1);
        assert_eq!(num_bytes_for_bits(9), 2);
        assert_eq!(num_bytes_for_bits(2000), 250);
    }

    #[test]
    fn packs_lsb_first() {
        let mut out = Vec::new();
        pack(
            &[true, false, true, false, false, false, false, false, true],
            &mut out,
        );
        assert_eq!(out, vec![0b0000_0101, 0b0000_0001]);
        assert_eq!(get(&out, 0), Some(true));
        assert_eq!(get(&out, 1), Some(false));
        assert_eq!(get(&out, 8), Some(true));
        assert_eq!(get(&out, 16), None);
    }
}
