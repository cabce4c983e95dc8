/// Number of positions at which the two slices differ, over the shorter length.
pub fn hamming_distance(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).filter(|(x, y)| x != y).count()
}

pub fn sum(values: impl IntoIterator<Item = u32>) -> u64 {
    values.into_iter().map(u64::from).sum()
}

pub fn is_printable(byte: u8) -> bool {
    (32..127).contains(&byte)
}

/// The byte as a character, `?` when it is not printable.
pub fn printable(byte: u8) -> char {
    if is_printable(byte) {
        byte as char
    } else {
        '?'
    }
}
