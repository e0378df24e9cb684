use libm::log2;

use crate::EntropyScore;

/// Calculates the Shannon entropy of a byte slice in bits per symbol.
pub fn calculate_shannon_entropy(data: &[u8]) -> EntropyScore {
    if data.is_empty() {
        return 0.0;
    }

    let mut frequencies = [0usize; 256];
    for &byte in data {
        frequencies[byte as usize] += 1;
    }

    let len = data.len() as f64;
    frequencies
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / len;
            -p * log2(p)
        })
        .sum()
}

/// The maximum entropy a token of `len` bytes can reach (all bytes distinct).
pub fn max_entropy_for_len(len: usize) -> EntropyScore {
    if len == 0 {
        return 0.0;
    }
    log2(len.min(256) as f64)
}
