//! Length-limited Huffman code construction for BZIP2 coding tables.

/// Longest code length a BZIP2 table may use.
pub const MAX_CODE_LEN: u8 = 17;

/// Computes code lengths for `freqs`, none longer than `max_len`.
///
/// Zero frequencies are treated as one so every symbol gets a code. When
/// the tree is too deep all weights are halved and the tree is rebuilt,
/// which flattens it until it fits.
pub fn make_code_lengths(freqs: &[u32], max_len: u8) -> Vec<u8> {
    let alpha_size = freqs.len();
    let mut lengths = vec![0u8; alpha_size];
    if alpha_size == 0 {
        return lengths;
    }

    // Weights keep the frequency in the upper 24 bits and the subtree
    // depth in the low 8, so ties break toward shallower trees.
    let mut weight = vec![0u32; alpha_size * 2 + 2];
    let mut parent = vec![0isize; alpha_size * 2 + 2];
    let mut heap = vec![0usize; alpha_size + 2];

    for (i, &f) in freqs.iter().enumerate() {
        weight[i + 1] = f.max(1) << 8;
    }

    loop {
        let mut num_nodes = alpha_size;
        let mut heap_len = 0;
        heap[0] = 0;
        weight[0] = 0;
        parent[0] = -2;

        for i in 1..=alpha_size {
            parent[i] = -1;
            heap_len += 1;
            heap[heap_len] = i;
            up_heap(&mut heap, &weight, heap_len);
        }

        while heap_len > 1 {
            let n1 = heap[1];
            heap[1] = heap[heap_len];
            heap_len -= 1;
            down_heap(&mut heap, &weight, heap_len, 1);
            let n2 = heap[1];
            heap[1] = heap[heap_len];
            heap_len -= 1;
            down_heap(&mut heap, &weight, heap_len, 1);

            num_nodes += 1;
            parent[n1] = num_nodes as isize;
            parent[n2] = num_nodes as isize;
            weight[num_nodes] = add_weights(weight[n1], weight[n2]);
            parent[num_nodes] = -1;

            heap_len += 1;
            heap[heap_len] = num_nodes;
            up_heap(&mut heap, &weight, heap_len);
        }

        let mut too_long = false;
        for i in 1..=alpha_size {
            let mut depth = 0u32;
            let mut k = i;
            while parent[k] >= 0 {
                k = parent[k] as usize;
                depth += 1;
            }
            lengths[i - 1] = depth as u8;
            if depth > u32::from(max_len) {
                too_long = true;
            }
        }
        if !too_long {
            return lengths;
        }

        for w in &mut weight[1..=alpha_size] {
            let halved = 1 + (*w >> 8) / 2;
            *w = halved << 8;
        }
    }
}

/// Assigns canonical codes: shorter codes first, ties in symbol order.
pub fn assign_codes(lengths: &[u8]) -> Vec<u32> {
    let mut codes = vec![0u32; lengths.len()];
    let (Some(&min_len), Some(&max_len)) = (lengths.iter().min(), lengths.iter().max()) else {
        return codes;
    };
    let mut next = 0u32;
    for len in min_len..=max_len {
        for (code, _) in codes
            .iter_mut()
            .zip(lengths)
            .filter(|&(_, &l)| l == len)
        {
            *code = next;
            next += 1;
        }
        next <<= 1;
    }
    codes
}

fn add_weights(a: u32, b: u32) -> u32 {
    ((a & 0xffff_ff00) + (b & 0xffff_ff00)) | (1 + (a & 0xff).max(b & 0xff))
}

fn up_heap(heap: &mut [usize], weight: &[u32], mut z: usize) {
    let tmp = heap[z];
    while weight[tmp] < weight[heap[z >> 1]] {
        heap[z] = heap[z >> 1];
        z >>= 1;
    }
    heap[z] = tmp;
}

fn down_heap(heap: &mut [usize], weight: &[u32], heap_len: usize, mut z: usize) {
    let tmp = heap[z];
    loop {
        let mut y = z << 1;
        if y > heap_len {
            break;
        }
        if y < heap_len && weight[heap[y + 1]] < weight[heap[y]] {
            y += 1;
        }
        if weight[tmp] < weight[heap[y]] {
            break;
        }
        heap[z] = heap[y];
        z = y;
    }
    heap[z] = tmp;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kraft_sum(lengths: &[u8]) -> f64 {
        lengths.iter().map(|&l| 0.5f64.powi(i32::from(l))).sum()
    }

    #[test]
    fn test_balanced_frequencies() {
        let lengths = make_code_lengths(&[10, 10, 10, 10], MAX_CODE_LEN);
        assert_eq!(lengths, vec![2, 2, 2, 2]);
    }

    #[test]
    fn test_skewed_frequencies() {
        let lengths = make_code_lengths(&[100, 1, 1, 50], MAX_CODE_LEN);
        assert_eq!(lengths[0], 1);
        assert!(lengths[1] >= lengths[3]);
        assert!((kraft_sum(&lengths) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_lengths_are_capped() {
        // Fibonacci weights build the deepest possible tree.
        let mut freqs = vec![1u32, 1];
        while freqs.len() < 30 {
            let next = freqs[freqs.len() - 1] + freqs[freqs.len() - 2];
            freqs.push(next);
        }
        let lengths = make_code_lengths(&freqs, MAX_CODE_LEN);
        assert!(lengths.iter().all(|l| (1..=MAX_CODE_LEN).contains(l)));
        assert!(kraft_sum(&lengths) <= 1.0 + 1e-9);
    }

    #[test]
    fn test_assign_codes_is_prefix_free() {
        let lengths = vec![3, 3, 2, 2, 3, 3];
        let codes = assign_codes(&lengths);
        assert_eq!(codes, vec![0b100, 0b101, 0b00, 0b01, 0b110, 0b111]);
    }
}
