//! Block sorting for the Burrows-Wheeler transform.
//!
//! Two sorters produce the same ordering of rotations:
//!
//! * the **fallback sort**, a byte-bucketed rank-doubling sort that is
//!   `O(n log n)` regardless of input, and
//! * the **main sort**, a two-byte radix sort followed by a three-way
//!   quicksort over each bucket. It is much faster on typical data but
//!   degrades on highly repetitive input, so every comparison is charged
//!   against a work budget of `n * 9`; when the budget runs out the block
//!   is handed to the fallback sort.
//!
//! Blocks shorter than [`MAIN_SORT_THRESHOLD`] always use the fallback.

use log::debug;

/// Blocks shorter than this go straight to the fallback sort.
pub const MAIN_SORT_THRESHOLD: usize = 10_000;

/// Comparison budget per block byte before main sort gives up.
const WORK_FACTOR: i64 = 9;

/// Bytes of the block repeated after its end so comparisons can run past
/// it without wrapping.
const OVERSHOOT: usize = 34;

const FALLBACK_SMALL_THRESHOLD: isize = 10;
const MAIN_SMALL_THRESHOLD: isize = 20;
const MAIN_DEPTH_THRESHOLD: usize = 14;
const STACK_SIZE: usize = 100;
const RADIX_DEPTH: usize = 2;

/// Marks a finished bucket in `ftab`; bucket offsets stay below it.
const SET_MASK: u32 = 1 << 31;
const CLEAR_MASK: u32 = !SET_MASK;

/// Shell sort increments.
const INCREMENTS: [usize; 14] = [
    1, 4, 13, 40, 121, 364, 1093, 3280, 9841, 29524, 88573, 265720, 797161, 2391484,
];

/// Result of a Burrows-Wheeler transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bwt {
    /// Last column of the sorted rotation matrix.
    pub last_column: Vec<u8>,
    /// Row of the sorted matrix holding the untransformed block.
    pub orig_ptr: usize,
}

/// Reusable block sorter.
///
/// Work buffers are kept between calls, so one instance per compressor
/// avoids reallocating them for every block.
#[derive(Debug, Default)]
pub struct BlockSort {
    fmap: Vec<u32>,
    // Main sort state.
    block: Vec<u8>,
    quadrant: Vec<u16>,
    ftab: Vec<u32>,
    budget: i64,
    // Fallback sort state.
    eclass: Vec<u32>,
    bhtab: Vec<u32>,
}

impl BlockSort {
    /// Creates a sorter with empty work buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorts the rotations of `block`.
    ///
    /// Returns `fmap`: `fmap[i]` is the start offset of the `i`-th smallest
    /// rotation.
    pub fn sort(&mut self, block: &[u8]) -> &[u32] {
        if block.len() < MAIN_SORT_THRESHOLD {
            return self.fallback_sort(block);
        }
        if !self.run_main_sort(block) {
            debug!(
                "block sort budget exhausted on {} bytes, using fallback sort",
                block.len()
            );
            return self.fallback_sort(block);
        }
        &self.fmap
    }

    /// Computes the Burrows-Wheeler transform of `block`.
    pub fn bwt(&mut self, block: &[u8]) -> Bwt {
        let n = block.len();
        let fmap = self.sort(block);
        let mut orig_ptr = 0;
        let mut last_column = Vec::with_capacity(n);
        for (i, &start) in fmap.iter().enumerate() {
            let start = start as usize;
            if start == 0 {
                orig_ptr = i;
            }
            last_column.push(block[(start + n - 1) % n]);
        }
        Bwt {
            last_column,
            orig_ptr,
        }
    }

    /// Sorts with the main sort only.
    ///
    /// Returns `None` when the work budget is exhausted.
    pub fn main_sort(&mut self, block: &[u8]) -> Option<&[u32]> {
        if self.run_main_sort(block) {
            Some(self.fmap.as_slice())
        } else {
            None
        }
    }

    /// Sorts with the fallback sort only.
    pub fn fallback_sort(&mut self, block: &[u8]) -> &[u32] {
        let n = block.len();
        self.fmap.clear();
        self.fmap.resize(n, 0);
        if n == 0 {
            return &self.fmap;
        }

        self.eclass.clear();
        self.eclass.resize(n, 0);
        self.bhtab.clear();
        self.bhtab.resize(4 + n / 32, 0);

        let fmap = &mut self.fmap;
        let eclass = &mut self.eclass;
        let bhtab = &mut self.bhtab;

        // Initial sort on the first byte.
        let mut ftab = [0usize; 257];
        for &b in block {
            ftab[b as usize] += 1;
        }
        for i in 1..257 {
            ftab[i] += ftab[i - 1];
        }
        for (i, &b) in block.iter().enumerate() {
            let j = b as usize;
            ftab[j] -= 1;
            fmap[ftab[j]] = i as u32;
        }

        for &start in &ftab[..256] {
            set_bit(bhtab, start);
        }
        // Alternating sentinel bits past the end stop the bucket scans.
        for i in 0..32 {
            set_bit(bhtab, n + 2 * i);
            clear_bit(bhtab, n + 2 * i + 1);
        }

        let mut h = 1;
        loop {
            let mut j = 0;
            for i in 0..n {
                if is_set(bhtab, i) {
                    j = i;
                }
                let k = (fmap[i] as usize + n - h % n) % n;
                eclass[k] = j as u32;
            }

            let mut not_done = 0;
            let mut r: isize = -1;
            loop {
                // Find the next bucket with more than one member.
                let mut k = (r + 1) as usize;
                while is_set(bhtab, k) && k & 31 != 0 {
                    k += 1;
                }
                if is_set(bhtab, k) {
                    while bhtab[k >> 5] == u32::MAX {
                        k += 32;
                    }
                    while is_set(bhtab, k) {
                        k += 1;
                    }
                }
                let l = k - 1;
                if l >= n {
                    break;
                }
                while !is_set(bhtab, k) && k & 31 != 0 {
                    k += 1;
                }
                if !is_set(bhtab, k) {
                    while bhtab[k >> 5] == 0 {
                        k += 32;
                    }
                    while !is_set(bhtab, k) {
                        k += 1;
                    }
                }
                r = k as isize - 1;
                let r_idx = r as usize;
                if r_idx >= n {
                    break;
                }

                if r_idx > l {
                    not_done += r_idx - l + 1;
                    fallback_qsort3(fmap, eclass, l as isize, r);

                    let mut current = None;
                    for i in l..=r_idx {
                        let class = eclass[fmap[i] as usize];
                        if current != Some(class) {
                            set_bit(bhtab, i);
                            current = Some(class);
                        }
                    }
                }
            }

            h *= 2;
            if h > n || not_done == 0 {
                break;
            }
        }

        &self.fmap
    }

    fn run_main_sort(&mut self, block: &[u8]) -> bool {
        let n = block.len();
        self.fmap.clear();
        self.fmap.resize(n, 0);
        if n == 0 {
            return true;
        }
        if n >= SET_MASK as usize {
            return false;
        }

        self.block.clear();
        self.block.extend_from_slice(block);
        for i in 0..OVERSHOOT {
            self.block.push(block[i % n]);
        }
        self.quadrant.clear();
        self.quadrant.resize(n + OVERSHOOT, 0);
        self.ftab.clear();
        self.ftab.resize(65537, 0);
        self.budget = n as i64 * WORK_FACTOR;

        let mut sorter = MainSort {
            block: &self.block,
            n,
            fmap: &mut self.fmap,
            quadrant: &mut self.quadrant,
            ftab: &mut self.ftab,
            budget: &mut self.budget,
        };
        sorter.run();
        self.budget >= 0
    }
}

fn set_bit(table: &mut [u32], bit: usize) {
    table[bit >> 5] |= 1 << (bit & 31);
}

fn clear_bit(table: &mut [u32], bit: usize) {
    table[bit >> 5] &= !(1 << (bit & 31));
}

fn is_set(table: &[u32], bit: usize) -> bool {
    table[bit >> 5] & (1 << (bit & 31)) != 0
}

fn fallback_simple_sort(fmap: &mut [u32], eclass: &[u32], lo: isize, hi: isize) {
    if lo == hi {
        return;
    }
    let (lo, hi) = (lo as usize, hi as usize);

    if hi - lo > 3 {
        for i in (lo..=hi - 4).rev() {
            let tmp = fmap[i];
            let class = eclass[tmp as usize];
            let mut j = i + 4;
            while j <= hi && class > eclass[fmap[j] as usize] {
                fmap[j - 4] = fmap[j];
                j += 4;
            }
            fmap[j - 4] = tmp;
        }
    }

    for i in (lo..hi).rev() {
        let tmp = fmap[i];
        let class = eclass[tmp as usize];
        let mut j = i + 1;
        while j <= hi && class > eclass[fmap[j] as usize] {
            fmap[j - 1] = fmap[j];
            j += 1;
        }
        fmap[j - 1] = tmp;
    }
}

fn vswap(fmap: &mut [u32], mut a: isize, mut b: isize, mut count: isize) {
    while count > 0 {
        fmap.swap(a as usize, b as usize);
        a += 1;
        b += 1;
        count -= 1;
    }
}

fn fallback_qsort3(fmap: &mut [u32], eclass: &[u32], lo_start: isize, hi_start: isize) {
    let mut stack = Vec::with_capacity(STACK_SIZE);
    stack.push((lo_start, hi_start));
    let mut r: u32 = 0;

    while let Some((lo, hi)) = stack.pop() {
        if hi - lo < FALLBACK_SMALL_THRESHOLD {
            fallback_simple_sort(fmap, eclass, lo, hi);
            continue;
        }

        // Pseudo-random pivot choice guards against adversarial input.
        r = (r * 7621 + 1) % 32768;
        let pivot_at = match r % 3 {
            0 => lo,
            1 => (lo + hi) >> 1,
            _ => hi,
        };
        let med = eclass[fmap[pivot_at as usize] as usize];
        let class = |fmap: &[u32], i: isize| eclass[fmap[i as usize] as usize];

        let (mut un_lo, mut lt_lo) = (lo, lo);
        let (mut un_hi, mut gt_hi) = (hi, hi);
        loop {
            while un_lo <= un_hi {
                let c = class(fmap, un_lo);
                if c == med {
                    fmap.swap(un_lo as usize, lt_lo as usize);
                    lt_lo += 1;
                    un_lo += 1;
                    continue;
                }
                if c > med {
                    break;
                }
                un_lo += 1;
            }
            while un_lo <= un_hi {
                let c = class(fmap, un_hi);
                if c == med {
                    fmap.swap(un_hi as usize, gt_hi as usize);
                    gt_hi -= 1;
                    un_hi -= 1;
                    continue;
                }
                if c < med {
                    break;
                }
                un_hi -= 1;
            }
            if un_lo > un_hi {
                break;
            }
            fmap.swap(un_lo as usize, un_hi as usize);
            un_lo += 1;
            un_hi -= 1;
        }

        if gt_hi < lt_lo {
            continue;
        }

        let n = (lt_lo - lo).min(un_lo - lt_lo);
        vswap(fmap, lo, un_lo - n, n);
        let m = (hi - gt_hi).min(gt_hi - un_hi);
        vswap(fmap, un_lo, hi - m + 1, m);

        let n = lo + un_lo - lt_lo - 1;
        let m = hi - (gt_hi - un_hi) + 1;
        if n - lo > hi - m {
            stack.push((lo, n));
            stack.push((m, hi));
        } else {
            stack.push((m, hi));
            stack.push((lo, n));
        }
    }
}

/// Borrowed state of one main-sort run.
struct MainSort<'a> {
    /// The block followed by [`OVERSHOOT`] repeated bytes.
    block: &'a [u8],
    n: usize,
    fmap: &'a mut [u32],
    quadrant: &'a mut [u16],
    ftab: &'a mut [u32],
    budget: &'a mut i64,
}

impl MainSort<'_> {
    fn big_freq(&self, b: usize) -> u32 {
        self.ftab[(b + 1) << 8] - self.ftab[b << 8]
    }

    fn run(&mut self) {
        let n = self.n;

        // Two-byte frequency table.
        let mut j = (self.block[0] as usize) << 8;
        for i in (0..n).rev() {
            j = (j >> 8) | ((self.block[i] as usize) << 8);
            self.ftab[j] += 1;
        }
        for i in 1..=65536 {
            self.ftab[i] += self.ftab[i - 1];
        }

        let mut s = (self.block[0] as usize) << 8;
        for i in (0..n).rev() {
            s = (s >> 8) | ((self.block[i] as usize) << 8);
            self.ftab[s] -= 1;
            self.fmap[self.ftab[s] as usize] = i as u32;
        }

        // Process big buckets from the smallest to the largest.
        let mut running_order: [usize; 256] = std::array::from_fn(|i| i);
        let mut h = 1;
        while h <= 256 {
            h = 3 * h + 1;
        }
        loop {
            h /= 3;
            for i in h..256 {
                let vv = running_order[i];
                let mut j = i;
                while self.big_freq(running_order[j - h]) > self.big_freq(vv) {
                    running_order[j] = running_order[j - h];
                    j -= h;
                    if j < h {
                        break;
                    }
                }
                running_order[j] = vv;
            }
            if h == 1 {
                break;
            }
        }

        let mut big_done = [false; 256];
        let mut copy_start = [0usize; 256];
        let mut copy_end = [0isize; 256];

        for (i, &ss) in running_order.iter().enumerate() {
            // Step 1: quicksort the unsorted small buckets [ss, j].
            for j in 0..256 {
                if j == ss {
                    continue;
                }
                let sb = (ss << 8) + j;
                if self.ftab[sb] & SET_MASK == 0 {
                    let lo = (self.ftab[sb] & CLEAR_MASK) as isize;
                    let hi = (self.ftab[sb + 1] & CLEAR_MASK) as isize - 1;
                    if hi > lo {
                        self.qsort3(lo, hi, RADIX_DEPTH);
                        if *self.budget < 0 {
                            return;
                        }
                    }
                }
                self.ftab[sb] |= SET_MASK;
            }

            // Step 2: the sorted big bucket [ss] orders the small buckets
            // [t, ss] for every t.
            for j in 0..256 {
                copy_start[j] = (self.ftab[(j << 8) + ss] & CLEAR_MASK) as usize;
                copy_end[j] = (self.ftab[(j << 8) + ss + 1] & CLEAR_MASK) as isize - 1;
            }
            let bucket_lo = (self.ftab[ss << 8] & CLEAR_MASK) as usize;
            for j in bucket_lo..copy_start[ss] {
                let k = (self.fmap[j] as usize + n - 1) % n;
                let c1 = self.block[k] as usize;
                if !big_done[c1] {
                    self.fmap[copy_start[c1]] = k as u32;
                    copy_start[c1] += 1;
                }
            }
            let bucket_hi = (self.ftab[(ss + 1) << 8] & CLEAR_MASK) as isize - 1;
            let mut j = bucket_hi;
            while j > copy_end[ss] {
                let k = (self.fmap[j as usize] as usize + n - 1) % n;
                let c1 = self.block[k] as usize;
                if !big_done[c1] {
                    self.fmap[copy_end[c1] as usize] = k as u32;
                    copy_end[c1] -= 1;
                }
                j -= 1;
            }
            for j in 0..256 {
                self.ftab[(j << 8) + ss] |= SET_MASK;
            }

            // Step 3: record quadrant ranks for the finished bucket.
            big_done[ss] = true;
            if i < 255 {
                let bb_start = (self.ftab[ss << 8] & CLEAR_MASK) as usize;
                let bb_size = (self.ftab[(ss + 1) << 8] & CLEAR_MASK) as usize - bb_start;
                let mut shifts = 0;
                while (bb_size >> shifts) > 65534 {
                    shifts += 1;
                }
                for j in (0..bb_size).rev() {
                    let a2update = self.fmap[bb_start + j] as usize;
                    let value = (j >> shifts) as u16;
                    self.quadrant[a2update] = value;
                    let mut mirror = a2update + n;
                    while mirror < n + OVERSHOOT {
                        self.quadrant[mirror] = value;
                        mirror += n;
                    }
                }
            }
        }
    }

    fn byte_at(&self, fmap_index: isize, depth: usize) -> u8 {
        self.block[self.fmap[fmap_index as usize] as usize + depth]
    }

    fn vswap(&mut self, a: isize, b: isize, count: isize) {
        vswap(self.fmap, a, b, count);
    }

    fn qsort3(&mut self, lo_start: isize, hi_start: isize, depth_start: usize) {
        let mut stack: Vec<(isize, isize, usize)> = Vec::with_capacity(STACK_SIZE);
        stack.push((lo_start, hi_start, depth_start));

        while let Some((lo, hi, d)) = stack.pop() {
            if hi - lo < MAIN_SMALL_THRESHOLD || d > MAIN_DEPTH_THRESHOLD {
                self.simple_sort(lo, hi, d);
                if *self.budget < 0 {
                    return;
                }
                continue;
            }

            let med = median_of_three(
                self.byte_at(lo, d),
                self.byte_at(hi, d),
                self.byte_at((lo + hi) >> 1, d),
            );

            let (mut un_lo, mut lt_lo) = (lo, lo);
            let (mut un_hi, mut gt_hi) = (hi, hi);
            loop {
                while un_lo <= un_hi {
                    let c = self.byte_at(un_lo, d);
                    if c == med {
                        self.fmap.swap(un_lo as usize, lt_lo as usize);
                        lt_lo += 1;
                        un_lo += 1;
                        continue;
                    }
                    if c > med {
                        break;
                    }
                    un_lo += 1;
                }
                while un_lo <= un_hi {
                    let c = self.byte_at(un_hi, d);
                    if c == med {
                        self.fmap.swap(un_hi as usize, gt_hi as usize);
                        gt_hi -= 1;
                        un_hi -= 1;
                        continue;
                    }
                    if c < med {
                        break;
                    }
                    un_hi -= 1;
                }
                if un_lo > un_hi {
                    break;
                }
                self.fmap.swap(un_lo as usize, un_hi as usize);
                un_lo += 1;
                un_hi -= 1;
            }

            if gt_hi < lt_lo {
                stack.push((lo, hi, d + 1));
                continue;
            }

            let n = (lt_lo - lo).min(un_lo - lt_lo);
            self.vswap(lo, un_lo - n, n);
            let m = (hi - gt_hi).min(gt_hi - un_hi);
            self.vswap(un_lo, hi - m + 1, m);

            let n = lo + un_lo - lt_lo - 1;
            let m = hi - (gt_hi - un_hi) + 1;

            let mut next = [(lo, n, d), (m, hi, d), (n + 1, m - 1, d + 1)];
            let size = |p: &(isize, isize, usize)| p.1 - p.0;
            if size(&next[0]) < size(&next[1]) {
                next.swap(0, 1);
            }
            if size(&next[1]) < size(&next[2]) {
                next.swap(1, 2);
            }
            if size(&next[0]) < size(&next[1]) {
                next.swap(0, 1);
            }
            stack.extend_from_slice(&next);
        }
    }

    fn simple_sort(&mut self, lo: isize, hi: isize, d: usize) {
        let big_n = hi - lo + 1;
        if big_n < 2 {
            return;
        }
        let (lo, hi) = (lo as usize, hi as usize);
        let mut hp = INCREMENTS
            .iter()
            .position(|&inc| inc >= big_n as usize)
            .unwrap_or(INCREMENTS.len());

        while hp > 0 {
            hp -= 1;
            let h = INCREMENTS[hp];
            for i in lo + h..=hi {
                let v = self.fmap[i];
                let mut j = i;
                while self.greater(self.fmap[j - h] as usize + d, v as usize + d) {
                    self.fmap[j] = self.fmap[j - h];
                    j -= h;
                    if j < lo + h {
                        break;
                    }
                }
                self.fmap[j] = v;
                if *self.budget < 0 {
                    return;
                }
            }
        }
    }

    /// Whether the rotation at `i1` sorts after the one at `i2`.
    fn greater(&mut self, mut i1: usize, mut i2: usize) -> bool {
        let n = self.n;
        let block = self.block;

        for _ in 0..12 {
            let (c1, c2) = (block[i1], block[i2]);
            if c1 != c2 {
                return c1 > c2;
            }
            i1 += 1;
            i2 += 1;
        }

        let mut k = n as isize + 8;
        while k >= 0 {
            for _ in 0..8 {
                let (c1, c2) = (block[i1], block[i2]);
                if c1 != c2 {
                    return c1 > c2;
                }
                let (s1, s2) = (self.quadrant[i1], self.quadrant[i2]);
                if s1 != s2 {
                    return s1 > s2;
                }
                i1 += 1;
                i2 += 1;
            }
            i1 %= n;
            i2 %= n;
            k -= 8;
            *self.budget -= 1;
        }
        false
    }
}

fn median_of_three(mut a: u8, mut b: u8, c: u8) -> u8 {
    if a > b {
        std::mem::swap(&mut a, &mut b);
    }
    if b > c {
        b = c;
        if a > b {
            b = a;
        }
    }
    b
}
