//! Burrows-Wheeler block sorting.
//!
//! The forward transform builds the suffix array with SA-IS (induced sorting
//! of LMS substrings, recursing on their names) against an implicit end
//! marker smaller than any byte. The row of the end marker is dropped from the
//! output and its position is returned as the primary index, so the output has
//! the same length as the input.

use rayon::prelude::*;

use crate::engine::{try_vec, try_with_capacity};
use crate::error::BscError;

const PARALLEL_COUNT_THRESHOLD: usize = 1 << 16;
const EMPTY: u32 = u32::MAX;

/// Alphabet of one SA-IS level: bytes at the top, LMS names below.
trait Symbol: Copy + Ord + Sync {
    fn index(self) -> usize;
}

impl Symbol for u8 {
    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

impl Symbol for u32 {
    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

fn bucket_sizes<T: Symbol>(s: &[T], k: usize) -> Result<Vec<u32>, BscError> {
    if s.len() > PARALLEL_COUNT_THRESHOLD && k <= 256 {
        let counts = s
            .par_chunks(16 * 1024)
            .fold(
                || vec![0u32; k],
                |mut counts, chunk| {
                    for &c in chunk {
                        counts[c.index()] += 1;
                    }
                    counts
                },
            )
            .reduce(
                || vec![0u32; k],
                |mut a, b| {
                    a.iter_mut().zip(&b).for_each(|(x, y)| *x += y);
                    a
                },
            );
        return Ok(counts);
    }
    let mut counts = try_vec(k, 0u32)?;
    for &c in s {
        counts[c.index()] += 1;
    }
    Ok(counts)
}

/// First free slot of every bucket.
fn bucket_heads(sizes: &[u32], heads: &mut [u32]) {
    let mut sum = 0;
    for (head, &size) in heads.iter_mut().zip(sizes) {
        *head = sum;
        sum += size;
    }
}

/// One past the last free slot of every bucket.
fn bucket_tails(sizes: &[u32], tails: &mut [u32]) {
    let mut sum = 0;
    for (tail, &size) in tails.iter_mut().zip(sizes) {
        sum += size;
        *tail = sum;
    }
}

#[inline]
fn is_lms(is_s: &[bool], i: usize) -> bool {
    i > 0 && is_s[i] && !is_s[i - 1]
}

fn induce<T: Symbol>(s: &[T], is_s: &[bool], sizes: &[u32], bkt: &mut [u32], sa: &mut [u32]) {
    let n = s.len();

    bucket_heads(sizes, bkt);
    // The end marker sorts first and induces the last suffix, which is L-type.
    let c = s[n - 1].index();
    sa[bkt[c] as usize] = (n - 1) as u32;
    bkt[c] += 1;
    for j in 0..n {
        let p = sa[j];
        if p != EMPTY && p > 0 && !is_s[p as usize - 1] {
            let c = s[p as usize - 1].index();
            sa[bkt[c] as usize] = p - 1;
            bkt[c] += 1;
        }
    }

    bucket_tails(sizes, bkt);
    for j in (0..n).rev() {
        let p = sa[j];
        if p != EMPTY && p > 0 && is_s[p as usize - 1] {
            let c = s[p as usize - 1].index();
            bkt[c] -= 1;
            sa[bkt[c] as usize] = p - 1;
        }
    }
}

fn lms_substrings_equal<T: Symbol>(s: &[T], is_s: &[bool], p: usize, q: usize) -> bool {
    let n = s.len();
    let mut d = 0;
    loop {
        let (a, b) = (p + d, q + d);
        // Only one substring can reach the end marker.
        if a == n || b == n {
            return false;
        }
        if s[a] != s[b] || is_s[a] != is_s[b] {
            return false;
        }
        if d > 0 {
            match (is_lms(is_s, a), is_lms(is_s, b)) {
                (true, true) => return true,
                (false, false) => {}
                _ => return false,
            }
        }
        d += 1;
    }
}

fn sais<T: Symbol>(s: &[T], k: usize, sa: &mut [u32]) -> Result<(), BscError> {
    let n = s.len();
    match n {
        0 => return Ok(()),
        1 => {
            sa[0] = 0;
            return Ok(());
        }
        _ => {}
    }

    let mut is_s = try_vec(n, false)?;
    for i in (0..n - 1).rev() {
        is_s[i] = s[i] < s[i + 1] || (s[i] == s[i + 1] && is_s[i + 1]);
    }
    let sizes = bucket_sizes(s, k)?;
    let mut bkt = try_vec(k, 0u32)?;

    // Sort LMS substrings.
    sa.fill(EMPTY);
    bucket_tails(&sizes, &mut bkt);
    for i in 1..n {
        if is_lms(&is_s, i) {
            let c = s[i].index();
            bkt[c] -= 1;
            sa[bkt[c] as usize] = i as u32;
        }
    }
    induce(s, &is_s, &sizes, &mut bkt, sa);

    // Name them; LMS positions are at least two apart.
    let mut m = 0;
    for j in 0..n {
        let p = sa[j];
        if p != EMPTY && is_lms(&is_s, p as usize) {
            sa[m] = p;
            m += 1;
        }
    }
    let mut names = try_vec(n / 2 + 1, EMPTY)?;
    let mut name = 0u32;
    let mut prev: Option<usize> = None;
    for &p in &sa[..m] {
        let p = p as usize;
        if prev.map_or(true, |q| !lms_substrings_equal(s, &is_s, q, p)) {
            name += 1;
        }
        names[p / 2] = name - 1;
        prev = Some(p);
    }

    let mut positions = try_with_capacity(m)?;
    let mut reduced = try_with_capacity(m)?;
    for i in 1..n {
        if is_lms(&is_s, i) {
            positions.push(i as u32);
            reduced.push(names[i / 2]);
        }
    }
    drop(names);

    let mut sa1 = try_vec(m, 0u32)?;
    if (name as usize) < m {
        sais(&reduced[..], name as usize, &mut sa1)?;
    } else {
        for (i, &c) in reduced.iter().enumerate() {
            sa1[c as usize] = i as u32;
        }
    }
    drop(reduced);

    // Place LMS suffixes in their final order and induce the rest.
    sa.fill(EMPTY);
    bucket_tails(&sizes, &mut bkt);
    for &r in sa1.iter().rev() {
        let p = positions[r as usize] as usize;
        let c = s[p].index();
        bkt[c] -= 1;
        sa[bkt[c] as usize] = p as u32;
    }
    induce(s, &is_s, &sizes, &mut bkt, sa);
    Ok(())
}

/// Suffix array of `s`, shorter suffixes first on ties.
pub fn suffix_array(s: &[u8]) -> Result<Vec<u32>, BscError> {
    let mut sa = try_vec(s.len(), 0u32)?;
    sais(s, 256, &mut sa)?;
    Ok(sa)
}

/// Returns the primary index and the transformed block.
pub fn forward(s: &[u8]) -> Result<(u32, Vec<u8>), BscError> {
    let n = s.len();
    if n == 0 {
        return Ok((0, Vec::new()));
    }
    let sa = suffix_array(s)?;

    let mut out = try_with_capacity(n)?;
    // Row 0 is the lone end marker; its predecessor is the last byte.
    out.push(s[n - 1]);
    let mut primary = 0usize;
    for (row, &p) in sa.iter().enumerate() {
        if p == 0 {
            primary = row + 1;
        } else {
            out.push(s[p as usize - 1]);
        }
    }
    Ok((primary as u32, out))
}

pub fn inverse(bwt: &[u8], primary: u32) -> Result<Vec<u8>, BscError> {
    let n = bwt.len();
    let primary = primary as usize;
    if n == 0 {
        return if primary == 0 {
            Ok(Vec::new())
        } else {
            Err(BscError::DataCorrupt("primary index on empty block".into()))
        };
    }
    if primary == 0 || primary > n {
        return Err(BscError::DataCorrupt(format!("primary index {} out of range", primary)));
    }

    let at = |row: usize| if row < primary { bwt[row] } else { bwt[row - 1] };

    let mut counts = [0u32; 256];
    for &b in bwt {
        counts[b as usize] += 1;
    }
    // Row 0 belongs to the end marker.
    let mut start = [0u32; 256];
    let mut sum = 1u32;
    for (slot, &count) in start.iter_mut().zip(counts.iter()) {
        *slot = sum;
        sum += count;
    }

    let mut lf = try_vec(n + 1, 0u32)?;
    for (row, slot) in lf.iter_mut().enumerate() {
        if row == primary {
            continue;
        }
        let b = at(row) as usize;
        *slot = start[b];
        start[b] += 1;
    }

    let mut out = try_vec(n, 0u8)?;
    let mut row = 0usize;
    for k in (0..n).rev() {
        if row == primary {
            return Err(BscError::DataCorrupt("bwt cycle closed early".into()));
        }
        out[k] = at(row);
        row = lf[row] as usize;
    }
    if row != primary {
        return Err(BscError::DataCorrupt("bwt cycle does not close".into()));
    }
    Ok(out)
}
