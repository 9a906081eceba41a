// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mapping from work items to amplitude offsets.
//!
//! Bit `q` of an amplitude index is the value of qubit `q`. A k-qubit operator
//! mixes groups of 2^k amplitudes that differ only in the operand bits, so a
//! work item is the index with those bits removed, and its group is found by
//! inserting zero bits back at the operand positions.


#[inline]
fn low_mask(bits: u32) -> usize {
    (1usize << bits) - 1
}

/// First offset of 1q work item `item` for a gate on `qubit`.
#[inline]
#[must_use]
pub fn pair_offset(item: usize, qubit: u32) -> usize {
    ((item >> qubit) << (qubit + 1)) | (item & low_mask(qubit))
}

/// The pair offset after `offset`, stepping over the half where the qubit bit is set.
#[inline]
#[must_use]
pub fn next_pair_offset(offset: usize, stride: usize) -> usize {
    let next = offset + 1;
    if next & stride == 0 { next } else { next + stride }
}

/// Offset with zero bits inserted at positions `lo < hi`.
#[inline]
#[must_use]
pub fn quad_base(item: usize, lo: u32, hi: u32) -> usize {
    let below = item & low_mask(lo);
    let between = (item >> lo) & low_mask(hi - lo - 1);
    let above = item >> (hi - 1);
    below | (between << (lo + 1)) | (above << (hi + 1))
}

/// Offset with zero bits inserted at positions `a < b < c`.
#[inline]
#[must_use]
pub fn octet_base(item: usize, a: u32, b: u32, c: u32) -> usize {
    let below = item & low_mask(a);
    let first = (item >> a) & low_mask(b - a - 1);
    let second = (item >> (b - 1)) & low_mask(c - b - 1);
    let above = item >> (c - 2);
    below | (first << (a + 1)) | (second << (b + 1)) | (above << (c + 1))
}

#[must_use]
pub fn sort2(q1: u32, q2: u32) -> (u32, u32) {
    if q1 < q2 { (q1, q2) } else { (q2, q1) }
}

#[must_use]
pub fn sort3(q1: u32, q2: u32, q3: u32) -> (u32, u32, u32) {
    let (a, b) = sort2(q1, q2);
    if q3 < a {
        (q3, a, b)
    } else if q3 < b {
        (a, q3, b)
    } else {
        (a, b, q3)
    }
}

/// The four offsets of a 2q group, ordered by local index `2 * b(q1) + b(q2)`.
#[must_use]
pub fn quad_members(item: usize, q1: u32, q2: u32) -> [usize; 4] {
    let (lo, hi) = sort2(q1, q2);
    let base = quad_base(item, lo, hi);
    let m1 = 1usize << q1;
    let m2 = 1usize << q2;
    [base, base | m2, base | m1, base | m1 | m2]
}

/// The eight offsets of a 3q group, ordered by local index `4 * b(q1) + 2 * b(q2) + b(q3)`.
#[must_use]
pub fn octet_members(item: usize, q1: u32, q2: u32, q3: u32) -> [usize; 8] {
    let (a, b, c) = sort3(q1, q2, q3);
    let base = octet_base(item, a, b, c);
    let masks = [1usize << q1, 1usize << q2, 1usize << q3];
    std::array::from_fn(|local| {
        let mut offset = base;
        if local & 4 != 0 {
            offset |= masks[0];
        }
        if local & 2 != 0 {
            offset |= masks[1];
        }
        if local & 1 != 0 {
            offset |= masks[2];
        }
        offset
    })
}

/// Range of work items handled by worker `worker` when each worker takes `items_per_worker`.
#[must_use]
pub fn worker_items(worker: usize, items_per_worker: usize) -> std::ops::Range<usize> {
    worker * items_per_worker..(worker + 1) * items_per_worker
}
