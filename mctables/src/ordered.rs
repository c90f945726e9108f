// Copyright 2022 Oxide Computer Company

//! Ordered covering minimisation. Unlike the m-Trie pass this may merge
//! entries with *different* routes into a more general pattern, relying
//! on the first-match order of the table to keep the result equivalent:
//! a merged entry is inserted at the end of the run of entries no more
//! general than it, and candidate merges are pruned until nothing
//! earlier shadows the merged entry (upcheck) and the merged entry
//! shadows nothing later (downcheck). The table must be sorted into
//! ascending order of generality and stays that way.

use crate::aliases::{AliasList, Aliases};
use crate::bitset::BitSet;
use crate::merge::Merge;
use crate::table::{Entry, KeyMask, Table};

/// The index at which an entry of the given generality would be
/// inserted: the end of the run of entries with generality no greater.
pub fn insertion_point(table: &Table, generality: u32) -> usize {
    table
        .entries
        .partition_point(|e| e.keymask.count_xs() <= generality)
}

/// Remove from the merge any entry which, once merged, would be shadowed
/// by an existing entry sitting between its current position and the
/// merge's insertion point. Scans the included entries from the highest
/// index down; every removal can shift the insertion point, so it is
/// recomputed. Once the merge is no better than `min_goodness` it is of
/// no further use to the caller and is emptied. Returns whether the
/// merge changed.
pub fn upcheck(
    merge: &mut Merge,
    table: &Table,
    min_goodness: i32,
) -> bool {
    let min_goodness = min_goodness.max(0);
    let mut changed = false;

    let mut insertion_index =
        insertion_point(table, merge.keymask().count_xs());

    for i in (0..table.len()).rev() {
        if merge.goodness() <= min_goodness {
            break;
        }
        if !merge.contains(i) {
            continue;
        }

        // Anything between this entry's position and the insertion
        // point that intersects it would match first after the merge.
        let km = table.entries[i].keymask;
        for j in (i + 1)..insertion_index {
            if km.intersects(&table.entries[j].keymask) {
                merge.remove(table, i);
                insertion_index =
                    insertion_point(table, merge.keymask().count_xs());
                changed = true;
                break;
            }
        }
    }

    if merge.goodness() <= min_goodness && !merge.is_empty() {
        merge.clear();
        changed = true;
    }
    changed
}

// Record, for each single-bit tightening of `merged` that would stop it
// matching any word of `km`, one citation against that (bit, value)
// option. The candidates are the positions where the merge is X and
// `km` is defined; setting the merge to the opposite value excludes it.
// Returns false when `km` leaves no option at all.
fn cite_options(
    merged: &KeyMask,
    km: &KeyMask,
    set_to_zero: &mut [u32; 32],
    set_to_one: &mut [u32; 32],
) -> bool {
    let settable = merged.xs() & km.mask;
    if settable == 0 {
        return false;
    }
    for b in 0..32 {
        if settable & (1 << b) == 0 {
            continue;
        }
        if km.key & (1 << b) != 0 {
            set_to_zero[b] += 1;
        } else {
            set_to_one[b] += 1;
        }
    }
    true
}

// True iff an entry with this keymask prevents the merged pattern from
// holding the wanted value at `bit`: it is X there, or holds the
// opposite value.
fn opposes(km: &KeyMask, bit: u32, to_one: bool) -> bool {
    if to_one {
        km.key & bit == 0
    } else {
        km.mask & bit == 0 || km.key & bit != 0
    }
}

/// Remove entries from the merge until the merged pattern, inserted at
/// its insertion point, would not shadow any entry later in the table.
/// For an entry recorded in the aliases map the shadowing test runs
/// against the original patterns it stands for rather than its widened
/// keymask. Each round greedily satisfies the most-cited single-bit
/// tightening (ties: fewest entries removed, then lowest bit, zero
/// before one); a shadowed pattern that no tightening can avoid empties
/// the merge, as does dropping to `min_goodness` or below.
pub fn downcheck(
    merge: &mut Merge,
    table: &Table,
    min_goodness: i32,
    aliases: &Aliases,
) {
    let min_goodness = min_goodness.max(0);

    while merge.goodness() > min_goodness {
        let merged_km = merge.keymask();
        let p = insertion_point(table, merged_km.count_xs());

        let mut set_to_zero = [0u32; 32];
        let mut set_to_one = [0u32; 32];
        let mut any_problem = false;
        let mut unavoidable = false;

        'scan: for e in &table.entries[p..] {
            let km = e.keymask;
            if !merged_km.intersects(&km) {
                continue;
            }
            match aliases.find(&km) {
                Some(list) => {
                    for akm in list.iter() {
                        if !merged_km.intersects(akm) {
                            continue;
                        }
                        any_problem = true;
                        if !cite_options(
                            &merged_km,
                            akm,
                            &mut set_to_zero,
                            &mut set_to_one,
                        ) {
                            unavoidable = true;
                            break 'scan;
                        }
                    }
                }
                None => {
                    any_problem = true;
                    if !cite_options(
                        &merged_km,
                        &km,
                        &mut set_to_zero,
                        &mut set_to_one,
                    ) {
                        unavoidable = true;
                        break 'scan;
                    }
                }
            }
        }

        if !any_problem {
            break;
        }
        if unavoidable {
            merge.clear();
            break;
        }

        // Pick the option to satisfy
        let mut best: Option<(u32, bool, u32, usize)> = None;
        for b in 0..32 {
            for (to_one, cites) in
                [(false, set_to_zero[b]), (true, set_to_one[b])]
            {
                if cites == 0 {
                    continue;
                }
                let bit = 1u32 << b;
                let removals = merge
                    .iter()
                    .filter(|&i| {
                        opposes(&table.entries[i].keymask, bit, to_one)
                    })
                    .count();
                let better = match best {
                    None => true,
                    Some((_, _, best_cites, best_removals)) => {
                        cites > best_cites
                            || (cites == best_cites
                                && removals < best_removals)
                    }
                };
                if better {
                    best = Some((bit, to_one, cites, removals));
                }
            }
        }

        // any_problem guarantees at least one citation
        let (bit, to_one, _, _) = best.unwrap();
        let removals: Vec<usize> = merge
            .iter()
            .filter(|&i| opposes(&table.entries[i].keymask, bit, to_one))
            .collect();
        for i in removals {
            merge.remove(table, i);
        }
    }

    if merge.goodness() <= min_goodness {
        merge.clear();
    }
}

/// Find the merge of same-route entries that saves the most slots while
/// keeping the table semantically equivalent. The returned merge may be
/// empty or contain a single entry, in which case no useful merge
/// exists.
pub fn best_merge(table: &Table, aliases: &Aliases) -> Merge {
    let mut considered = BitSet::new(table.len());
    let mut best = Merge::new(table);
    let mut working = Merge::new(table);

    for i in 0..table.len() {
        if considered.contains(i) {
            continue;
        }

        // Seed a merge of everything sharing this entry's route
        working.clear();
        working.add(table, i);
        considered.add(i);

        let route = table.entries[i].route;
        for j in (i + 1)..table.len() {
            if table.entries[j].route == route {
                working.add(table, j);
                considered.add(j);
            }
        }

        if working.goodness() <= best.goodness() {
            continue;
        }

        // Refine until valid, abandoning the candidate as soon as it is
        // no better than the incumbent.
        downcheck(&mut working, table, best.goodness(), aliases);
        if working.goodness() <= best.goodness() {
            continue;
        }

        // The upcheck can reopen problems below the insertion point, so
        // run the downcheck again if it removed anything.
        let changed = upcheck(&mut working, table, best.goodness());
        if changed && working.goodness() > best.goodness() {
            downcheck(&mut working, table, best.goodness(), aliases);
        }

        if working.goodness() > best.goodness() {
            std::mem::swap(&mut working, &mut best);
        }
    }

    best
}

/// Replace the merged entries by the single merged entry, inserted at
/// the end of the run of entries no more general than it. The new
/// entry's alias list collects, in included order, the original
/// patterns of each constituent: either the constituent's own keymask
/// or, for a previously merged constituent, its alias list spliced out
/// of the map.
pub fn apply_merge(
    merge: &Merge,
    table: &mut Table,
    aliases: &mut Aliases,
) {
    let n = merge.len();
    let km = merge.keymask();

    let mut route = 0x0;
    let mut source = 0x0;
    let mut list = AliasList::new(n);
    for (k, i) in merge.iter().enumerate() {
        let e = table.entries[i];
        if k == 0 {
            route = e.route;
        }
        source |= e.source;
        match aliases.remove(&e.keymask) {
            Some(existing) => list.join(existing),
            None => {
                list.append(e.keymask);
            }
        }
    }

    let p = insertion_point(table, km.count_xs());

    // Compact in place. Every merged entry sits before the insertion
    // point (its generality is no greater than the merge's), so the
    // merged entry lands at p less the number of removals.
    let len = table.len();
    let mut write = 0;
    for read in 0..p {
        if !merge.contains(read) {
            table.entries[write] = table.entries[read];
            write += 1;
        }
    }
    table.entries[write] = Entry::new(km, route, source);
    write += 1;
    for read in p..len {
        debug_assert!(!merge.contains(read));
        table.entries[write] = table.entries[read];
        write += 1;
    }
    table.entries.truncate(write);

    aliases.insert(km, list);
}

/// Minimise a generality-sorted table until it no longer exceeds
/// `target_length` or no further merge is possible. A target of 0 means
/// minimise as far as possible. Failing to reach the target is not an
/// error; the caller inspects the resulting length. The aliases map is
/// left populated for the surviving merged entries.
pub fn minimise(
    table: &mut Table,
    target_length: usize,
    aliases: &mut Aliases,
) {
    debug_assert!(table.is_sorted_by_generality());

    while table.len() > target_length {
        let merge = best_merge(table, aliases);
        if merge.len() < 2 {
            break;
        }
        apply_merge(&merge, table, aliases);
    }
}
