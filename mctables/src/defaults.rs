// Copyright 2022 Oxide Computer Company

//! Default-route removal. The router default-routes a packet that
//! matches no table entry straight through the chip: out of the link
//! opposite the one it arrived on. An entry that does exactly that is
//! dead weight, provided no other entry could capture its packets
//! first or later.

use crate::table::Table;

// The six inter-chip links occupy route/source bits 0..=5; higher bits
// address cores and never default-route.
const N_LINKS: u32 = 6;

// True iff the bitfield is exactly one link bit.
fn single_link(field: u32) -> Option<u32> {
    if field.count_ones() == 1 {
        let bit = field.trailing_zeros();
        if bit < N_LINKS {
            return Some(bit);
        }
    }
    None
}

// An entry is default-routed when it takes a packet from one link and
// sends it out of the diametrically opposite one.
fn is_default_route(source: u32, route: u32) -> bool {
    match (single_link(source), single_link(route)) {
        (Some(s), Some(r)) => (s + N_LINKS / 2) % N_LINKS == r,
        _ => false,
    }
}

/// Drop every entry whose effect is identical to default routing. An
/// entry is only dropped when no *other* entry's pattern intersects
/// its own: if one does, removing the entry would let the other capture
/// its packets. Surviving entries keep their order, sources and routes.
pub fn minimise(table: &mut Table) {
    let keep: Vec<bool> = table
        .entries
        .iter()
        .enumerate()
        .map(|(i, e)| {
            if !is_default_route(e.source, e.route) {
                return true;
            }
            table
                .entries
                .iter()
                .enumerate()
                .any(|(j, other)| {
                    j != i && e.keymask.intersects(&other.keymask)
                })
        })
        .collect();

    let mut keep = keep.iter();
    table.entries.retain(|_| *keep.next().unwrap());
}
