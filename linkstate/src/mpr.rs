//! Multipoint relay selection.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use crate::concepts::neighbour::{Neighbour, WILL_ALWAYS, WILL_NEVER};
use crate::framework::RoutingSystem;

/// Picks the neighbours that relay our broadcasts so that every strict two-hop neighbour is
/// reached: willing-always neighbours first, then sole coverers of some two-hop neighbour,
/// then greedily by willingness and coverage. `local` holds our own interface addresses.
pub fn select_mprs<T: RoutingSystem + ?Sized>(
    neighbours: &BTreeMap<T::Address, Neighbour<T>>,
    local: &BTreeSet<T::Address>,
) -> BTreeSet<T::Address> {
    let eligible: Vec<&Neighbour<T>> = neighbours
        .values()
        .filter(|n| n.is_sym && n.willingness != WILL_NEVER)
        .collect();

    let one_hop: BTreeSet<T::Address> = neighbours
        .values()
        .filter(|n| n.is_sym)
        .map(|n| n.addr)
        .collect();
    let mut uncovered: BTreeSet<T::Address> = eligible
        .iter()
        .flat_map(|n| n.two_hop.iter().copied())
        .filter(|addr| !one_hop.contains(addr) && !local.contains(addr))
        .collect();

    let mut mprs = BTreeSet::new();

    for n in eligible.iter().filter(|n| n.willingness == WILL_ALWAYS) {
        choose(*n, &mut mprs, &mut uncovered);
    }

    let sole: Vec<&Neighbour<T>> = uncovered
        .iter()
        .filter_map(|addr| {
            let mut coverers = eligible.iter().filter(|n| n.two_hop.contains(addr));
            match (coverers.next(), coverers.next()) {
                (Some(only), None) => Some(*only),
                _ => None,
            }
        })
        .collect();
    for n in sole {
        choose(n, &mut mprs, &mut uncovered);
    }

    while !uncovered.is_empty() {
        let best = eligible
            .iter()
            .filter(|n| !mprs.contains(&n.addr))
            .map(|n| (n, n.two_hop.intersection(&uncovered).count()))
            .filter(|(_, reach)| *reach > 0)
            .max_by_key(|(n, reach)| (n.willingness, *reach, Reverse(n.addr)));
        let Some((n, _)) = best else {
            break;
        };
        choose(*n, &mut mprs, &mut uncovered);
    }
    mprs
}

fn choose<T: RoutingSystem + ?Sized>(
    n: &Neighbour<T>,
    mprs: &mut BTreeSet<T::Address>,
    uncovered: &mut BTreeSet<T::Address>,
) {
    mprs.insert(n.addr);
    for addr in &n.two_hop {
        uncovered.remove(addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concepts::neighbour::{WILL_DEFAULT, WILL_HIGH};
    use std::net::Ipv4Addr;

    struct Sys;
    impl RoutingSystem for Sys {
        type Address = Ipv4Addr;
        type InterfaceId = u8;
    }

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    fn neighbour(last: u8, willingness: u8, two_hop: &[u8]) -> (Ipv4Addr, Neighbour<Sys>) {
        let mut n = Neighbour::new(addr(last));
        n.is_sym = true;
        n.willingness = willingness;
        n.two_hop = two_hop.iter().map(|l| addr(*l)).collect();
        (addr(last), n)
    }

    fn local() -> BTreeSet<Ipv4Addr> {
        [addr(1)].into()
    }

    #[test]
    fn sole_coverer_and_greedy_choice() {
        let neighbours: BTreeMap<_, _> = [
            neighbour(2, WILL_DEFAULT, &[1, 5, 6]),
            neighbour(3, WILL_DEFAULT, &[1, 5]),
            neighbour(4, WILL_DEFAULT, &[1, 7]),
        ]
        .into();
        let mprs = select_mprs(&neighbours, &local());
        // 4 is the only way to 7, 2 covers both 5 and 6
        assert_eq!(mprs, [addr(2), addr(4)].into());
    }

    #[test]
    fn willingness_is_respected() {
        let neighbours: BTreeMap<_, _> = [
            neighbour(2, WILL_NEVER, &[5]),
            neighbour(3, WILL_DEFAULT, &[5]),
            neighbour(4, WILL_HIGH, &[5]),
            neighbour(6, WILL_ALWAYS, &[]),
        ]
        .into();
        let mprs = select_mprs(&neighbours, &local());
        assert_eq!(mprs, [addr(4), addr(6)].into());
    }

    #[test]
    fn one_hop_neighbours_need_no_relay() {
        let neighbours: BTreeMap<_, _> = [
            neighbour(2, WILL_DEFAULT, &[1, 3]),
            neighbour(3, WILL_DEFAULT, &[1, 2]),
        ]
        .into();
        assert!(select_mprs(&neighbours, &local()).is_empty());
    }
}
