//! Routing table reconciliation.
//!
//! Every SPF run bumps the table version and refreshes the paths of all reachable vertices.
//! [`RoutingTable::reconcile`] then drops paths left at an older version, elects the best
//! path per prefix and diffs it against what the kernel was last told.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::concepts::prefix::Prefix;
use crate::concepts::route::{KernelOp, NextHop, RouteEntry, RouteMetric, RouteOp, RoutePath};
use crate::framework::{FibMetric, RoutingSystem};

/// Kernel metric used for every route in flat mode
const FLAT_FIB_METRIC: u32 = 2;

#[serde_as]
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct RoutingTable<T: RoutingSystem + ?Sized> {
    #[serde_as(as = "Vec<(_, _)>")]
    entries: BTreeMap<Prefix<T::Address>, RouteEntry<T>>,
    version: u64,
}

impl<T: RoutingSystem + ?Sized> Default for RoutingTable<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            version: 0,
        }
    }
}

fn fib_value(mode: FibMetric, metric: &RouteMetric) -> u32 {
    match mode {
        FibMetric::Flat => FLAT_FIB_METRIC,
        FibMetric::Correct => metric.hops as u32,
    }
}

impl<T: RoutingSystem + ?Sized> RoutingTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new computation, paths not refreshed before the next reconcile are stale
    pub fn begin(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Creates or refreshes the path to `prefix` advertised by `originator`
    pub fn insert_path(
        &mut self,
        prefix: Prefix<T::Address>,
        originator: T::Address,
        metric: RouteMetric,
        next_hop: NextHop<T>,
    ) {
        let version = self.version;
        let entry = self.entries.entry(prefix).or_insert_with(|| RouteEntry {
            prefix,
            paths: BTreeMap::new(),
            best: None,
            installed: None,
        });
        entry.paths.insert(
            originator,
            RoutePath {
                originator,
                metric,
                next_hop,
                version,
            },
        );
    }

    /// Purges stale paths, elects best paths and returns the kernel operations needed:
    /// deletions first, then changes, then additions by ascending hop count
    pub fn reconcile(&mut self, mode: FibMetric) -> Vec<KernelOp<T>> {
        let version = self.version;
        let mut deletes = Vec::new();
        let mut changes = Vec::new();
        let mut adds = Vec::new();

        self.entries.retain(|prefix, entry| {
            entry.paths.retain(|_, path| path.version == version);
            entry.best = entry
                .paths
                .values()
                .min_by_key(|path| (path.metric.cost, path.metric.hops, path.originator))
                .map(|path| path.originator);

            let Some(best) = entry.best_path() else {
                if let Some((next_hop, metric)) = entry.installed.take() {
                    debug!("route to {prefix} is gone");
                    deletes.push(KernelOp {
                        op: RouteOp::Delete,
                        prefix: *prefix,
                        next_hop,
                        metric: fib_value(mode, &metric),
                    });
                }
                return false;
            };
            let (next_hop, metric) = (best.next_hop.clone(), best.metric);

            match &entry.installed {
                None => adds.push((
                    metric.hops,
                    KernelOp {
                        op: RouteOp::Add,
                        prefix: *prefix,
                        next_hop: next_hop.clone(),
                        metric: fib_value(mode, &metric),
                    },
                )),
                Some((installed_hop, installed_metric))
                    if *installed_hop != next_hop
                        || (mode == FibMetric::Correct && installed_metric.hops != metric.hops) =>
                {
                    changes.push(KernelOp {
                        op: RouteOp::Change,
                        prefix: *prefix,
                        next_hop: next_hop.clone(),
                        metric: fib_value(mode, &metric),
                    })
                }
                Some(_) => {}
            }
            entry.installed = Some((next_hop, metric));
            true
        });

        adds.sort_by_key(|(hops, _)| *hops);
        deletes
            .into_iter()
            .chain(changes)
            .chain(adds.into_iter().map(|(_, op)| op))
            .collect()
    }

    /// Drops every route, used when the router has no identity left
    pub fn flush(&mut self, mode: FibMetric) -> Vec<KernelOp<T>> {
        self.begin();
        self.reconcile(mode)
    }

    pub fn get(&self, prefix: &Prefix<T::Address>) -> Option<&RouteEntry<T>> {
        self.entries.get(prefix)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Prefix<T::Address>, &RouteEntry<T>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    struct Sys;
    impl RoutingSystem for Sys {
        type Address = Ipv4Addr;
        type InterfaceId = u8;
    }

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    fn via(last: u8) -> NextHop<Sys> {
        NextHop {
            gateway: addr(last),
            interface: 0,
        }
    }

    fn metric(cost: u32, hops: u8) -> RouteMetric {
        RouteMetric { cost, hops }
    }

    #[test]
    fn stale_paths_and_entries_are_purged() {
        let mut table = RoutingTable::<Sys>::new();
        let dest = Prefix::new(Ipv4Addr::new(192, 168, 1, 0), 24);

        table.begin();
        table.insert_path(dest, addr(5), metric(300, 3), via(2));
        table.insert_path(dest, addr(6), metric(200, 2), via(3));
        let ops = table.reconcile(FibMetric::Correct);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op, RouteOp::Add);
        assert_eq!(ops[0].next_hop, via(3));
        assert_eq!(ops[0].metric, 2);

        table.begin();
        table.insert_path(dest, addr(5), metric(300, 3), via(2));
        let ops = table.reconcile(FibMetric::Correct);
        let entry = table.get(&dest).unwrap();
        assert_eq!(entry.paths.len(), 1);
        assert_eq!(entry.best, Some(addr(5)));
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op, RouteOp::Change);
        assert_eq!(ops[0].next_hop, via(2));

        let ops = table.flush(FibMetric::Correct);
        assert!(table.is_empty());
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op, RouteOp::Delete);
        assert_eq!(ops[0].next_hop, via(2));
    }

    #[test]
    fn best_path_tie_breaks() {
        let mut table = RoutingTable::<Sys>::new();
        let dest = Prefix::host(addr(9));
        table.begin();
        table.insert_path(dest, addr(8), metric(100, 3), via(4));
        table.insert_path(dest, addr(7), metric(100, 2), via(5));
        table.insert_path(dest, addr(6), metric(100, 2), via(6));
        table.reconcile(FibMetric::Flat);
        // equal cost, fewer hops, then lowest originator
        assert_eq!(table.get(&dest).unwrap().best, Some(addr(6)));
    }

    #[test]
    fn operation_order_and_flat_metric() {
        let mut table = RoutingTable::<Sys>::new();
        table.begin();
        table.insert_path(Prefix::host(addr(1)), addr(1), metric(10, 1), via(1));
        table.insert_path(Prefix::host(addr(2)), addr(2), metric(20, 2), via(1));
        table.reconcile(FibMetric::Flat);

        table.begin();
        // hop count only change, not pushed in flat mode
        table.insert_path(Prefix::host(addr(2)), addr(2), metric(30, 3), via(1));
        table.insert_path(Prefix::host(addr(4)), addr(4), metric(50, 4), via(1));
        table.insert_path(Prefix::host(addr(3)), addr(3), metric(40, 2), via(1));
        let ops = table.reconcile(FibMetric::Flat);
        let kinds: Vec<_> = ops.iter().map(|op| (op.op, op.prefix.addr)).collect();
        assert_eq!(
            kinds,
            vec![
                (RouteOp::Delete, addr(1)),
                (RouteOp::Add, addr(3)),
                (RouteOp::Add, addr(4)),
            ]
        );
        assert!(ops.iter().all(|op| op.metric == FLAT_FIB_METRIC));

        table.begin();
        table.insert_path(Prefix::host(addr(2)), addr(2), metric(30, 4), via(1));
        table.insert_path(Prefix::host(addr(3)), addr(3), metric(40, 2), via(1));
        table.insert_path(Prefix::host(addr(4)), addr(4), metric(50, 4), via(1));
        let ops = table.reconcile(FibMetric::Correct);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op, RouteOp::Change);
        assert_eq!(ops[0].metric, 4);
    }
}
