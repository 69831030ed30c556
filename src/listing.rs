//! Reconciliation, sorting and aggregation of the connection listing.

use crate::directory::RelayContext;
use crate::entries::{Category, Entry, EntryLine, ListingMode, SortAttr};
use crate::source::ConnTuple;
use chrono::{DateTime, Local};
use std::collections::HashSet;

/// Title shown when no connection has been counted.
pub const BARE_TITLE: &str = "Connections:";

/// Merges a new sample into the previous entries.
///
/// Connection entries whose tuple is still present are carried over as the
/// same object (with their display flags reset) and a new entry is made
/// for every tuple not seen before. Connections absent from the sample are
/// dropped. Non-connection entries are never carried over: they are rebuilt
/// from their own source on every pass.
///
/// The returned order is carried-over entries followed by new ones; callers
/// sort it before use.
pub fn reconcile(previous: &[Entry], sample: &[ConnTuple], now: DateTime<Local>) -> Vec<Entry> {
    let mut remaining: HashSet<ConnTuple> = sample.iter().copied().collect();
    let mut accepted = Vec::with_capacity(remaining.len());

    for entry in previous {
        if let Entry::Connection(conn) = entry {
            if remaining.remove(conn.tuple()) {
                accepted.push(entry.clone());
            }
        }
    }

    for entry in &accepted {
        entry.reset_display();
    }

    let carried = accepted.len();
    let mut added = HashSet::with_capacity(remaining.len());
    for tuple in sample {
        if remaining.contains(tuple) && added.insert(*tuple) {
            accepted.push(Entry::connection(*tuple, now));
        }
    }

    log::debug!(
        "Reconciled {} connections ({} kept, {} new, {} closed)",
        accepted.len(),
        carried,
        accepted.len() - carried,
        previous
            .iter()
            .filter(|entry| entry.as_connection().is_some())
            .count()
            - carried
    );

    accepted
}

/// Stable sort by the composite key of `keys`, read in `mode`.
pub fn sort_entries(entries: &mut [Entry], keys: &[SortAttr], mode: ListingMode, ctx: &RelayContext) {
    entries.sort_by_cached_key(|entry| entry.sort_values(keys, mode, ctx));
}

/// The displayed lines of all entries, in entry order.
pub fn flatten_lines(entries: &[Entry]) -> Vec<EntryLine> {
    entries.iter().flat_map(Entry::lines).collect()
}

/// Builds the panel title from per-category connection counts, e.g.
/// `Connections (21 outbound, 1 control):`.
///
/// This is also where each connection's cached category is refreshed,
/// since classification depends on directory contents that change between
/// polls.
pub fn derive_title(entries: &[Entry], ctx: &RelayContext) -> String {
    let mut counts = [0usize; Category::ALL.len()];

    for conn in entries.iter().filter_map(Entry::as_connection) {
        counts[conn.refresh_category(ctx) as usize] += 1;
    }

    title_from_counts(&counts)
}

fn title_from_counts(counts: &[usize; Category::ALL.len()]) -> String {
    let labels: Vec<String> = Category::ALL
        .iter()
        .zip(counts)
        .filter(|(_, count)| **count > 0)
        .map(|(category, count)| format!("{count} {}", category.name().to_lowercase()))
        .collect();

    if labels.is_empty() {
        BARE_TITLE.to_string()
    } else {
        format!("Connections ({}):", labels.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{LocalRelay, Relay, RelayDirectory};
    use crate::entries::DEFAULT_SORT_ORDER;
    use crate::source::CircuitPath;
    use chrono::Duration;

    fn tuple(local: &str, local_port: u16, remote: &str, remote_port: u16) -> ConnTuple {
        ConnTuple {
            local_addr: local.parse().unwrap(),
            local_port,
            remote_addr: remote.parse().unwrap(),
            remote_port,
        }
    }

    fn ids(entries: &[Entry]) -> Vec<u64> {
        entries.iter().map(Entry::id).collect()
    }

    #[test]
    fn test_reconcile_keeps_surviving_entries() {
        let a2 = tuple("10.0.0.1", 1, "10.0.0.2", 2);
        let a3 = tuple("10.0.0.1", 1, "10.0.0.2", 3);
        let a4 = tuple("10.0.0.1", 1, "10.0.0.2", 4);
        let now = Local::now();

        let first = reconcile(&[], &[a2, a3], now);
        let second = reconcile(&first, &[a2, a4], now + Duration::seconds(5));

        assert_eq!(second.len(), 2);
        assert!(second[0].ptr_eq(&first[0]));
        assert_eq!(second[0].as_connection().unwrap().tuple(), &a2);
        assert_eq!(second[1].as_connection().unwrap().tuple(), &a4);
        assert!(!first.iter().any(|old| old.ptr_eq(&second[1])));

        // the kept entry keeps its first-seen time
        assert_eq!(second[0].as_connection().unwrap().started(), now);
    }

    #[test]
    fn test_reconcile_resets_carried_display_flags() {
        let a = tuple("10.0.0.1", 1, "10.0.0.2", 2);
        let b = tuple("10.0.0.1", 1, "10.0.0.2", 3);

        let first = reconcile(&[], &[a], Local::now());
        assert!(first[0].as_connection().unwrap().is_fresh());

        let second = reconcile(&first, &[a, b], Local::now());
        assert!(!second[0].as_connection().unwrap().is_fresh());
        assert!(second[1].as_connection().unwrap().is_fresh());
    }

    #[test]
    fn test_reconcile_drops_non_connection_entries() {
        let a = tuple("10.0.0.1", 1, "10.0.0.2", 2);
        let mut previous = reconcile(&[], &[a], Local::now());
        previous.push(Entry::circuit(CircuitPath {
            id: 1,
            hops: vec!["moria1".to_string()],
        }));

        let next = reconcile(&previous, &[a], Local::now());
        assert_eq!(next.len(), 1);
        assert!(next[0].ptr_eq(&previous[0]));
    }

    #[test]
    fn test_reconcile_collapses_duplicate_tuples() {
        let a = tuple("10.0.0.1", 1, "10.0.0.2", 2);
        let entries = reconcile(&[], &[a, a, a], Local::now());
        assert_eq!(entries.len(), 1);

        let again = reconcile(&entries, &[a, a], Local::now());
        assert_eq!(ids(&again), ids(&entries));
    }

    #[test]
    fn test_reconcile_set_difference() {
        let sample_a: Vec<ConnTuple> = (1..=5).map(|p| tuple("10.0.0.1", 1, "10.0.0.9", p)).collect();
        let sample_b: Vec<ConnTuple> = (4..=8).map(|p| tuple("10.0.0.1", 1, "10.0.0.9", p)).collect();

        let first = reconcile(&[], &sample_a, Local::now());
        let second = reconcile(&first, &sample_b, Local::now());

        let new: Vec<u16> = second
            .iter()
            .filter(|e| !first.iter().any(|old| old.ptr_eq(e)))
            .map(|e| e.as_connection().unwrap().tuple().remote_port)
            .collect();
        assert_eq!(new, vec![6, 7, 8]);

        let ports: HashSet<u16> = second
            .iter()
            .map(|e| e.as_connection().unwrap().tuple().remote_port)
            .collect();
        assert!(ports.iter().all(|p| (4..=8).contains(p)));
    }

    fn context() -> RelayContext {
        let mut directory = RelayDirectory::new();
        directory.add_relay(Relay {
            fingerprint: "B".repeat(40),
            nickname: "bravo".to_string(),
            address: "10.0.0.20".parse().unwrap(),
            or_port: 9001,
        });
        directory.add_relay(Relay {
            fingerprint: "A".repeat(40),
            nickname: "alpha".to_string(),
            address: "10.0.0.30".parse().unwrap(),
            or_port: 9001,
        });

        RelayContext::new(
            directory,
            LocalRelay {
                or_port: Some(9001),
                control_port: Some(9051),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_sort_by_category_then_listing() {
        let ctx = context();
        let now = Local::now();
        let mut entries = reconcile(
            &[],
            &[
                tuple("127.0.0.1", 9051, "127.0.0.1", 50000),
                tuple("10.0.0.1", 40000, "10.0.0.30", 9001),
                tuple("10.0.0.1", 9001, "10.0.0.99", 41000),
                tuple("10.0.0.1", 40001, "10.0.0.20", 9001),
            ],
            now,
        );

        sort_entries(&mut entries, &DEFAULT_SORT_ORDER, ListingMode::IpAddress, &ctx);
        let remotes: Vec<u16> = entries
            .iter()
            .map(|e| e.as_connection().unwrap().tuple().remote_port)
            .collect();
        // inbound, outbound .20, outbound .30, control
        assert_eq!(remotes, vec![41000, 9001, 9001, 50000]);
        assert_eq!(
            entries[1].as_connection().unwrap().tuple().remote_addr.to_string(),
            "10.0.0.20"
        );

        // nickname ordering puts alpha (.30) before bravo (.20)
        sort_entries(&mut entries, &DEFAULT_SORT_ORDER, ListingMode::Nickname, &ctx);
        assert_eq!(
            entries[1].as_connection().unwrap().tuple().remote_addr.to_string(),
            "10.0.0.30"
        );
    }

    #[test]
    fn test_sort_is_stable_for_equal_keys() {
        let ctx = context();
        let mut entries = reconcile(
            &[],
            &[
                tuple("10.0.0.1", 40000, "8.8.8.8", 53),
                tuple("10.0.0.1", 40001, "8.8.4.4", 53),
                tuple("10.0.0.1", 40002, "1.1.1.1", 53),
            ],
            Local::now(),
        );
        let before = ids(&entries);

        // every entry is outbound with an unknown nickname
        sort_entries(&mut entries, &[SortAttr::Category, SortAttr::Nickname], ListingMode::IpAddress, &ctx);
        assert_eq!(ids(&entries), before);
    }

    #[test]
    fn test_flatten_lines_follows_entry_order() {
        let mut entries = reconcile(&[], &[tuple("10.0.0.1", 1, "10.0.0.2", 2)], Local::now());
        entries.push(Entry::circuit(CircuitPath {
            id: 3,
            hops: vec!["alpha".to_string(), "bravo".to_string()],
        }));

        let lines = flatten_lines(&entries);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].entry().id(), entries[0].id());
        assert_eq!(lines[3].index(), 2);
    }

    #[test]
    fn test_title_from_counts() {
        let mut counts = [0usize; Category::ALL.len()];
        assert_eq!(title_from_counts(&counts), "Connections:");

        counts[Category::Outbound as usize] = 3;
        counts[Category::Control as usize] = 1;
        assert_eq!(
            title_from_counts(&counts),
            "Connections (3 outbound, 1 control):"
        );
    }

    #[test]
    fn test_derive_title_ignores_circuits() {
        let ctx = context();
        let mut entries = reconcile(
            &[],
            &[
                tuple("10.0.0.1", 40000, "10.0.0.30", 9001),
                tuple("10.0.0.1", 9001, "10.0.0.99", 41000),
            ],
            Local::now(),
        );
        assert_eq!(derive_title(&entries, &ctx), "Connections (1 inbound, 1 outbound):");

        entries.push(Entry::circuit(CircuitPath {
            id: 3,
            hops: vec!["alpha".to_string()],
        }));
        assert_eq!(derive_title(&entries, &ctx), "Connections (1 inbound, 1 outbound):");
        assert_eq!(derive_title(&[], &ctx), "Connections:");
    }
}
