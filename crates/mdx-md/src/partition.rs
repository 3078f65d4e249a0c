//! Subscription partitioner.
//!
//! The exchange enforces a hard per-session subscription-count limit and
//! rejects sessions that exceed it, so the request list is pre-partitioned
//! into groups of at most `cap` entries, one group per transport session.

use mdx_core::types::SubscriptionRequest;

/// Split `requests` into ordered groups of at most `cap` entries.
///
/// Input order is preserved: concatenating the groups yields the input list.
/// The last group may be smaller. `cap` must be non-zero.
pub fn partition(requests: Vec<SubscriptionRequest>, cap: usize) -> Vec<Vec<SubscriptionRequest>> {
    assert!(cap > 0, "subscription cap must be non-zero");
    let mut groups = Vec::with_capacity(requests.len().div_ceil(cap));
    let mut iter = requests.into_iter();
    loop {
        let group: Vec<SubscriptionRequest> = iter.by_ref().take(cap).collect();
        if group.is_empty() {
            break;
        }
        groups.push(group);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdx_core::types::ChannelKind;

    fn requests(n: usize) -> Vec<SubscriptionRequest> {
        (0..n)
            .map(|i| SubscriptionRequest::new(ChannelKind::Trade, format!("PAIR{i}/USD")))
            .collect()
    }

    #[test]
    fn sixty_five_at_cap_thirty() {
        let groups = partition(requests(65), 30);
        let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![30, 30, 5]);
    }

    #[test]
    fn concatenation_equals_input() {
        let input = requests(17);
        let groups = partition(input.clone(), 4);
        let flattened: Vec<SubscriptionRequest> = groups.into_iter().flatten().collect();
        assert_eq!(flattened, input);
    }

    #[test]
    fn exact_multiple_has_no_runt_group() {
        let groups = partition(requests(12), 4);
        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| g.len() == 4));
    }

    #[test]
    fn short_input_yields_single_group() {
        let groups = partition(requests(3), 30);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 3);
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert!(partition(Vec::new(), 30).is_empty());
    }
}
