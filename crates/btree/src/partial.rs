use std::cmp::Ordering;

/// How a range scan decides whether a candidate entry belongs to the
/// current query, in place of the source's per-index function-pointer
/// fields on `Idx`. Implementations encode the "same prefix, tolerate
/// dirty neighbors" logic secondary indexes and the FSM each need.
///
/// Returns `Less` when the candidate's discriminating prefix differs
/// from the query's (scanning should stop), `Equal` for a match to
/// include, and `Greater` when the candidate doesn't match but the scan
/// should keep going — typically because the candidate is tombstoned
/// and a live match may still follow it.
pub trait PartialMatch {
    fn compare(&self, query_key: &[u8], candidate: &[u8]) -> Ordering;
}

/// The default strategy: a candidate matches only if its key (minus the
/// trailing dirty-flag byte) is byte-identical to the query key.
pub struct ExactMatch;

impl PartialMatch for ExactMatch {
    fn compare(&self, query_key: &[u8], candidate: &[u8]) -> Ordering {
        let key_len = query_key.len();
        match candidate[..key_len].cmp(query_key) {
            Ordering::Equal => Ordering::Equal,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_compares_prefix_only() {
        let m = ExactMatch;
        assert_eq!(m.compare(b"abc", b"abcX"), Ordering::Equal);
        assert_eq!(m.compare(b"abc", b"abdX"), Ordering::Less);
    }
}
