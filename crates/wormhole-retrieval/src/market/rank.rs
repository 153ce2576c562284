//! Candidate ranking.
//!
//! Order, most preferred first:
//! 1. no unsealing required, regardless of price
//! 2. lower total cost (`price_per_byte * size + unseal_price`)
//! 3. smaller advertised size
//! 4. input order (the sort is stable)

use std::cmp::Ordering;

use super::attempt::CandidateQuery;
use super::Quote;

/// Preference order between two quotes. `Less` means `a` is tried first.
pub fn compare_quotes(a: &Quote, b: &Quote) -> Ordering {
    a.requires_unseal()
        .cmp(&b.requires_unseal())
        .then_with(|| a.total_cost().cmp(&b.total_cost()))
        .then_with(|| a.size.cmp(&b.size))
}

/// Sort answered queries into attempt order.
pub fn rank(queries: &mut [CandidateQuery]) {
    queries.sort_by(|a, b| compare_quotes(&a.quote, &b.quote));
}
