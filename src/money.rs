// Integer-cent arithmetic and proportional distribution.
// All monetary values are non-negative cents; no floats touch persisted state.

/// Split `total` across `weights` proportionally, returning integer amounts
/// that sum to `total` exactly.
///
/// Each slot gets `round(total * w_i / W)`; the rounding residue (which may
/// be negative) is folded into the slot with the largest weight, first such
/// slot on ties. A zero weight sum or zero total yields all zeros.
pub fn distribute(total: i64, weights: &[i64]) -> Vec<i64> {
    if weights.is_empty() {
        return Vec::new();
    }
    let weight_sum: i64 = weights.iter().sum();
    if total <= 0 || weight_sum <= 0 {
        return vec![0; weights.len()];
    }

    let mut amounts: Vec<i64> = weights
        .iter()
        .map(|&w| {
            // round-half-up of total*w/weight_sum in pure integer math
            let numer = (total as i128) * (w as i128);
            let denom = weight_sum as i128;
            ((numer + denom / 2) / denom) as i64
        })
        .collect();

    let allocated: i64 = amounts.iter().sum();
    let delta = total - allocated;
    if delta != 0 {
        let largest = weights
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(i, _)| i)
            .unwrap_or(0);
        amounts[largest] += delta;
    }
    amounts
}

/// Balance still unassigned on a transaction: total minus the parts already
/// reserved by pending cards. Never negative.
pub fn remaining(total: i64, parts: &[i64]) -> i64 {
    let used: i64 = parts.iter().sum();
    (total - used).max(0)
}

/// Sum a slice of cent amounts, failing on overflow rather than wrapping.
pub fn checked_sum(amounts: &[i64]) -> Option<i64> {
    amounts.iter().try_fold(0i64, |acc, &a| acc.checked_add(a))
}
