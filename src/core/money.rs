// Deterministic integer-cent splitting (largest remainder method).
//
// Purpose
// - Split an amount of cents across weighted parties so the pieces always
//   sum back to the input exactly, with a reproducible assignment of the
//   leftover cents.
//
// Boundaries
// - Pure arithmetic. No input or output, no clock, no randomness.
//
// Determinism contract
// - Parties are ordered by party id ascending before anything else happens.
// - Floor shares are computed as amount * weight / total_weight.
// - Leftover cents go one-by-one to parties ordered by fractional remainder
//   descending, then party id ascending. Recalculation replays rely on this
//   order being total and stable.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SplitError {
    #[error("amount must be non-negative, got {0}")]
    NegativeAmount(i64),

    #[error("no parties to split across")]
    NoParties,

    #[error("total weight must be positive")]
    ZeroTotalWeight,

    #[error("duplicate party id: {0}")]
    DuplicateParty(String),
}

/// One participant in a split: a stable identifier and a relative weight.
/// Equal splits use weight 1 for everyone; ownership splits use basis
/// points; role-weighted splits use the role's tip weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    pub id: String,
    pub weight: u64,
}

impl Party {
    pub fn new(id: impl Into<String>, weight: u64) -> Self {
        Self {
            id: id.into(),
            weight,
        }
    }
}

/// A party's resolved piece of the split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    pub id: String,
    pub amount_cents: i64,
}

/// Split `amount_cents` across `parties` proportionally to weight.
///
/// Returns one piece per party (zero-weight parties get zero cents),
/// ordered by party id ascending. The pieces always sum to `amount_cents`.
pub fn split_by_weights(amount_cents: i64, parties: &[Party]) -> Result<Vec<Piece>, SplitError> {
    if amount_cents < 0 {
        return Err(SplitError::NegativeAmount(amount_cents));
    }
    if parties.is_empty() {
        return Err(SplitError::NoParties);
    }

    let mut ordered: Vec<&Party> = parties.iter().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));
    for pair in ordered.windows(2) {
        if pair[0].id == pair[1].id {
            return Err(SplitError::DuplicateParty(pair[0].id.clone()));
        }
    }

    let total_weight: u128 = ordered.iter().map(|p| p.weight as u128).sum();
    if total_weight == 0 {
        return Err(SplitError::ZeroTotalWeight);
    }

    // Floor share plus the fractional remainder numerator for each party.
    let amount = amount_cents as u128;
    let mut floors: Vec<i64> = Vec::with_capacity(ordered.len());
    let mut remainders: Vec<u128> = Vec::with_capacity(ordered.len());
    let mut assigned: i64 = 0;
    for party in &ordered {
        let numerator = amount * party.weight as u128;
        let floor = (numerator / total_weight) as i64;
        floors.push(floor);
        remainders.push(numerator % total_weight);
        assigned += floor;
    }

    // Hand the leftover cents out largest-remainder first; ties fall back to
    // the party-id order already established above.
    let mut leftover = amount_cents - assigned;
    let mut order: Vec<usize> = (0..ordered.len()).collect();
    order.sort_by(|&a, &b| remainders[b].cmp(&remainders[a]).then(a.cmp(&b)));
    let mut extra = vec![0i64; ordered.len()];
    for &idx in order.iter().cycle() {
        if leftover == 0 {
            break;
        }
        extra[idx] += 1;
        leftover -= 1;
    }

    Ok(ordered
        .iter()
        .enumerate()
        .map(|(i, party)| Piece {
            id: party.id.clone(),
            amount_cents: floors[i] + extra[i],
        })
        .collect())
}

/// Split `amount_cents` evenly across `ids`, remainder cents to the first
/// ids in ascending order.
pub fn split_evenly(amount_cents: i64, ids: &[String]) -> Result<Vec<Piece>, SplitError> {
    let parties: Vec<Party> = ids.iter().map(|id| Party::new(id.clone(), 1)).collect();
    split_by_weights(amount_cents, &parties)
}
