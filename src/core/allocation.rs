// Allocation engine: one tip-bearing event in, per-employee cents out.
//
// Purpose
// - Split a tip first by order ownership, then through the tip group
//   segment active at the event timestamp. Output always sums exactly to
//   the input amount.
//
// Boundaries
// - Pure function of its inputs. Group state, ownership and policy are
//   passed in; nothing ambient is read, so recalculation can replay the
//   same inputs and get byte-identical output.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::group::{SplitMode, TipGroup};
use crate::core::money::{Party, SplitError, split_by_weights};

pub const FULL_OWNERSHIP_BASIS_POINTS: u64 = 10_000;

/// One employee's share of an order, in basis points of the total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipEntry {
    pub employee_id: String,
    pub basis_points: u64,
}

/// Who owns an order/tab, and at what share. Shares sum to 10_000.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderOwnership {
    pub order_id: String,
    pub entries: Vec<OwnershipEntry>,
}

impl OrderOwnership {
    /// The common case: one server owns the whole tab.
    pub fn sole(order_id: impl Into<String>, employee_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            entries: vec![OwnershipEntry {
                employee_id: employee_id.into(),
                basis_points: FULL_OWNERSHIP_BASIS_POINTS,
            }],
        }
    }

    pub fn validate(&self) -> Result<(), AllocationError> {
        if self.entries.is_empty() {
            return Err(AllocationError::EmptyOwnership);
        }
        let total: u64 = self.entries.iter().map(|e| e.basis_points).sum();
        if total != FULL_OWNERSHIP_BASIS_POINTS {
            return Err(AllocationError::OwnershipNotFull { basis_points: total });
        }
        Ok(())
    }
}

/// Why an employee received a share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareBasis {
    /// Owner kept their slice; no pool covered them at the event time.
    DirectTip,
    /// Slice flowed through a tip group segment.
    GroupShare,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationShare {
    pub employee_id: String,
    pub amount_cents: i64,
    pub basis: ShareBasis,
    pub group_id: Option<String>,
    pub segment_id: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("order ownership has no entries")]
    EmptyOwnership,

    #[error("ownership shares must sum to 10000 basis points, got {basis_points}")]
    OwnershipNotFull { basis_points: u64 },

    #[error(transparent)]
    Split(#[from] SplitError),
}

/// Split `amount_cents` for an event that occurred at `occurred_at`.
///
/// `groups` are the location's tip groups; only the segment active at the
/// event timestamp is consulted, never current membership. Shares are
/// returned ordered by employee id, then group id, merged per employee per
/// pool.
pub fn allocate(
    amount_cents: i64,
    occurred_at: i64,
    ownership: &OrderOwnership,
    groups: &[TipGroup],
) -> Result<Vec<AllocationShare>, AllocationError> {
    if amount_cents <= 0 {
        return Err(AllocationError::NonPositiveAmount(amount_cents));
    }
    ownership.validate()?;

    let owner_parties: Vec<Party> = ownership
        .entries
        .iter()
        .map(|e| Party::new(e.employee_id.clone(), e.basis_points))
        .collect();
    let owner_slices = split_by_weights(amount_cents, &owner_parties)?;

    let mut shares: Vec<AllocationShare> = Vec::new();
    for slice in owner_slices {
        if slice.amount_cents == 0 {
            continue;
        }
        let pool = groups.iter().find_map(|g| {
            g.segment_at(occurred_at)
                .filter(|s| s.contains(&slice.id))
                .map(|s| (g, s))
        });
        match pool {
            Some((group, segment)) => {
                let parties: Vec<Party> = segment
                    .members
                    .iter()
                    .map(|m| {
                        let weight = match group.split_mode {
                            SplitMode::Equal => 1,
                            SplitMode::RoleWeighted => m.tip_weight,
                        };
                        Party::new(m.employee_id.clone(), weight)
                    })
                    .collect();
                for piece in split_by_weights(slice.amount_cents, &parties)? {
                    if piece.amount_cents == 0 {
                        continue;
                    }
                    merge(
                        &mut shares,
                        AllocationShare {
                            employee_id: piece.id,
                            amount_cents: piece.amount_cents,
                            basis: ShareBasis::GroupShare,
                            group_id: Some(group.id.clone()),
                            segment_id: Some(segment.id.clone()),
                        },
                    );
                }
            }
            None => merge(
                &mut shares,
                AllocationShare {
                    employee_id: slice.id,
                    amount_cents: slice.amount_cents,
                    basis: ShareBasis::DirectTip,
                    group_id: None,
                    segment_id: None,
                },
            ),
        }
    }

    shares.sort_by(|a, b| {
        a.employee_id
            .cmp(&b.employee_id)
            .then_with(|| a.group_id.cmp(&b.group_id))
    });
    Ok(shares)
}

/// Fold a share into the accumulator, merging with an existing share for
/// the same employee and pool.
fn merge(shares: &mut Vec<AllocationShare>, share: AllocationShare) {
    if let Some(existing) = shares.iter_mut().find(|s| {
        s.employee_id == share.employee_id
            && s.basis == share.basis
            && s.group_id == share.group_id
            && s.segment_id == share.segment_id
    }) {
        existing.amount_cents += share.amount_cents;
    } else {
        shares.push(share);
    }
}
