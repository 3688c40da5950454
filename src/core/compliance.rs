// Compliance checks: advisory only, never enforced at write time.
//
// Purpose
// - Evaluate jurisdiction-dependent rules (reported-tip minimums, tip-out
//   caps, pool eligibility) over report data and return warnings.
//
// Boundaries
// - Pure. Never blocks or mutates a posting; labor and tax rules vary by
//   jurisdiction and must stay out of the transactional path.

use serde::{Deserialize, Serialize};

use crate::core::group::TipGroup;

/// Thresholds for a location, supplied by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceRules {
    /// Reported tips below this share of attributed sales get flagged
    /// (IRS 8027-style allocation floor). Basis points of sales.
    pub min_reported_tip_basis_points: u64,
    /// Tip-outs above this share of an employee's tips get flagged.
    pub max_tipout_basis_points: u64,
}

impl Default for ComplianceRules {
    fn default() -> Self {
        Self {
            min_reported_tip_basis_points: 800,
            max_tipout_basis_points: 5000,
        }
    }
}

/// One employee's figures for a reporting period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeePeriodFigures {
    pub employee_id: String,
    pub attributed_sales_cents: i64,
    pub reported_tip_cents: i64,
    /// Cents moved out to other employees via role tip-outs and transfers.
    pub tipped_out_cents: i64,
    /// Clock-in windows for the period, [start, end) epoch millis.
    pub shift_windows: Vec<(i64, i64)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ComplianceWarning {
    ReportedTipsBelowMinimum {
        employee_id: String,
        reported_cents: i64,
        expected_minimum_cents: i64,
    },
    TipoutExceedsCap {
        employee_id: String,
        tipped_out_cents: i64,
        cap_cents: i64,
    },
    PoolMemberNotClockedIn {
        employee_id: String,
        group_id: String,
        segment_id: String,
    },
}

/// Run every rule over the period figures and group history. Returns all
/// warnings found, in input order.
pub fn evaluate(
    rules: &ComplianceRules,
    figures: &[EmployeePeriodFigures],
    groups: &[TipGroup],
) -> Vec<ComplianceWarning> {
    let mut warnings = Vec::new();
    for f in figures {
        warnings.extend(check_reported_minimum(rules, f));
        warnings.extend(check_tipout_cap(rules, f));
    }
    warnings.extend(check_pool_eligibility(figures, groups));
    warnings
}

fn check_reported_minimum(
    rules: &ComplianceRules,
    f: &EmployeePeriodFigures,
) -> Option<ComplianceWarning> {
    if f.attributed_sales_cents <= 0 {
        return None;
    }
    let expected =
        f.attributed_sales_cents * rules.min_reported_tip_basis_points as i64 / 10_000;
    (f.reported_tip_cents < expected).then(|| ComplianceWarning::ReportedTipsBelowMinimum {
        employee_id: f.employee_id.clone(),
        reported_cents: f.reported_tip_cents,
        expected_minimum_cents: expected,
    })
}

fn check_tipout_cap(
    rules: &ComplianceRules,
    f: &EmployeePeriodFigures,
) -> Option<ComplianceWarning> {
    if f.reported_tip_cents <= 0 {
        return None;
    }
    let cap = f.reported_tip_cents * rules.max_tipout_basis_points as i64 / 10_000;
    (f.tipped_out_cents > cap).then(|| ComplianceWarning::TipoutExceedsCap {
        employee_id: f.employee_id.clone(),
        tipped_out_cents: f.tipped_out_cents,
        cap_cents: cap,
    })
}

/// A pool member should have been clocked in for every segment they sat in.
fn check_pool_eligibility(
    figures: &[EmployeePeriodFigures],
    groups: &[TipGroup],
) -> Vec<ComplianceWarning> {
    let mut warnings = Vec::new();
    for group in groups {
        for segment in &group.segments {
            let seg_end = segment.ended_at.unwrap_or(i64::MAX);
            for member in &segment.members {
                let Some(f) = figures.iter().find(|f| f.employee_id == member.employee_id)
                else {
                    continue;
                };
                let clocked_in = f
                    .shift_windows
                    .iter()
                    .any(|(start, end)| *start < seg_end && segment.started_at < *end);
                if !clocked_in {
                    warnings.push(ComplianceWarning::PoolMemberNotClockedIn {
                        employee_id: member.employee_id.clone(),
                        group_id: group.id.clone(),
                        segment_id: segment.id.clone(),
                    });
                }
            }
        }
    }
    warnings
}
