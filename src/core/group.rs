// Tip group lifecycle: OPEN -> CLOSED with an append-only segment log.
//
// Purpose
// - Track who shares a tip pool over time. Every membership change closes
//   the current segment and opens the next, so "who was in the pool at
//   time T" stays answerable forever.
//
// Responsibilities
// - Enforce: at most one active membership per employee, contiguous
//   non-overlapping segments, no changes after close.
//
// Boundaries
// - Pure state machine. The store serializes concurrent transitions per
//   group; this type assumes it is mutated by one caller at a time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Open,
    Closed,
}

/// How a segment's members divide a slice of tip money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    Equal,
    RoleWeighted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub employee_id: String,
    pub joined_at: i64,
    pub left_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMember {
    pub employee_id: String,
    /// Role tip weight supplied by the scheduling collaborator at join time.
    /// Ignored under SplitMode::Equal.
    pub tip_weight: u64,
}

/// Immutable snapshot of group membership over [started_at, ended_at).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub members: Vec<SegmentMember>,
    pub started_at: i64,
    pub ended_at: Option<i64>,
}

impl Segment {
    pub fn covers(&self, at: i64) -> bool {
        at >= self.started_at && self.ended_at.is_none_or(|end| at < end)
    }

    pub fn contains(&self, employee_id: &str) -> bool {
        self.members.iter().any(|m| m.employee_id == employee_id)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupError {
    #[error("group is closed")]
    Closed,

    #[error("group must start with at least one member")]
    NoInitialMembers,

    #[error("employee {0} is already an active member")]
    AlreadyMember(String),

    #[error("employee {0} is not an active member")]
    NotAMember(String),

    #[error("a membership change at {at} would predate the current segment started at {segment_started_at}")]
    OutOfOrder { at: i64, segment_started_at: i64 },

    #[error("leaving would empty the group; close it instead")]
    WouldEmptyGroup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TipGroup {
    pub id: String,
    pub location_id: String,
    pub name: String,
    pub status: GroupStatus,
    pub split_mode: SplitMode,
    pub memberships: Vec<Membership>,
    /// Append-only. The last segment is the active one while the group is
    /// open; it is ended (never removed) on every transition.
    pub segments: Vec<Segment>,
}

impl TipGroup {
    /// Create the group and its first segment. `segment_id` is minted by
    /// the caller (ids never originate in the core).
    pub fn start(
        id: impl Into<String>,
        location_id: impl Into<String>,
        name: impl Into<String>,
        split_mode: SplitMode,
        initial_members: Vec<SegmentMember>,
        started_at: i64,
        segment_id: impl Into<String>,
    ) -> Result<Self, GroupError> {
        if initial_members.is_empty() {
            return Err(GroupError::NoInitialMembers);
        }
        let memberships = initial_members
            .iter()
            .map(|m| Membership {
                employee_id: m.employee_id.clone(),
                joined_at: started_at,
                left_at: None,
            })
            .collect();
        Ok(Self {
            id: id.into(),
            location_id: location_id.into(),
            name: name.into(),
            status: GroupStatus::Open,
            split_mode,
            memberships,
            segments: vec![Segment {
                id: segment_id.into(),
                members: initial_members,
                started_at,
                ended_at: None,
            }],
        })
    }

    fn active_segment(&self) -> &Segment {
        // Invariant: an open group always has an unterminated last segment.
        self.segments.last().expect("open group has segments")
    }

    fn roll_segment(
        &mut self,
        members: Vec<SegmentMember>,
        at: i64,
        segment_id: String,
    ) -> Result<(), GroupError> {
        let current_start = self.active_segment().started_at;
        if at < current_start {
            return Err(GroupError::OutOfOrder {
                at,
                segment_started_at: current_start,
            });
        }
        if let Some(current) = self.segments.last_mut() {
            current.ended_at = Some(at);
        }
        self.segments.push(Segment {
            id: segment_id,
            members,
            started_at: at,
            ended_at: None,
        });
        Ok(())
    }

    pub fn join(
        &mut self,
        employee_id: impl Into<String>,
        tip_weight: u64,
        at: i64,
        segment_id: impl Into<String>,
    ) -> Result<(), GroupError> {
        if self.status == GroupStatus::Closed {
            return Err(GroupError::Closed);
        }
        let employee_id = employee_id.into();
        if self.active_segment().contains(&employee_id) {
            return Err(GroupError::AlreadyMember(employee_id));
        }
        let mut members = self.active_segment().members.clone();
        members.push(SegmentMember {
            employee_id: employee_id.clone(),
            tip_weight,
        });
        self.roll_segment(members, at, segment_id.into())?;
        self.memberships.push(Membership {
            employee_id,
            joined_at: at,
            left_at: None,
        });
        Ok(())
    }

    pub fn leave(
        &mut self,
        employee_id: &str,
        at: i64,
        segment_id: impl Into<String>,
    ) -> Result<(), GroupError> {
        if self.status == GroupStatus::Closed {
            return Err(GroupError::Closed);
        }
        if !self.active_segment().contains(employee_id) {
            return Err(GroupError::NotAMember(employee_id.to_string()));
        }
        if self.active_segment().members.len() == 1 {
            return Err(GroupError::WouldEmptyGroup);
        }
        let members: Vec<SegmentMember> = self
            .active_segment()
            .members
            .iter()
            .filter(|m| m.employee_id != employee_id)
            .cloned()
            .collect();
        self.roll_segment(members, at, segment_id.into())?;
        if let Some(membership) = self
            .memberships
            .iter_mut()
            .find(|m| m.employee_id == employee_id && m.left_at.is_none())
        {
            membership.left_at = Some(at);
        }
        Ok(())
    }

    /// Terminal transition. Ends the final segment and freezes membership.
    pub fn close(&mut self, at: i64) -> Result<(), GroupError> {
        if self.status == GroupStatus::Closed {
            return Err(GroupError::Closed);
        }
        let current_start = self.active_segment().started_at;
        if at < current_start {
            return Err(GroupError::OutOfOrder {
                at,
                segment_started_at: current_start,
            });
        }
        if let Some(current) = self.segments.last_mut() {
            current.ended_at = Some(at);
        }
        for membership in self.memberships.iter_mut() {
            if membership.left_at.is_none() {
                membership.left_at = Some(at);
            }
        }
        self.status = GroupStatus::Closed;
        Ok(())
    }

    /// The segment active at `at`, if any. Allocation always resolves
    /// through this, never through current membership.
    pub fn segment_at(&self, at: i64) -> Option<&Segment> {
        self.segments.iter().find(|s| s.covers(at))
    }

    pub fn is_active_member(&self, employee_id: &str, at: i64) -> bool {
        self.segment_at(at)
            .map(|s| s.contains(employee_id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tip_group_tests {
    use super::*;
    use rstest::{fixture, rstest};

    const T0: i64 = 1_700_000_000_000;
    const HOUR: i64 = 3_600_000;

    fn member(id: &str, weight: u64) -> SegmentMember {
        SegmentMember {
            employee_id: id.into(),
            tip_weight: weight,
        }
    }

    #[fixture]
    fn group() -> TipGroup {
        TipGroup::start(
            "grp-1",
            "loc-1",
            "dinner pool",
            SplitMode::Equal,
            vec![member("emp-a", 100), member("emp-b", 100)],
            T0,
            "seg-1",
        )
        .unwrap()
    }

    #[rstest]
    fn it_should_start_open_with_one_segment(group: TipGroup) {
        assert_eq!(group.status, GroupStatus::Open);
        assert_eq!(group.segments.len(), 1);
        assert_eq!(group.segments[0].started_at, T0);
        assert_eq!(group.segments[0].ended_at, None);
    }

    #[rstest]
    fn it_should_reject_starting_with_no_members() {
        let result = TipGroup::start(
            "grp-2",
            "loc-1",
            "empty",
            SplitMode::Equal,
            vec![],
            T0,
            "seg-1",
        );
        assert_eq!(result.unwrap_err(), GroupError::NoInitialMembers);
    }

    #[rstest]
    fn it_should_roll_a_new_segment_on_join(mut group: TipGroup) {
        group.join("emp-c", 100, T0 + HOUR, "seg-2").unwrap();
        assert_eq!(group.segments.len(), 2);
        assert_eq!(group.segments[0].ended_at, Some(T0 + HOUR));
        assert_eq!(group.segments[1].started_at, T0 + HOUR);
        assert_eq!(group.segments[1].members.len(), 3);
    }

    #[rstest]
    fn it_should_resolve_the_segment_active_at_a_past_timestamp(mut group: TipGroup) {
        group.join("emp-c", 100, T0 + HOUR, "seg-2").unwrap();
        // An allocation timestamped before the join sees only a and b, even
        // though c is a member now.
        let seg = group.segment_at(T0 + HOUR / 2).unwrap();
        assert_eq!(seg.id, "seg-1");
        assert!(seg.contains("emp-a"));
        assert!(seg.contains("emp-b"));
        assert!(!seg.contains("emp-c"));

        let seg = group.segment_at(T0 + HOUR).unwrap();
        assert_eq!(seg.id, "seg-2");
        assert!(seg.contains("emp-c"));
    }

    #[rstest]
    fn it_should_keep_segments_contiguous_across_churn(mut group: TipGroup) {
        group.join("emp-c", 100, T0 + HOUR, "seg-2").unwrap();
        group.leave("emp-a", T0 + 2 * HOUR, "seg-3").unwrap();
        group.close(T0 + 3 * HOUR).unwrap();

        for pair in group.segments.windows(2) {
            assert_eq!(pair[0].ended_at, Some(pair[1].started_at));
        }
        assert_eq!(group.segments.last().unwrap().ended_at, Some(T0 + 3 * HOUR));
    }

    #[rstest]
    fn it_should_reject_joining_twice(mut group: TipGroup) {
        let err = group.join("emp-a", 100, T0 + HOUR, "seg-2").unwrap_err();
        assert_eq!(err, GroupError::AlreadyMember("emp-a".into()));
    }

    #[rstest]
    fn it_should_reject_leaving_when_not_a_member(mut group: TipGroup) {
        let err = group.leave("emp-z", T0 + HOUR, "seg-2").unwrap_err();
        assert_eq!(err, GroupError::NotAMember("emp-z".into()));
    }

    #[rstest]
    fn it_should_reject_leaving_the_last_member(mut group: TipGroup) {
        group.leave("emp-a", T0 + HOUR, "seg-2").unwrap();
        let err = group.leave("emp-b", T0 + 2 * HOUR, "seg-3").unwrap_err();
        assert_eq!(err, GroupError::WouldEmptyGroup);
    }

    #[rstest]
    fn it_should_reject_out_of_order_transitions(mut group: TipGroup) {
        group.join("emp-c", 100, T0 + HOUR, "seg-2").unwrap();
        let err = group.leave("emp-c", T0, "seg-3").unwrap_err();
        assert_eq!(
            err,
            GroupError::OutOfOrder {
                at: T0,
                segment_started_at: T0 + HOUR
            }
        );
    }

    #[rstest]
    fn it_should_forbid_changes_after_close(mut group: TipGroup) {
        group.close(T0 + HOUR).unwrap();
        assert_eq!(group.status, GroupStatus::Closed);
        assert_eq!(
            group.join("emp-c", 100, T0 + 2 * HOUR, "seg-2"),
            Err(GroupError::Closed)
        );
        assert_eq!(
            group.leave("emp-a", T0 + 2 * HOUR, "seg-2"),
            Err(GroupError::Closed)
        );
        assert_eq!(group.close(T0 + 2 * HOUR), Err(GroupError::Closed));
    }

    #[rstest]
    fn it_should_mark_memberships_left_at_on_close(mut group: TipGroup) {
        group.close(T0 + HOUR).unwrap();
        assert!(group.memberships.iter().all(|m| m.left_at == Some(T0 + HOUR)));
    }

    #[rstest]
    fn it_should_not_resolve_segments_outside_the_group_lifetime(mut group: TipGroup) {
        group.close(T0 + HOUR).unwrap();
        assert!(group.segment_at(T0 - 1).is_none());
        assert!(group.segment_at(T0 + HOUR).is_none());
        assert!(group.segment_at(T0 + HOUR - 1).is_some());
    }
}
