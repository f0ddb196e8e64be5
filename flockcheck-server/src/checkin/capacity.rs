//! Room occupancy status and overflow routing.
//!
//! The overflow pointers between locations may form cycles, so resolution is
//! an explicit walk with a visited set instead of recursive pointer chasing.

use std::collections::HashSet;

use flockcheck_shared::domain::CapacityStatus;

use super::CheckinError;
use crate::storage::models::Location;

/// The capacity-relevant part of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomLimits {
    pub location_id: i32,
    pub soft_threshold: Option<i32>,
    pub firm_threshold: Option<i32>,
    pub overflow_location_id: Option<i32>,
    pub auto_assign_overflow: bool,
}

impl From<&Location> for RoomLimits {
    fn from(l: &Location) -> Self {
        RoomLimits {
            location_id: l.id,
            soft_threshold: l.soft_room_threshold,
            firm_threshold: l.firm_room_threshold,
            overflow_location_id: l.overflow_location_id,
            auto_assign_overflow: l.auto_assign_overflow,
        }
    }
}

impl RoomLimits {
    pub fn status(&self, headcount: i64) -> CapacityStatus {
        if self.firm_threshold.is_some_and(|t| headcount >= i64::from(t)) {
            CapacityStatus::Full
        } else if self.soft_threshold.is_some_and(|t| headcount >= i64::from(t)) {
            CapacityStatus::Warning
        } else {
            CapacityStatus::Available
        }
    }
}

/// Read access to rooms and their live headcount for one schedule and date.
pub trait OccupancySource {
    fn room(&mut self, location_id: i32) -> Result<Option<RoomLimits>, CheckinError>;
    fn headcount(&mut self, location_id: i32) -> Result<i64, CheckinError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Room the check-in lands in.
    pub location_id: i32,
    pub status: CapacityStatus,
    pub headcount: i64,
    /// Full rooms passed through before landing, in order.
    pub overflowed_from: Vec<i32>,
}

/// Picks the room for a check-in requested at `requested`, following
/// overflow pointers of full rooms that opt into auto-assignment.
pub fn resolve<S: OccupancySource>(
    source: &mut S,
    requested: i32,
) -> Result<Placement, CheckinError> {
    let mut visited = HashSet::new();
    let mut overflowed_from = Vec::new();
    let mut current = requested;
    loop {
        if !visited.insert(current) {
            tracing::warn!(
                requested,
                location_id = current,
                chain = ?overflowed_from,
                "capacity: overflow cycle detected"
            );
            return Err(CheckinError::OverflowCycleDetected {
                location_id: current,
            });
        }
        let room = source
            .room(current)?
            .ok_or_else(|| CheckinError::NotFound(format!("location {current}")))?;
        let headcount = source.headcount(current)?;
        let status = room.status(headcount);
        if status != CapacityStatus::Full {
            return Ok(Placement {
                location_id: current,
                status,
                headcount,
                overflowed_from,
            });
        }
        match room.overflow_location_id {
            Some(next) if room.auto_assign_overflow => {
                tracing::debug!(from = current, to = next, headcount, "capacity: routing to overflow");
                overflowed_from.push(current);
                current = next;
            }
            _ => {
                return Err(CheckinError::LocationFull {
                    location_id: requested,
                });
            }
        }
    }
}
