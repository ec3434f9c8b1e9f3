// Rank planning
// Pure functions from a record set to the rank writes an operation needs.
// Nothing in here touches the database.

use std::cmp::Ordering;

use crate::constants::UNORDERED;
use crate::db::schema::AppRecord;
use crate::projection::name_key;
use super::{Axis, RankChange, Rejection};

/// The list a reorder gesture indexes into.
///
/// Favorites and lock: members ordered by (rank, id), same as their views.
/// Drawer: manual members by rank, then automatic members alphabetically.
/// The drawer editor shows the manual segment first even though the drawer
/// view itself sorts automatic rows ahead of manual ones.
pub fn working_list(axis: Axis, apps: &[AppRecord]) -> Vec<&AppRecord> {
    let mut members: Vec<&AppRecord> = apps.iter().filter(|a| axis.is_member(a)).collect();
    match axis {
        Axis::Drawer => members.sort_by(|a, b| drawer_editor_cmp(a, b)),
        Axis::Favorites | Axis::Lock => {
            members.sort_by(|a, b| axis.rank(a).cmp(&axis.rank(b)).then(a.id.cmp(&b.id)))
        }
    }
    members
}

fn drawer_editor_cmp(a: &AppRecord, b: &AppRecord) -> Ordering {
    let (ra, rb) = (a.global_app_order, b.global_app_order);
    match (ra >= 0, rb >= 0) {
        (true, true) => ra.cmp(&rb).then(a.id.cmp(&b.id)),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => name_key(a).cmp(&name_key(b)).then(a.id.cmp(&b.id)),
    }
}

/// Number of manual members at the head of the drawer working list
pub fn manual_count(axis: Axis, apps: &[AppRecord]) -> usize {
    apps.iter().filter(|a| axis.is_member(a) && axis.rank(a) >= 0).count()
}

fn check_index(index: usize, len: usize) -> Result<(), Rejection> {
    if index >= len {
        return Err(Rejection::IndexOutOfRange { index, len });
    }
    Ok(())
}

/// Rank writes that turn `order` into positional ranks 0..n-1
fn renumber(axis: Axis, apps: &[AppRecord], order: &[i64]) -> Vec<RankChange> {
    order
        .iter()
        .enumerate()
        .filter_map(|(position, id)| {
            let current = apps.iter().find(|a| a.id == *id).map(|a| axis.rank(a));
            let rank = position as i64;
            (current != Some(rank)).then_some(RankChange { id: *id, rank })
        })
        .collect()
}

/// Drag from `from` to `to` in the working list.
pub fn plan_move(axis: Axis, apps: &[AppRecord], from: usize, to: usize) -> Result<Vec<RankChange>, Rejection> {
    let list = working_list(axis, apps);
    check_index(from, list.len())?;
    check_index(to, list.len())?;
    if from == to {
        return Ok(Vec::new());
    }

    let order = match axis {
        Axis::Drawer => {
            let manual = manual_count(axis, apps);
            if to >= manual {
                return Err(Rejection::AutomaticSegment { target: to, manual_count: manual });
            }
            let mut order: Vec<i64> = list[..manual].iter().map(|a| a.id).collect();
            if from < manual {
                let id = order.remove(from);
                order.insert(to, id);
            } else {
                // First drag of an automatic row promotes it into the manual segment
                order.insert(to, list[from].id);
            }
            order
        }
        Axis::Favorites | Axis::Lock => {
            let mut order: Vec<i64> = list.iter().map(|a| a.id).collect();
            let id = order.remove(from);
            order.insert(to, id);
            order
        }
    };

    Ok(renumber(axis, apps, &order))
}

/// Exchange the items at two positions of the working list.
pub fn plan_swap(axis: Axis, apps: &[AppRecord], first: usize, second: usize) -> Result<Vec<RankChange>, Rejection> {
    let list = working_list(axis, apps);
    check_index(first, list.len())?;
    check_index(second, list.len())?;
    if first == second {
        return Ok(Vec::new());
    }

    let segment = match axis {
        Axis::Drawer => {
            let manual = manual_count(axis, apps);
            let target = first.max(second);
            if target >= manual {
                return Err(Rejection::AutomaticSegment { target, manual_count: manual });
            }
            manual
        }
        Axis::Favorites | Axis::Lock => list.len(),
    };

    let mut order: Vec<i64> = list[..segment].iter().map(|a| a.id).collect();
    order.swap(first, second);
    Ok(renumber(axis, apps, &order))
}

/// Give an automatic member the next free rank. Unknown ids and already
/// manual members produce no writes.
pub fn plan_promote(axis: Axis, apps: &[AppRecord], id: i64) -> Result<Vec<RankChange>, Rejection> {
    let Some(app) = apps.iter().find(|a| a.id == id) else {
        return Ok(Vec::new());
    };
    if !axis.is_member(app) {
        return Err(Rejection::NotMember { id, axis });
    }
    if axis.rank(app) >= 0 {
        return Ok(Vec::new());
    }
    let rank = manual_count(axis, apps) as i64;
    Ok(vec![RankChange { id, rank }])
}

/// Return a member to automatic placement and close the gap it leaves.
pub fn plan_demote(axis: Axis, apps: &[AppRecord], id: i64) -> Result<Vec<RankChange>, Rejection> {
    let Some(app) = apps.iter().find(|a| a.id == id) else {
        return Ok(Vec::new());
    };
    if axis.rank(app) < 0 {
        return Ok(Vec::new());
    }

    let mut changes = vec![RankChange { id, rank: UNORDERED }];
    let mut remaining: Vec<&AppRecord> = apps
        .iter()
        .filter(|a| a.id != id && axis.is_member(a) && axis.rank(a) >= 0)
        .collect();
    remaining.sort_by(|a, b| axis.rank(a).cmp(&axis.rank(b)).then(a.id.cmp(&b.id)));
    let order: Vec<i64> = remaining.iter().map(|a| a.id).collect();
    changes.extend(renumber(axis, apps, &order));
    Ok(changes)
}

/// Renumber manual members densely (keeping their relative order) and clear
/// any rank held by a non-member.
pub fn plan_close_gaps(axis: Axis, apps: &[AppRecord]) -> Vec<RankChange> {
    let mut changes: Vec<RankChange> = apps
        .iter()
        .filter(|a| {
            let rank = axis.rank(a);
            (!axis.is_member(a) && rank != UNORDERED) || rank < UNORDERED
        })
        .map(|a| RankChange { id: a.id, rank: UNORDERED })
        .collect();

    let mut manual: Vec<&AppRecord> = apps
        .iter()
        .filter(|a| axis.is_member(a) && axis.rank(a) >= 0)
        .collect();
    manual.sort_by(|a, b| axis.rank(a).cmp(&axis.rank(b)).then(a.id.cmp(&b.id)));
    let order: Vec<i64> = manual.iter().map(|a| a.id).collect();
    changes.extend(renumber(axis, apps, &order));
    changes
}

/// Apply rank writes to an in-memory record set
pub fn apply_changes(apps: &mut [AppRecord], axis: Axis, changes: &[RankChange]) {
    for change in changes {
        if let Some(app) = apps.iter_mut().find(|a| a.id == change.id) {
            axis.set_rank(app, change.rank);
        }
    }
}

/// Manual ranks on the axis must be exactly {0..k-1}; everything else -1.
pub fn verify_dense(axis: Axis, apps: &[AppRecord]) -> Result<(), Rejection> {
    let mut ranks = Vec::new();
    for app in apps {
        let rank = axis.rank(app);
        if rank < UNORDERED {
            return Err(Rejection::InvariantViolation(format!(
                "{} rank {} on app {} is below -1", axis, rank, app.id
            )));
        }
        if !axis.is_member(app) && rank != UNORDERED {
            return Err(Rejection::InvariantViolation(format!(
                "app {} is outside the {} order but holds rank {}", app.id, axis, rank
            )));
        }
        if rank >= 0 {
            ranks.push(rank);
        }
    }
    ranks.sort_unstable();
    for (expected, rank) in ranks.iter().enumerate() {
        if *rank != expected as i64 {
            return Err(Rejection::InvariantViolation(format!(
                "{} ranks are not dense: expected {} found {}", axis, expected, rank
            )));
        }
    }
    Ok(())
}
