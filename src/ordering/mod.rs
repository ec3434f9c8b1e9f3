// Ordering engine
//
// Three independent rank spaces live on each record: drawer (global_app_order),
// favorites (app_order) and lock (lock_order). Every public operation reads the
// current record set, plans its rank writes, checks the result is still dense
// and commits in a single store transaction. A plan that fails the check is
// rejected and nothing is written.

pub mod plan;


use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::constants::UNORDERED;
use crate::db::schema::{self, AppRecord};
use crate::error::{LauncherError, Result};
use crate::store::AppStore;

// ----- Axis -----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Drawer,
    Favorites,
    Lock,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Drawer, Axis::Favorites, Axis::Lock];

    /// Column holding this axis' rank
    pub fn column(self) -> &'static str {
        match self {
            Axis::Drawer => "global_app_order",
            Axis::Favorites => "app_order",
            Axis::Lock => "lock_order",
        }
    }

    pub fn rank(self, app: &AppRecord) -> i64 {
        match self {
            Axis::Drawer => app.global_app_order,
            Axis::Favorites => app.app_order,
            Axis::Lock => app.lock_order,
        }
    }

    pub fn set_rank(self, app: &mut AppRecord, rank: i64) {
        match self {
            Axis::Drawer => app.global_app_order = rank,
            Axis::Favorites => app.app_order = rank,
            Axis::Lock => app.lock_order = rank,
        }
    }

    /// Whether the record takes part in this ordering at all.
    /// Hidden apps leave the drawer, so they never hold a drawer rank.
    pub fn is_member(self, app: &AppRecord) -> bool {
        match self {
            Axis::Drawer => !app.hidden,
            Axis::Favorites => app.favorite,
            Axis::Lock => app.lock,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Axis::Drawer => "drawer",
            Axis::Favorites => "favorites",
            Axis::Lock => "lock",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drawer" | "global" => Ok(Axis::Drawer),
            "favorites" | "favorite" => Ok(Axis::Favorites),
            "lock" | "locked" => Ok(Axis::Lock),
            other => Err(format!("unknown axis '{}' (expected drawer, favorites or lock)", other)),
        }
    }
}

// ----- Outcomes -----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankChange {
    pub id: i64,
    pub rank: i64,
}

/// Why a reorder was refused. A rejected operation has written nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "camelCase")]
pub enum Rejection {
    IndexOutOfRange { index: usize, len: usize },
    /// Drawer target lies among the alphabetically placed rows
    AutomaticSegment { target: usize, manual_count: usize },
    NotMember { id: i64, axis: Axis },
    InvariantViolation(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::IndexOutOfRange { index, len } => {
                write!(f, "index {} is out of range for a list of {}", index, len)
            }
            Rejection::AutomaticSegment { target, manual_count } => write!(
                f,
                "target {} is inside the automatic segment (only {} manually ordered)",
                target, manual_count
            ),
            Rejection::NotMember { id, axis } => write!(f, "app {} is not part of the {} order", id, axis),
            Rejection::InvariantViolation(msg) => write!(f, "invariant violation: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "rejection", rename_all = "camelCase")]
pub enum ReorderOutcome {
    Applied,
    /// Nothing to do (unknown id, already in the requested state, no-op move)
    Unchanged,
    Rejected(Rejection),
}

impl ReorderOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ReorderOutcome::Applied)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ReorderOutcome::Rejected(_))
    }
}

// ----- Transaction helpers -----

/// Validate and write a batch of ranks on one axis. `apps` is the record set
/// the plan was computed from, read inside the same transaction.
pub fn commit_rank_changes(
    conn: &Connection,
    axis: Axis,
    apps: &[AppRecord],
    changes: &[RankChange],
) -> Result<ReorderOutcome> {
    if changes.is_empty() {
        return Ok(ReorderOutcome::Unchanged);
    }

    let mut after = apps.to_vec();
    plan::apply_changes(&mut after, axis, changes);
    if let Err(rejection) = plan::verify_dense(axis, &after) {
        log::warn!("Rejected {} rank batch: {}", axis, rejection);
        return Ok(ReorderOutcome::Rejected(rejection));
    }

    schema::update_ranks(conn, axis, changes)?;
    Ok(ReorderOutcome::Applied)
}

/// Bring every axis back to a dense numbering. Returns the number of rows rewritten.
pub fn repair_ranks(conn: &Connection) -> Result<usize> {
    let mut apps = schema::list_all_apps(conn)?;
    let mut repaired = 0;
    for axis in Axis::ALL {
        let changes = plan::plan_close_gaps(axis, &apps);
        if changes.is_empty() {
            continue;
        }
        repaired += schema::update_ranks(conn, axis, &changes)?;
        plan::apply_changes(&mut apps, axis, &changes);
    }
    if repaired > 0 {
        log::debug!("Repaired {} ranks", repaired);
    }
    Ok(repaired)
}

/// Persist every record of `after` that differs from its counterpart in `before`.
fn write_changed(conn: &Connection, before: &[AppRecord], after: &[AppRecord]) -> Result<usize> {
    let mut written = 0;
    for (old, new) in before.iter().zip(after) {
        if old != new && schema::update_app(conn, new)? {
            written += 1;
        }
    }
    Ok(written)
}

fn verify_all(apps: &[AppRecord]) -> std::result::Result<(), Rejection> {
    for axis in Axis::ALL {
        plan::verify_dense(axis, apps)?;
    }
    Ok(())
}

// ----- Engine -----

/// Reorder and flag-toggle operations over the shared store.
pub struct OrderingEngine {
    store: Arc<AppStore>,
}

impl OrderingEngine {
    pub fn new(store: Arc<AppStore>) -> Self {
        Self { store }
    }

    fn run_plan<F>(&self, axis: Axis, operation: &str, planner: F) -> Result<ReorderOutcome>
    where
        F: FnOnce(&[AppRecord]) -> std::result::Result<Vec<RankChange>, Rejection>,
    {
        let outcome = self.store.write(|tx| {
            let apps = schema::list_all_apps(tx)?;
            match planner(&apps) {
                Ok(changes) => commit_rank_changes(tx, axis, &apps, &changes),
                Err(rejection) => Ok(ReorderOutcome::Rejected(rejection)),
            }
        })?;

        match &outcome {
            ReorderOutcome::Applied => log::debug!("{} on {} applied", operation, axis),
            ReorderOutcome::Unchanged => {}
            ReorderOutcome::Rejected(r) => log::info!("{} on {} rejected: {}", operation, axis, r),
        }
        Ok(outcome)
    }

    /// Drag the item at `from` to `to` in the axis' working list.
    pub fn move_item(&self, axis: Axis, from: usize, to: usize) -> Result<ReorderOutcome> {
        self.run_plan(axis, "move", |apps| plan::plan_move(axis, apps, from, to))
    }

    /// Adjacent-pair exchange as reported by list widgets.
    pub fn swap_items(&self, axis: Axis, first: usize, second: usize) -> Result<ReorderOutcome> {
        self.run_plan(axis, "swap", |apps| plan::plan_swap(axis, apps, first, second))
    }

    /// Move a record, addressed by id, to `to`. The id is resolved against the
    /// committed state, so a reconciliation between gesture start and end
    /// cannot redirect the move onto another record.
    pub fn move_app(&self, axis: Axis, id: i64, to: usize) -> Result<ReorderOutcome> {
        self.run_plan(axis, "move", |apps| {
            let list = plan::working_list(axis, apps);
            match list.iter().position(|a| a.id == id) {
                Some(from) => plan::plan_move(axis, apps, from, to),
                None if apps.iter().any(|a| a.id == id) => Err(Rejection::NotMember { id, axis }),
                None => Ok(Vec::new()),
            }
        })
    }

    pub fn promote(&self, axis: Axis, id: i64) -> Result<ReorderOutcome> {
        self.run_plan(axis, "promote", |apps| plan::plan_promote(axis, apps, id))
    }

    pub fn demote(&self, axis: Axis, id: i64) -> Result<ReorderOutcome> {
        self.run_plan(axis, "demote", |apps| plan::plan_demote(axis, apps, id))
    }

    /// Apply `edit` to one record, re-rank, verify every axis and persist.
    /// Returns false when the id is unknown or nothing changed.
    fn edit_app<F>(&self, id: i64, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut Vec<AppRecord>, usize) -> Result<()>,
    {
        self.store.write(|tx| {
            let before = schema::list_all_apps(tx)?;
            let Some(index) = before.iter().position(|a| a.id == id) else {
                return Ok(false);
            };

            let mut after = before.clone();
            edit(&mut after, index)?;
            if after == before {
                return Ok(false);
            }

            verify_all(&after).map_err(|r| LauncherError::Other(r.to_string()))?;
            let written = write_changed(tx, &before, &after)?;
            Ok(written > 0)
        })
    }

    fn set_membership(&self, axis: Axis, id: i64, value: bool) -> Result<bool> {
        let changed = self.edit_app(id, |apps, index| {
            let app = &mut apps[index];
            let current = axis.is_member(app);
            match axis {
                Axis::Drawer => app.hidden = !value,
                Axis::Favorites => app.favorite = value,
                Axis::Lock => app.lock = value,
            }
            if current == value {
                return Ok(());
            }

            let changes = if value {
                // Joining an ordered list appends at the end
                match axis {
                    Axis::Drawer => Vec::new(),
                    _ => plan::plan_promote(axis, apps, id)
                        .map_err(|r| LauncherError::Other(r.to_string()))?,
                }
            } else {
                plan::plan_close_gaps(axis, apps)
            };
            plan::apply_changes(apps, axis, &changes);
            Ok(())
        })?;

        if changed {
            log::info!("App {} {} membership set to {}", id, axis, value);
        }
        Ok(changed)
    }

    pub fn set_favorite(&self, id: i64, favorite: bool) -> Result<bool> {
        self.set_membership(Axis::Favorites, id, favorite)
    }

    pub fn set_locked(&self, id: i64, locked: bool) -> Result<bool> {
        self.set_membership(Axis::Lock, id, locked)
    }

    /// Hiding removes the app from the drawer order; unhiding brings it back
    /// in automatic placement.
    pub fn set_hidden(&self, id: i64, hidden: bool) -> Result<bool> {
        self.set_membership(Axis::Drawer, id, !hidden)
    }

    pub fn set_display_name(&self, id: i64, name: &str) -> Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LauncherError::InvalidInput("display name cannot be empty".to_string()));
        }
        self.edit_app(id, |apps, index| {
            apps[index].app_name = name.to_string();
            Ok(())
        })
    }

    /// Manual ranks of an axis in rank order, for diagnostics
    pub fn manual_ids(&self, axis: Axis) -> Result<Vec<i64>> {
        self.store.read(|conn| {
            let apps = schema::list_all_apps(conn)?;
            Ok(plan::working_list(axis, &apps)
                .into_iter()
                .filter(|a| axis.rank(a) != UNORDERED)
                .map(|a| a.id)
                .collect())
        })
    }
}
