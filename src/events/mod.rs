// Launcher events
//
// Everything the presentation layer can ask of the engine, as one tagged enum.
// Events are applied one at a time by the event worker, or directly through
// `Launcher::handle_event`.

pub mod worker;

use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ordering::{Axis, ReorderOutcome};
use crate::reconcile::ReconcileReport;
use crate::Launcher;

pub use worker::{EventSender, EventWorker};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LauncherEvent {
    /// Installed-app set may have changed
    Reconcile,
    /// End of a drag gesture, by working-list position
    Move { axis: Axis, from: usize, to: usize },
    Swap { axis: Axis, first: usize, second: usize },
    /// End of a drag gesture, by record id
    MoveApp { axis: Axis, id: i64, to: usize },
    Promote { axis: Axis, id: i64 },
    Demote { axis: Axis, id: i64 },
    SetFavorite { id: i64, value: bool },
    SetHidden { id: i64, value: bool },
    SetLocked { id: i64, value: bool },
    Rename { id: i64, name: String },
    Delete { id: i64 },
}

impl LauncherEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LauncherEvent::Reconcile => "reconcile",
            LauncherEvent::Move { .. } => "move",
            LauncherEvent::Swap { .. } => "swap",
            LauncherEvent::MoveApp { .. } => "move_app",
            LauncherEvent::Promote { .. } => "promote",
            LauncherEvent::Demote { .. } => "demote",
            LauncherEvent::SetFavorite { .. } => "set_favorite",
            LauncherEvent::SetHidden { .. } => "set_hidden",
            LauncherEvent::SetLocked { .. } => "set_locked",
            LauncherEvent::Rename { .. } => "rename",
            LauncherEvent::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum EventOutcome {
    Reorder(ReorderOutcome),
    /// Flag toggles, renames and deletes: whether anything was written
    Changed(bool),
    Reconciled(ReconcileReport),
}

/// Apply one event. `cancel` only affects reconciliation.
pub fn dispatch(launcher: &Launcher, event: LauncherEvent, cancel: &AtomicBool) -> Result<EventOutcome> {
    let engine = launcher.engine();
    let outcome = match event {
        LauncherEvent::Reconcile => {
            EventOutcome::Reconciled(launcher.reconciler().reconcile_cancellable(cancel)?)
        }
        LauncherEvent::Move { axis, from, to } => EventOutcome::Reorder(engine.move_item(axis, from, to)?),
        LauncherEvent::Swap { axis, first, second } => {
            EventOutcome::Reorder(engine.swap_items(axis, first, second)?)
        }
        LauncherEvent::MoveApp { axis, id, to } => EventOutcome::Reorder(engine.move_app(axis, id, to)?),
        LauncherEvent::Promote { axis, id } => EventOutcome::Reorder(engine.promote(axis, id)?),
        LauncherEvent::Demote { axis, id } => EventOutcome::Reorder(engine.demote(axis, id)?),
        LauncherEvent::SetFavorite { id, value } => EventOutcome::Changed(engine.set_favorite(id, value)?),
        LauncherEvent::SetHidden { id, value } => EventOutcome::Changed(engine.set_hidden(id, value)?),
        LauncherEvent::SetLocked { id, value } => EventOutcome::Changed(engine.set_locked(id, value)?),
        LauncherEvent::Rename { id, name } => EventOutcome::Changed(engine.set_display_name(id, &name)?),
        LauncherEvent::Delete { id } => EventOutcome::Changed(launcher.delete_app(id)?),
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event: LauncherEvent =
            serde_json::from_str(r#"{"type": "move", "axis": "favorites", "from": 2, "to": 0}"#).unwrap();
        assert_eq!(event, LauncherEvent::Move { axis: Axis::Favorites, from: 2, to: 0 });

        let event: LauncherEvent = serde_json::from_str(r#"{"type": "reconcile"}"#).unwrap();
        assert_eq!(event.name(), "reconcile");

        let json = serde_json::to_value(EventOutcome::Reorder(ReorderOutcome::Applied)).unwrap();
        assert_eq!(json["kind"], "reorder");
        assert_eq!(json["value"]["status"], "applied");
    }
}
