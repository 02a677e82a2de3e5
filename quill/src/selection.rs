//! Result selection and navigation
//!
//! `CommandPalette` is the keyboard/mouse state machine in front of a
//! `QueryOrchestrator`: `Closed -> Open -> Closed`, where leaving `Open` either
//! commits the result under the cursor (Enter, click) or abandons the session
//! (Escape). A commit is stamped and published on a watch channel.

use crate::interface::{Destination, MatchMode, SelectedResult};
use crate::orchestrator::QueryOrchestrator;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowUp,
    ArrowDown,
    Enter,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaletteState {
    Closed,
    Open,
}

/// What a key press or click did
#[derive(Debug, Clone, PartialEq)]
pub enum PaletteEvent {
    /// The palette is closed or there was nothing to act on
    Ignored,
    /// Cursor now at this global index
    Moved(usize),
    Committed(SelectedResult),
    Dismissed,
}

/// Consumers of committed selections (note editor, tag tree)
pub trait SelectionTarget {
    fn open_note(&self, note_id: i64, title: &str);
    fn open_tag(&self, tag_id: i64);
}

/// Route a committed selection to the surface that handles its type
pub fn dispatch(selected: &SelectedResult, target: &dyn SelectionTarget) {
    match selected.destination() {
        Destination::OpenNote { note_id, title } => target.open_note(note_id, &title),
        Destination::OpenTag { tag_id } => target.open_tag(tag_id),
    }
}

struct PaletteInner {
    state: PaletteState,
    mode: MatchMode,
    last_timestamp: i64,
}

/// The command palette. Construct once and share it (`Arc`) with every view
/// that submits queries or reacts to selections.
pub struct CommandPalette {
    orchestrator: QueryOrchestrator,
    inner: Mutex<PaletteInner>,
    selection_tx: watch::Sender<Option<SelectedResult>>,
}

impl CommandPalette {
    pub fn new(orchestrator: QueryOrchestrator) -> Self {
        let (selection_tx, _) = watch::channel(None);
        Self {
            orchestrator,
            inner: Mutex::new(PaletteInner {
                state: PaletteState::Closed,
                mode: MatchMode::default(),
                last_timestamp: 0,
            }),
            selection_tx,
        }
    }

    pub fn orchestrator(&self) -> &QueryOrchestrator {
        &self.orchestrator
    }

    pub fn state(&self) -> PaletteState {
        self.inner.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == PaletteState::Open
    }

    /// Open with an empty query, no results and the cursor at 0
    pub fn open(&self) {
        self.orchestrator.reset();
        self.inner.lock().state = PaletteState::Open;
        tracing::debug!("palette opened");
    }

    /// Close without committing. The last published selection is withdrawn.
    pub fn close(&self) {
        let was_open = {
            let mut inner = self.inner.lock();
            std::mem::replace(&mut inner.state, PaletteState::Closed) == PaletteState::Open
        };
        if was_open {
            self.orchestrator.reset();
            self.selection_tx.send_replace(None);
            tracing::debug!("palette dismissed");
        }
    }

    /// Switch the match mode. While open, a pending non-blank query is
    /// re-run in the new mode and its task handle returned.
    pub fn set_mode(&self, mode: MatchMode) -> Option<JoinHandle<()>> {
        let rerun = {
            let mut inner = self.inner.lock();
            let changed = inner.mode != mode;
            inner.mode = mode;
            changed && inner.state == PaletteState::Open
        };
        if !rerun {
            return None;
        }
        let query = self.orchestrator.snapshot().query;
        if query.trim().is_empty() {
            return None;
        }
        tracing::debug!(?mode, "mode switched; re-running query");
        self.orchestrator.submit(&query, mode)
    }

    pub fn mode(&self) -> MatchMode {
        self.inner.lock().mode
    }

    /// Forward the input text to the orchestrator. Ignored while closed.
    pub fn set_query(&self, text: &str) {
        let mode = {
            let inner = self.inner.lock();
            if inner.state != PaletteState::Open {
                return;
            }
            inner.mode
        };
        self.orchestrator.submit(text, mode);
    }

    pub fn handle_key(&self, key: Key) -> PaletteEvent {
        if !self.is_open() {
            return PaletteEvent::Ignored;
        }
        match key {
            Key::ArrowDown => PaletteEvent::Moved(self.orchestrator.move_cursor(1)),
            Key::ArrowUp => PaletteEvent::Moved(self.orchestrator.move_cursor(-1)),
            Key::Enter => self.commit(),
            Key::Escape => {
                self.close();
                PaletteEvent::Dismissed
            }
        }
    }

    /// Mouse click on the result at a global index: move there, then commit
    pub fn click(&self, index: usize) -> PaletteEvent {
        if !self.is_open() || !self.orchestrator.select_index(index) {
            return PaletteEvent::Ignored;
        }
        self.commit()
    }

    pub fn subscribe_selection(&self) -> watch::Receiver<Option<SelectedResult>> {
        self.selection_tx.subscribe()
    }

    fn commit(&self) -> PaletteEvent {
        let Some(result) = self.orchestrator.selected() else {
            return PaletteEvent::Ignored;
        };

        let timestamp = {
            let mut inner = self.inner.lock();
            // Strictly increasing even when two commits share a millisecond
            let stamp = Utc::now().timestamp_millis().max(inner.last_timestamp + 1);
            inner.last_timestamp = stamp;
            inner.state = PaletteState::Closed;
            stamp
        };

        let selected = SelectedResult { result, timestamp };
        tracing::debug!(id = selected.result.id, source = selected.result.source_type().as_str(), "selection committed");
        self.selection_tx.send_replace(Some(selected.clone()));
        self.orchestrator.reset();
        PaletteEvent::Committed(selected)
    }
}
