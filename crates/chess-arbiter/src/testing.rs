//! Test harness utilities: a programmable interaction source that stands in
//! for the host's hand-tracking.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::piece::PieceId;
use crate::ports::{InteractionSource, Vec3};

/// Scriptable hands: tests grab, drag and release pieces; the arbiter's poll
/// observes the transitions exactly as it would from a real host.
#[derive(Clone, Default)]
pub struct ScriptedHands {
    inner: Arc<Mutex<HandsState>>,
}

#[derive(Default)]
struct HandsState {
    held: HashSet<PieceId>,
    positions: HashMap<PieceId, Vec3>,
}

impl ScriptedHands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grab(&self, id: &PieceId) {
        self.inner.lock().unwrap().held.insert(id.clone());
    }

    pub fn drag_to(&self, id: &PieceId, position: Vec3) {
        self.inner
            .lock()
            .unwrap()
            .positions
            .insert(id.clone(), position);
    }

    pub fn release(&self, id: &PieceId) {
        self.inner.lock().unwrap().held.remove(id);
    }
}

impl InteractionSource for ScriptedHands {
    fn is_held(&self, id: &PieceId) -> bool {
        self.inner.lock().unwrap().held.contains(id)
    }

    fn position(&self, id: &PieceId) -> Option<Vec3> {
        self.inner.lock().unwrap().positions.get(id).copied()
    }
}
