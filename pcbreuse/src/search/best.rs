//! Best partial match, shared with observers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::persist::SavedCircuit;

#[derive(Debug, Default)]
struct Best {
    nets: usize,
    circuit: Option<SavedCircuit>,
}

/// Cloneable handle to the deepest partial solution seen so far. The
/// recorded net count never decreases, so another thread can poll it while
/// the search runs.
#[derive(Debug, Clone, Default)]
pub struct BestMatchHandle {
    inner: Arc<Mutex<Best>>,
}

impl BestMatchHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<SavedCircuit> {
        self.lock().circuit.clone()
    }

    pub fn net_count(&self) -> usize {
        self.lock().nets
    }

    /// Records the circuit built by `build` if it covers more nets than the
    /// current best.
    pub fn offer(&self, nets: usize, build: impl FnOnce() -> SavedCircuit) -> bool {
        let mut best = self.lock();
        if nets <= best.nets {
            return false;
        }
        best.nets = nets;
        best.circuit = Some(build());
        true
    }

    fn lock(&self) -> MutexGuard<'_, Best> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
