//! InMemoryObjectStore - 開発・テスト用のオブジェクトストア
//!
//! # 実装詳細
//! - 存在するオブジェクトの集合と、オブジェクトごとの pin 数を Mutex で保持
//! - `set_available(false)` でストア障害を再現できる
//! - `admitting()` は未知のオブジェクトへの pin を受け入れて登録する
//!   （オブジェクトの実体を別プロセスが持つ scheduler 用）
//! - 退避（eviction）はしない

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::errors::PinError;
use crate::domain::ids::ObjectId;
use crate::ports::ObjectStore;

#[derive(Debug)]
struct StoreState {
    present: HashSet<ObjectId>,
    pins: HashMap<ObjectId, usize>,
    available: bool,
    admit_unknown: bool,
}

#[derive(Debug)]
pub struct InMemoryObjectStore {
    state: Mutex<StoreState>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                present: HashSet::new(),
                pins: HashMap::new(),
                available: true,
                admit_unknown: false,
            }),
        }
    }

    /// A store that registers any object on its first pin.
    pub fn admitting() -> Self {
        let store = Self::new();
        store.state().admit_unknown = true;
        store
    }

    /// Create a store that already holds `ids`.
    pub fn with_objects(ids: impl IntoIterator<Item = ObjectId>) -> Self {
        let store = Self::new();
        for id in ids {
            store.insert(id);
        }
        store
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, id: ObjectId) {
        self.state().present.insert(id);
    }

    /// Remove an object. Returns false if it is still pinned (and keeps it).
    pub fn remove(&self, id: &ObjectId) -> bool {
        let mut state = self.state();
        if state.pins.get(id).copied().unwrap_or(0) > 0 {
            return false;
        }
        state.present.remove(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.state().present.contains(id)
    }

    pub fn set_available(&self, available: bool) {
        self.state().available = available;
    }

    pub fn pin_count(&self, id: &ObjectId) -> usize {
        self.state().pins.get(id).copied().unwrap_or(0)
    }

    /// Pins held across all objects.
    pub fn total_pins(&self) -> usize {
        self.state().pins.values().sum()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn pin(&self, id: &ObjectId) -> Result<(), PinError> {
        let mut state = self.state();
        if !state.available {
            return Err(PinError::StoreUnavailable("in-memory store disabled".into()));
        }
        if !state.present.contains(id) {
            if !state.admit_unknown {
                return Err(PinError::MissingObject(*id));
            }
            state.present.insert(*id);
        }
        *state.pins.entry(*id).or_default() += 1;
        Ok(())
    }

    fn unpin(&self, id: &ObjectId) {
        let mut state = self.state();
        if let Some(n) = state.pins.get_mut(id) {
            *n -= 1;
            if *n == 0 {
                state.pins.remove(id);
            }
        }
    }
}
