use crate::object::VerbDef;
use crate::store::ObjectStore;
use bincode::{Decode, Encode};
use std::sync::{Arc, RwLock};
use warren_common::model::{PropFlag, VerbArgsSpec, VerbFlag, WorldStateError};
use warren_common::util::BitEnum;
use warren_compiler::Program;
use warren_var::{Obj, Symbol, Var};

/// Point-in-time image of the whole store, as written by checkpoints.
#[derive(Encode, Decode)]
pub struct StoreSnapshot {
    /// Bumped when the encoded layout changes; old snapshots are rejected
    /// rather than misread.
    pub version: u32,
    pub store: ObjectStore,
}

pub const SNAPSHOT_VERSION: u32 = 1;

/// The single logical owner of the object graph. Mutations serialize
/// through the one writer; reads run concurrently and observe whole
/// operations only.
#[derive(Clone)]
pub struct WorldState(Arc<RwLock<ObjectStore>>);

impl WorldState {
    pub fn new(store: ObjectStore) -> Self {
        WorldState(Arc::new(RwLock::new(store)))
    }

    pub fn with_read<R>(&self, f: impl FnOnce(&ObjectStore) -> R) -> R {
        let guard = self.0.read().expect("world-state lock poisoned");
        f(&guard)
    }

    pub fn with_write<R>(&self, f: impl FnOnce(&mut ObjectStore) -> R) -> R {
        let mut guard = self.0.write().expect("world-state lock poisoned");
        f(&mut guard)
    }

    /// A logically-consistent copy sufficient for serialization; taken
    /// under the read lock, so no write can interleave.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            version: SNAPSHOT_VERSION,
            store: self.with_read(|s| s.clone()),
        }
    }

    pub fn restore(&self, snapshot: StoreSnapshot) {
        let mut guard = self.0.write().expect("world-state lock poisoned");
        *guard = snapshot.store;
    }

    // Convenience passthroughs for the hot operations.

    pub fn valid(&self, obj: Obj) -> bool {
        self.with_read(|s| s.valid(obj))
    }

    pub fn max_object(&self) -> i64 {
        self.with_read(|s| s.max_object())
    }

    pub fn retrieve_property(&self, obj: Obj, name: &Symbol) -> Result<Var, WorldStateError> {
        self.with_read(|s| s.resolve_property(obj, name))
    }

    pub fn update_property(
        &self,
        obj: Obj,
        name: &Symbol,
        value: Var,
    ) -> Result<(), WorldStateError> {
        self.with_write(|s| s.update_property(obj, name, value))
    }

    pub fn property_info(
        &self,
        obj: Obj,
        name: &Symbol,
    ) -> Result<(Obj, BitEnum<PropFlag>), WorldStateError> {
        self.with_read(|s| s.property_info(obj, name))
    }

    pub fn find_verb(&self, obj: Obj, name: &str) -> Result<(Obj, usize, VerbDef), WorldStateError> {
        self.with_read(|s| s.find_verb(obj, name))
    }

    pub fn find_command_verb(
        &self,
        obj: Obj,
        name: &str,
        argspec: &VerbArgsSpec,
    ) -> Result<Option<(Obj, usize, VerbDef)>, WorldStateError> {
        self.with_read(|s| s.find_command_verb(obj, name, argspec))
    }

    pub fn cache_verb_program(
        &self,
        obj: Obj,
        index: usize,
        program: Arc<Program>,
    ) -> Result<(), WorldStateError> {
        self.with_write(|s| s.cache_verb_program(obj, index, program))
    }

    pub fn parent_of(&self, obj: Obj) -> Result<Obj, WorldStateError> {
        self.with_read(|s| s.get(obj).map(|o| o.parent))
    }

    pub fn owner_of(&self, obj: Obj) -> Result<Obj, WorldStateError> {
        self.with_read(|s| s.get(obj).map(|o| o.owner))
    }

    pub fn location_of(&self, obj: Obj) -> Result<Obj, WorldStateError> {
        self.with_read(|s| s.get(obj).map(|o| o.location))
    }

    pub fn contents_of(&self, obj: Obj) -> Result<Vec<Obj>, WorldStateError> {
        self.with_read(|s| s.get(obj).map(|o| o.contents.clone()))
    }

    pub fn name_of(&self, obj: Obj) -> Result<String, WorldStateError> {
        self.with_read(|s| s.get(obj).map(|o| o.name.clone()))
    }

    pub fn flags_of(
        &self,
        obj: Obj,
    ) -> Result<BitEnum<warren_common::model::ObjFlag>, WorldStateError> {
        self.with_read(|s| s.get(obj).map(|o| o.flags))
    }

    pub fn verb_at(&self, obj: Obj, index: usize) -> Result<VerbDef, WorldStateError> {
        self.with_read(|s| {
            let o = s.get(obj)?;
            o.verbs
                .get(index)
                .cloned()
                .ok_or(WorldStateError::VerbNotFound(obj, index.to_string()))
        })
    }

    pub fn set_verb_flags(
        &self,
        obj: Obj,
        index: usize,
        flags: BitEnum<VerbFlag>,
    ) -> Result<(), WorldStateError> {
        self.with_write(|s| s.set_verb_info(obj, index, None, Some(flags), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warren_var::{NOTHING, v_int};

    #[test]
    fn snapshot_restore_roundtrip() {
        let ws = WorldState::new(ObjectStore::bootstrap_minimal());
        let obj = ws
            .with_write(|s| s.create_object(NOTHING, NOTHING))
            .unwrap();
        ws.with_write(|s| {
            s.add_property(
                obj,
                Symbol::mk("level"),
                v_int(9),
                obj,
                PropFlag::rc(),
            )
        })
        .unwrap();

        let snapshot = ws.snapshot();
        let bytes = bincode::encode_to_vec(&snapshot, bincode::config::standard()).unwrap();
        let (decoded, _): (StoreSnapshot, usize) =
            bincode::decode_from_slice(&bytes, bincode::config::standard()).unwrap();

        let restored = WorldState::new(ObjectStore::new());
        restored.restore(decoded);
        assert!(restored.valid(obj));
        assert_eq!(restored.max_object(), 2);
        assert_eq!(
            restored.retrieve_property(obj, &Symbol::mk("level")).unwrap(),
            v_int(9)
        );
    }
}
