//! The object database: a single in-memory graph of objects indexed by id,
//! with single-inheritance property and verb resolution, object-id
//! allocation with a recycle pool, and snapshot support for the checkpoint
//! subsystem. Writes serialize through one `RwLock` writer; reads are
//! concurrent. Every public operation is atomic with respect to the others;
//! there are no multi-operation transactions.

mod object;
mod store;
mod world_state;

pub use object::{Object, PropDef, PropOverride, VerbDef};
pub use store::{ObjectStore, builtin_property};
pub use world_state::{SNAPSHOT_VERSION, StoreSnapshot, WorldState};
