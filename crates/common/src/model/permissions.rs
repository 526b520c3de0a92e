use crate::model::{ObjFlag, PropFlag, VerbFlag, WorldStateError};
use crate::util::BitEnum;
use warren_var::Obj;

/// The authority a task or verb frame acts with: an object id and its flags.
#[derive(Clone, Debug)]
pub struct Perms {
    pub who: Obj,
    pub flags: BitEnum<ObjFlag>,
}

impl Perms {
    pub fn new(who: Obj, flags: BitEnum<ObjFlag>) -> Self {
        Self { who, flags }
    }

    #[must_use]
    pub fn is_wizard(&self) -> bool {
        self.flags.contains(ObjFlag::Wizard)
    }

    #[must_use]
    pub fn is_programmer(&self) -> bool {
        self.flags.contains(ObjFlag::Programmer)
    }

    pub fn check_wizard(&self) -> Result<(), WorldStateError> {
        if self.is_wizard() {
            Ok(())
        } else {
            Err(WorldStateError::ObjectPermissionDenied(self.who))
        }
    }

    pub fn check_is_programmer(&self) -> Result<(), WorldStateError> {
        if self.is_programmer() || self.is_wizard() {
            Ok(())
        } else {
            Err(WorldStateError::ObjectPermissionDenied(self.who))
        }
    }

    /// Wizards and owners pass; otherwise the object must carry the named
    /// flag (Read/Write/Fertile).
    pub fn check_object_allows(
        &self,
        obj: Obj,
        owner: Obj,
        obj_flags: BitEnum<ObjFlag>,
        which: ObjFlag,
    ) -> Result<(), WorldStateError> {
        if self.is_wizard() || self.who == owner || obj_flags.contains(which) {
            Ok(())
        } else {
            Err(WorldStateError::ObjectPermissionDenied(obj))
        }
    }

    pub fn check_property_allows(
        &self,
        obj: Obj,
        name: &str,
        prop_owner: Obj,
        prop_flags: BitEnum<PropFlag>,
        which: PropFlag,
    ) -> Result<(), WorldStateError> {
        if self.is_wizard() || self.who == prop_owner || prop_flags.contains(which) {
            Ok(())
        } else {
            Err(WorldStateError::PropertyPermissionDenied(
                obj,
                name.to_string(),
            ))
        }
    }

    pub fn check_verb_allows(
        &self,
        obj: Obj,
        name: &str,
        verb_owner: Obj,
        verb_flags: BitEnum<VerbFlag>,
        which: VerbFlag,
    ) -> Result<(), WorldStateError> {
        if self.is_wizard() || self.who == verb_owner || verb_flags.contains(which) {
            Ok(())
        } else {
            Err(WorldStateError::VerbPermissionDenied(obj, name.to_string()))
        }
    }
}
