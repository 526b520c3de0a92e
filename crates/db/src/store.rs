use crate::object::{Object, PropDef, PropOverride, VerbDef};
use bincode::{Decode, Encode};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::warn;
use warren_common::model::{ObjFlag, PropFlag, VerbArgsSpec, VerbFlag, WorldStateError};
use warren_common::util::BitEnum;
use warren_compiler::Program;
use warren_var::{NOTHING, Obj, Symbol, Var, Variant, v_bool, v_list_iter, v_obj, v_str};

/// The object graph plus the id-allocation state. `max_object` is monotonic
/// and never decreases except through an explicit `reset_max_object`;
/// `recycled` holds freed ids awaiting reuse. Player ids are never freed.
#[derive(Clone, Encode, Decode)]
pub struct ObjectStore {
    objects: HashMap<Obj, Object>,
    max_object: i64,
    recycled: BTreeSet<i64>,
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore {
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            max_object: -1,
            recycled: BTreeSet::new(),
        }
    }

    /// The minimal world: #0 the system object and #1 a wizard player.
    /// Used when there is no snapshot and no core database to load.
    pub fn bootstrap_minimal() -> Self {
        let mut store = Self::new();
        let wizard = Obj::mk_id(1);
        let mut sysobj = Object::new(Obj::mk_id(0), NOTHING, wizard);
        sysobj.name = "System Object".to_string();
        let mut wiz = Object::new(wizard, NOTHING, wizard);
        wiz.name = "Wizard".to_string();
        wiz.flags = BitEnum::new_with(ObjFlag::User) | ObjFlag::Wizard | ObjFlag::Programmer;
        store.objects.insert(sysobj.id, sysobj);
        store.objects.insert(wiz.id, wiz);
        store.max_object = 1;
        store
    }

    pub fn valid(&self, obj: Obj) -> bool {
        self.objects.contains_key(&obj)
    }

    pub fn get(&self, obj: Obj) -> Result<&Object, WorldStateError> {
        self.objects
            .get(&obj)
            .ok_or(WorldStateError::ObjectNotFound(obj))
    }

    fn get_mut(&mut self, obj: Obj) -> Result<&mut Object, WorldStateError> {
        self.objects
            .get_mut(&obj)
            .ok_or(WorldStateError::ObjectNotFound(obj))
    }

    pub fn max_object(&self) -> i64 {
        self.max_object
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn object_ids(&self) -> Vec<Obj> {
        let mut ids: Vec<Obj> = self.objects.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Raw insertion for loaders; keeps `max_object` monotonic.
    pub fn put_object(&mut self, object: Object) {
        if object.id.id() > self.max_object {
            self.max_object = object.id.id();
        }
        self.recycled.remove(&object.id.id());
        self.objects.insert(object.id, object);
    }

    /// For loaders restoring a dump whose max-object exceeds the highest
    /// live id (recycled tail ids stay reserved).
    pub fn set_max_object(&mut self, max: i64) {
        if max > self.max_object {
            self.max_object = max;
        }
    }

    /// For loaders: an id below `max_object` with no live object is a
    /// recycled id available for reuse.
    pub fn note_free_id(&mut self, id: i64) {
        if id >= 0 && !self.objects.contains_key(&Obj::mk_id(id)) {
            self.recycled.insert(id);
        }
    }

    /// Raw mutable access for loaders and converters.
    pub fn with_object_mut<R>(
        &mut self,
        obj: Obj,
        f: impl FnOnce(&mut Object) -> R,
    ) -> Result<R, WorldStateError> {
        let o = self.get_mut(obj)?;
        Ok(f(o))
    }

    /// The ancestor chain starting at (and including) `obj`. Only live
    /// objects appear; a dangling parent pointer ends the chain.
    pub fn ancestors(&self, obj: Obj) -> Vec<Obj> {
        let mut chain = vec![];
        let mut cur = obj;
        while cur != NOTHING {
            if chain.contains(&cur) {
                warn!("parent cycle detected at {cur}");
                break;
            }
            let Some(o) = self.objects.get(&cur) else {
                break;
            };
            chain.push(cur);
            cur = o.parent;
        }
        chain
    }

    fn descendants(&self, obj: Obj) -> Vec<Obj> {
        let mut out = vec![];
        let mut queue = vec![obj];
        while let Some(o) = queue.pop() {
            if let Some(obj) = self.objects.get(&o) {
                for c in &obj.children {
                    out.push(*c);
                    queue.push(*c);
                }
            }
        }
        out
    }

    // ---- object lifecycle ----------------------------------------------

    /// Draw the lowest recycled id, else `max_object + 1`. A `NOTHING` owner
    /// makes the object own itself.
    pub fn create_object(&mut self, parent: Obj, owner: Obj) -> Result<Obj, WorldStateError> {
        if parent != NOTHING && !self.valid(parent) {
            return Err(WorldStateError::InvalidParent(parent));
        }
        let id = match self.recycled.iter().next().copied() {
            Some(id) => {
                self.recycled.remove(&id);
                Obj::mk_id(id)
            }
            None => {
                self.max_object += 1;
                Obj::mk_id(self.max_object)
            }
        };
        let owner = if owner == NOTHING { id } else { owner };
        let object = Object::new(id, parent, owner);
        self.objects.insert(id, object);
        if parent != NOTHING {
            self.get_mut(parent)?.children.push(id);
        }
        Ok(id)
    }

    /// Remove an object: children are reparented to its parent, contents
    /// dropped to `NOTHING`, and the id returned to the pool. Fails on
    /// players; their ids are reserved forever.
    pub fn recycle_object(&mut self, obj: Obj) -> Result<(), WorldStateError> {
        let o = self.get(obj)?;
        if o.is_player() {
            return Err(WorldStateError::ObjectPermissionDenied(obj));
        }
        let parent = o.parent;
        let location = o.location;
        let children = o.children.clone();
        let contents = o.contents.clone();

        for c in &children {
            if let Ok(child) = self.get_mut(*c) {
                child.parent = parent;
            }
        }
        if parent != NOTHING {
            let p = self.get_mut(parent)?;
            p.children.retain(|c| *c != obj);
            p.children.extend(children.iter().copied());
        }
        for thing in &contents {
            if let Ok(t) = self.get_mut(*thing) {
                t.location = NOTHING;
            }
        }
        if location != NOTHING {
            if let Ok(l) = self.get_mut(location) {
                l.contents.retain(|c| *c != obj);
            }
        }
        self.objects.remove(&obj);
        self.recycled.insert(obj.id());
        Ok(())
    }

    /// Reparent, preserving the acyclicity invariant and rejecting property
    /// name collisions between the subtree and the new ancestors.
    pub fn change_parent(&mut self, obj: Obj, new_parent: Obj) -> Result<(), WorldStateError> {
        let old_parent = self.get(obj)?.parent;
        if new_parent != NOTHING {
            if !self.valid(new_parent) {
                return Err(WorldStateError::InvalidParent(new_parent));
            }
            if self.ancestors(new_parent).contains(&obj) {
                return Err(WorldStateError::RecursiveMove(obj, new_parent));
            }
            let new_ancestor_props = self.defined_property_names(new_parent);
            let mut subtree = vec![obj];
            subtree.extend(self.descendants(obj));
            for member in &subtree {
                for def in &self.get(*member)?.propdefs {
                    if new_ancestor_props.contains(&def.name) {
                        return Err(WorldStateError::DuplicatePropertyDefinition(
                            *member,
                            def.name.to_string(),
                        ));
                    }
                }
            }
        }

        if old_parent != NOTHING {
            self.get_mut(old_parent)?.children.retain(|c| *c != obj);
        }
        self.get_mut(obj)?.parent = new_parent;
        if new_parent != NOTHING {
            self.get_mut(new_parent)?.children.push(obj);
        }

        // Overrides for properties no longer defined by any ancestor are
        // stale; drop them across the subtree.
        let mut subtree = vec![obj];
        subtree.extend(self.descendants(obj));
        for member in subtree {
            let inherited: BTreeSet<Symbol> = self
                .ancestors(member)
                .iter()
                .skip(1)
                .flat_map(|a| {
                    self.objects[a]
                        .propdefs
                        .iter()
                        .map(|d| d.name.clone())
                        .collect::<Vec<_>>()
                })
                .collect();
            let m = self.get_mut(member)?;
            m.overrides.retain(|name, _| inherited.contains(name));
        }
        Ok(())
    }

    /// Move `what` into `dest`, forbidding location cycles.
    pub fn move_object(&mut self, what: Obj, dest: Obj) -> Result<(), WorldStateError> {
        self.get(what)?;
        if dest != NOTHING {
            self.get(dest)?;
            // Walk up from dest through its location chain; finding `what`
            // there (or dest == what) would create a cycle.
            let mut cur = dest;
            while cur != NOTHING {
                if cur == what {
                    return Err(WorldStateError::RecursiveMove(what, dest));
                }
                cur = self.get(cur)?.location;
            }
        }
        let old_location = self.get(what)?.location;
        if old_location != NOTHING {
            if let Ok(l) = self.get_mut(old_location) {
                l.contents.retain(|c| *c != what);
            }
        }
        self.get_mut(what)?.location = dest;
        if dest != NOTHING {
            self.get_mut(dest)?.contents.push(what);
        }
        Ok(())
    }

    /// Give a non-player object the lowest free id below its current one.
    /// With no lower id free, the object keeps its id.
    pub fn renumber_object(&mut self, obj: Obj) -> Result<Obj, WorldStateError> {
        let o = self.get(obj)?;
        if o.is_player() {
            return Err(WorldStateError::ObjectPermissionDenied(obj));
        }
        let Some(new_id) = self
            .recycled
            .iter()
            .next()
            .copied()
            .filter(|id| *id < obj.id())
        else {
            return Ok(obj);
        };
        let new = Obj::mk_id(new_id);
        self.recycled.remove(&new_id);
        self.recycled.insert(obj.id());

        let mut object = self.objects.remove(&obj).unwrap();
        object.id = new;
        self.objects.insert(new, object);

        // Structural references follow the object to its new id.
        for other in self.objects.values_mut() {
            if other.parent == obj {
                other.parent = new;
            }
            if other.location == obj {
                other.location = new;
            }
            if other.owner == obj {
                other.owner = new;
            }
            for c in other.children.iter_mut() {
                if *c == obj {
                    *c = new;
                }
            }
            for c in other.contents.iter_mut() {
                if *c == obj {
                    *c = new;
                }
            }
            for p in other.propdefs.iter_mut() {
                if p.owner == obj {
                    p.owner = new;
                }
            }
            for ov in other.overrides.values_mut() {
                if ov.owner == obj {
                    ov.owner = new;
                }
            }
            for v in other.verbs.iter_mut() {
                if v.owner == obj {
                    v.owner = new;
                }
            }
        }
        Ok(new)
    }

    /// Lower `max_object` to the highest live id and drop now-unreachable
    /// pool entries.
    pub fn reset_max_object(&mut self) {
        let highest = self.objects.keys().map(|o| o.id()).max().unwrap_or(-1);
        self.max_object = highest;
        self.recycled.retain(|id| *id <= highest);
    }

    pub fn players(&self) -> Vec<Obj> {
        let mut players: Vec<Obj> = self
            .objects
            .values()
            .filter(|o| o.is_player())
            .map(|o| o.id)
            .collect();
        players.sort();
        players
    }

    pub fn set_player_flag(&mut self, obj: Obj, is_player: bool) -> Result<(), WorldStateError> {
        let o = self.get_mut(obj)?;
        if is_player {
            o.flags.set(ObjFlag::User);
        } else {
            o.flags.clear(ObjFlag::User);
        }
        Ok(())
    }

    // ---- property resolution -------------------------------------------

    /// All property names defined on `obj` or its ancestors.
    pub fn defined_property_names(&self, obj: Obj) -> BTreeSet<Symbol> {
        let mut names = BTreeSet::new();
        for a in self.ancestors(obj) {
            for d in &self.objects[&a].propdefs {
                names.insert(d.name.clone());
            }
        }
        names
    }

    /// Inheritance-aware property read. Built-in names come first, then the
    /// chain walk with `Clear` falling through.
    pub fn resolve_property(&self, obj: Obj, name: &Symbol) -> Result<Var, WorldStateError> {
        let o = self.get(obj)?;
        if let Some(v) = builtin_property(self, o, name.as_str()) {
            return Ok(v);
        }
        for a in self.ancestors(obj) {
            let ao = &self.objects[&a];
            if let Some(ov) = ao.overrides.get(name) {
                if !ov.value.is_clear() {
                    return Ok(ov.value.clone());
                }
            }
            if let Some(def) = ao.propdef(name) {
                if !def.value.is_clear() {
                    return Ok(def.value.clone());
                }
            }
        }
        Err(WorldStateError::PropertyNotFound(obj, name.to_string()))
    }

    /// The owner and perms of the effective slot for `name` on `obj`.
    pub fn property_info(
        &self,
        obj: Obj,
        name: &Symbol,
    ) -> Result<(Obj, BitEnum<PropFlag>), WorldStateError> {
        self.get(obj)?;
        for a in self.ancestors(obj) {
            let ao = &self.objects[&a];
            if let Some(ov) = ao.overrides.get(name) {
                return Ok((ov.owner, ov.flags));
            }
            if let Some(def) = ao.propdef(name) {
                return Ok((def.owner, def.flags));
            }
        }
        Err(WorldStateError::PropertyNotFound(obj, name.to_string()))
    }

    /// Whether the slot on `obj` itself is clear (i.e. inherits its value).
    pub fn is_property_clear(&self, obj: Obj, name: &Symbol) -> Result<bool, WorldStateError> {
        let o = self.get(obj)?;
        if o.propdef(name).is_some() {
            return Ok(false);
        }
        if let Some(ov) = o.overrides.get(name) {
            return Ok(ov.value.is_clear());
        }
        // No local state at all: defined above us means clear-by-default.
        for a in self.ancestors(obj).into_iter().skip(1) {
            if self.objects[&a].propdef(name).is_some() {
                return Ok(true);
            }
        }
        Err(WorldStateError::PropertyNotFound(obj, name.to_string()))
    }

    /// Write a property. On the definer the slot is replaced in place; on a
    /// descendant an override is recorded. `Clear` is a legal value on
    /// descendants and resurrects the inherited one.
    pub fn update_property(
        &mut self,
        obj: Obj,
        name: &Symbol,
        value: Var,
    ) -> Result<(), WorldStateError> {
        self.get(obj)?;
        if is_builtin_property(name.as_str()) {
            return self.update_builtin_property(obj, name, value);
        }
        if self.get(obj)?.propdef(name).is_some() {
            if value.is_clear() {
                return Err(WorldStateError::InvalidArgument(format!(
                    "cannot clear {name} on its definer {obj}"
                )));
            }
            let def = self.get_mut(obj)?.propdef_mut(name).unwrap();
            def.value = value;
            return Ok(());
        }
        // Defined by an ancestor?
        let (owner, flags) = self.property_info(obj, name)?;
        let o = self.get_mut(obj)?;
        match o.overrides.get_mut(name) {
            Some(ov) => ov.value = value,
            None => {
                o.overrides.insert(
                    name.clone(),
                    PropOverride {
                        value,
                        owner,
                        flags,
                    },
                );
            }
        }
        Ok(())
    }

    fn update_builtin_property(
        &mut self,
        obj: Obj,
        name: &Symbol,
        value: Var,
    ) -> Result<(), WorldStateError> {
        match name.as_str().to_ascii_lowercase().as_str() {
            "name" => {
                let Variant::Str(s) = value.variant() else {
                    return Err(WorldStateError::InvalidArgument(
                        "name must be a string".to_string(),
                    ));
                };
                self.get_mut(obj)?.name = s.as_str().to_string();
                Ok(())
            }
            "owner" => {
                let Variant::Obj(o) = value.variant() else {
                    return Err(WorldStateError::InvalidArgument(
                        "owner must be an object".to_string(),
                    ));
                };
                self.get_mut(obj)?.owner = *o;
                Ok(())
            }
            "wizard" => {
                self.set_flag(obj, ObjFlag::Wizard, value.is_true())
            }
            "programmer" => {
                self.set_flag(obj, ObjFlag::Programmer, value.is_true())
            }
            // location/contents/parent change only through move/chparent.
            _ => Err(WorldStateError::ObjectPermissionDenied(obj)),
        }
    }

    fn set_flag(&mut self, obj: Obj, flag: ObjFlag, on: bool) -> Result<(), WorldStateError> {
        let o = self.get_mut(obj)?;
        if on {
            o.flags.set(flag);
        } else {
            o.flags.clear(flag);
        }
        Ok(())
    }

    /// Reset a descendant's slot to inherit again. Illegal on the definer.
    pub fn clear_property(&mut self, obj: Obj, name: &Symbol) -> Result<(), WorldStateError> {
        if self.get(obj)?.propdef(name).is_some() {
            return Err(WorldStateError::InvalidArgument(format!(
                "cannot clear {name} on its definer {obj}"
            )));
        }
        // Verify it's defined somewhere above.
        self.property_info(obj, name)?;
        let o = self.get_mut(obj)?;
        match o.overrides.get_mut(name) {
            Some(ov) => ov.value = Var::mk_clear(),
            None => {}
        }
        Ok(())
    }

    pub fn add_property(
        &mut self,
        obj: Obj,
        name: Symbol,
        value: Var,
        owner: Obj,
        flags: BitEnum<PropFlag>,
    ) -> Result<(), WorldStateError> {
        self.get(obj)?;
        if is_builtin_property(name.as_str()) {
            return Err(WorldStateError::InvalidArgument(format!(
                "{name} is a built-in property"
            )));
        }
        if self.defined_property_names(obj).contains(&name) {
            return Err(WorldStateError::DuplicatePropertyDefinition(
                obj,
                name.to_string(),
            ));
        }
        for d in self.descendants(obj) {
            if self.objects[&d].propdef(&name).is_some() {
                return Err(WorldStateError::DuplicatePropertyDefinition(
                    d,
                    name.to_string(),
                ));
            }
        }
        self.get_mut(obj)?.propdefs.push(PropDef {
            name,
            value,
            owner,
            flags,
        });
        Ok(())
    }

    pub fn delete_property(&mut self, obj: Obj, name: &Symbol) -> Result<(), WorldStateError> {
        let o = self.get(obj)?;
        if o.propdef(name).is_none() {
            return Err(WorldStateError::PropertyNotFound(obj, name.to_string()));
        }
        for d in self.descendants(obj) {
            self.get_mut(d)?.overrides.remove(name);
        }
        let o = self.get_mut(obj)?;
        o.propdefs.retain(|p| &p.name != name);
        o.overrides.remove(name);
        Ok(())
    }

    pub fn set_property_info(
        &mut self,
        obj: Obj,
        name: &Symbol,
        new_owner: Obj,
        new_flags: BitEnum<PropFlag>,
        new_name: Option<Symbol>,
    ) -> Result<(), WorldStateError> {
        self.get(obj)?;
        let defines_locally = self.get(obj)?.propdef(name).is_some();
        if let Some(new_name) = &new_name {
            if !defines_locally {
                return Err(WorldStateError::InvalidArgument(
                    "can only rename a property on its definer".to_string(),
                ));
            }
            if new_name != name && self.defined_property_names(obj).contains(new_name) {
                return Err(WorldStateError::DuplicatePropertyDefinition(
                    obj,
                    new_name.to_string(),
                ));
            }
            for d in self.descendants(obj) {
                let dobj = self.get_mut(d)?;
                if let Some(ov) = dobj.overrides.remove(name) {
                    dobj.overrides.insert(new_name.clone(), ov);
                }
            }
        }
        if defines_locally {
            let def = self.get_mut(obj)?.propdef_mut(name).unwrap();
            def.owner = new_owner;
            def.flags = new_flags;
            if let Some(new_name) = new_name {
                def.name = new_name;
            }
            return Ok(());
        }
        // On a descendant, info lives in the override slot; create one that
        // still inherits its value if needed.
        self.property_info(obj, name)?;
        let o = self.get_mut(obj)?;
        match o.overrides.get_mut(name) {
            Some(ov) => {
                ov.owner = new_owner;
                ov.flags = new_flags;
            }
            None => {
                o.overrides.insert(
                    name.clone(),
                    PropOverride {
                        value: Var::mk_clear(),
                        owner: new_owner,
                        flags: new_flags,
                    },
                );
            }
        }
        Ok(())
    }

    // ---- verbs ----------------------------------------------------------

    /// Pattern-match `name` against verbs walking the ancestor chain.
    /// The first matching verb on the nearest object wins.
    pub fn find_verb(
        &self,
        obj: Obj,
        name: &str,
    ) -> Result<(Obj, usize, VerbDef), WorldStateError> {
        self.get(obj)?;
        for a in self.ancestors(obj) {
            let ao = &self.objects[&a];
            for (i, v) in ao.verbs.iter().enumerate() {
                if v.matches_name(name) {
                    return Ok((a, i, v.clone()));
                }
            }
        }
        Err(WorldStateError::VerbNotFound(obj, name.to_string()))
    }

    /// Command dispatch: name plus argument-spec match, walking the chain.
    pub fn find_command_verb(
        &self,
        obj: Obj,
        name: &str,
        argspec: &VerbArgsSpec,
    ) -> Result<Option<(Obj, usize, VerbDef)>, WorldStateError> {
        self.get(obj)?;
        for a in self.ancestors(obj) {
            let ao = &self.objects[&a];
            for (i, v) in ao.verbs.iter().enumerate() {
                if v.matches_name(name) && v.args.matches(argspec) {
                    return Ok(Some((a, i, v.clone())));
                }
            }
        }
        Ok(None)
    }

    /// Locate a verb on `obj` itself by name or by 1-based index string, the
    /// "verb descriptor" accepted by the verb CRUD builtins.
    pub fn find_verbdef(&self, obj: Obj, desc: &str) -> Result<(usize, VerbDef), WorldStateError> {
        let o = self.get(obj)?;
        if let Ok(n) = desc.parse::<usize>() {
            if n >= 1 && n <= o.verbs.len() {
                return Ok((n - 1, o.verbs[n - 1].clone()));
            }
            return Err(WorldStateError::VerbNotFound(obj, desc.to_string()));
        }
        for (i, v) in o.verbs.iter().enumerate() {
            if v.matches_name(desc) {
                return Ok((i, v.clone()));
            }
        }
        Err(WorldStateError::VerbNotFound(obj, desc.to_string()))
    }

    pub fn add_verb(
        &mut self,
        obj: Obj,
        names: Vec<String>,
        owner: Obj,
        flags: BitEnum<VerbFlag>,
        args: VerbArgsSpec,
    ) -> Result<usize, WorldStateError> {
        if names.is_empty() {
            return Err(WorldStateError::InvalidArgument(
                "verb must have at least one name".to_string(),
            ));
        }
        let o = self.get_mut(obj)?;
        o.verbs.push(VerbDef {
            names,
            owner,
            flags,
            args,
            code: vec![],
            program: None,
        });
        Ok(o.verbs.len() - 1)
    }

    pub fn delete_verb(&mut self, obj: Obj, index: usize) -> Result<(), WorldStateError> {
        let o = self.get_mut(obj)?;
        if index >= o.verbs.len() {
            return Err(WorldStateError::VerbNotFound(obj, index.to_string()));
        }
        o.verbs.remove(index);
        Ok(())
    }

    pub fn set_verb_info(
        &mut self,
        obj: Obj,
        index: usize,
        owner: Option<Obj>,
        flags: Option<BitEnum<VerbFlag>>,
        names: Option<Vec<String>>,
    ) -> Result<(), WorldStateError> {
        let o = self.get_mut(obj)?;
        let Some(v) = o.verbs.get_mut(index) else {
            return Err(WorldStateError::VerbNotFound(obj, index.to_string()));
        };
        if let Some(owner) = owner {
            v.owner = owner;
        }
        if let Some(flags) = flags {
            v.flags = flags;
        }
        if let Some(names) = names {
            if names.is_empty() {
                return Err(WorldStateError::InvalidArgument(
                    "verb must have at least one name".to_string(),
                ));
            }
            v.names = names;
        }
        Ok(())
    }

    pub fn set_verb_args(
        &mut self,
        obj: Obj,
        index: usize,
        args: VerbArgsSpec,
    ) -> Result<(), WorldStateError> {
        let o = self.get_mut(obj)?;
        let Some(v) = o.verbs.get_mut(index) else {
            return Err(WorldStateError::VerbNotFound(obj, index.to_string()));
        };
        v.args = args;
        Ok(())
    }

    /// Replace verb source; the cached AST is invalidated.
    pub fn set_verb_code(
        &mut self,
        obj: Obj,
        index: usize,
        code: Vec<String>,
    ) -> Result<(), WorldStateError> {
        let o = self.get_mut(obj)?;
        let Some(v) = o.verbs.get_mut(index) else {
            return Err(WorldStateError::VerbNotFound(obj, index.to_string()));
        };
        v.code = code;
        v.program = None;
        Ok(())
    }

    /// Memoize the parsed AST for a verb. Purely a cache write; running from
    /// the cache is equivalent to re-parsing the source.
    pub fn cache_verb_program(
        &mut self,
        obj: Obj,
        index: usize,
        program: Arc<Program>,
    ) -> Result<(), WorldStateError> {
        let o = self.get_mut(obj)?;
        let Some(v) = o.verbs.get_mut(index) else {
            return Err(WorldStateError::VerbNotFound(obj, index.to_string()));
        };
        v.program = Some(program);
        Ok(())
    }

    pub fn invalidate_verb_cache(&mut self, obj: Obj, index: usize) {
        if let Some(o) = self.objects.get_mut(&obj) {
            if let Some(v) = o.verbs.get_mut(index) {
                v.program = None;
            }
        }
    }
}

pub(crate) fn is_builtin_property(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "name" | "owner" | "location" | "contents" | "parent" | "wizard" | "programmer"
    )
}

/// Built-in property names are synthesized from the object structure and
/// shadow everything in the property lists.
pub fn builtin_property(store: &ObjectStore, o: &Object, name: &str) -> Option<Var> {
    match name.to_ascii_lowercase().as_str() {
        "name" => Some(v_str(&o.name)),
        "owner" => Some(v_obj(o.owner)),
        "location" => Some(v_obj(o.location)),
        "contents" => Some(v_list_iter(o.contents.iter().map(|c| v_obj(*c)))),
        "parent" => Some(v_obj(o.parent)),
        "wizard" => Some(v_bool(o.flags.contains(ObjFlag::Wizard))),
        "programmer" => Some(v_bool(o.flags.contains(ObjFlag::Programmer))),
        _ => {
            let _ = store;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warren_var::{v_int, E_PROPNF};

    fn test_store() -> ObjectStore {
        ObjectStore::bootstrap_minimal()
    }

    #[test]
    fn create_and_max_object() {
        let mut s = test_store();
        let a = s.create_object(NOTHING, NOTHING).unwrap();
        assert_eq!(a, Obj::mk_id(2));
        assert_eq!(s.max_object(), 2);
        // Self-owned when owner is NOTHING.
        assert_eq!(s.get(a).unwrap().owner, a);
    }

    #[test]
    fn recycle_reuses_lowest_id() {
        let mut s = test_store();
        let a = s.create_object(NOTHING, NOTHING).unwrap(); // #2
        let b = s.create_object(NOTHING, NOTHING).unwrap(); // #3
        let c = s.create_object(NOTHING, NOTHING).unwrap(); // #4
        assert_eq!((a.id(), b.id(), c.id()), (2, 3, 4));
        s.recycle_object(b).unwrap();
        assert_eq!(s.max_object(), 4);
        let d = s.create_object(NOTHING, NOTHING).unwrap();
        assert_eq!(d, Obj::mk_id(3));
        assert_eq!(s.max_object(), 4);
    }

    #[test]
    fn recycle_player_denied() {
        let mut s = test_store();
        let p = s.create_object(NOTHING, NOTHING).unwrap();
        s.set_player_flag(p, true).unwrap();
        assert!(matches!(
            s.recycle_object(p),
            Err(WorldStateError::ObjectPermissionDenied(_))
        ));
    }

    #[test]
    fn recycle_reparents_children() {
        let mut s = test_store();
        let gp = s.create_object(NOTHING, NOTHING).unwrap();
        let p = s.create_object(gp, NOTHING).unwrap();
        let c = s.create_object(p, NOTHING).unwrap();
        s.recycle_object(p).unwrap();
        assert_eq!(s.get(c).unwrap().parent, gp);
        assert!(s.get(gp).unwrap().children.contains(&c));
    }

    #[test]
    fn property_inheritance_and_clear() {
        let mut s = test_store();
        let parent = s.create_object(NOTHING, NOTHING).unwrap();
        let child = s.create_object(parent, NOTHING).unwrap();
        let name = Symbol::mk("color");
        s.add_property(parent, name.clone(), v_str("red"), parent, PropFlag::rc())
            .unwrap();

        // Child inherits.
        assert_eq!(s.resolve_property(child, &name).unwrap(), v_str("red"));
        assert!(s.is_property_clear(child, &name).unwrap());

        // Override, then clear resurrects the inherited value.
        s.update_property(child, &name, v_str("blue")).unwrap();
        assert_eq!(s.resolve_property(child, &name).unwrap(), v_str("blue"));
        assert!(!s.is_property_clear(child, &name).unwrap());
        s.clear_property(child, &name).unwrap();
        assert_eq!(s.resolve_property(child, &name).unwrap(), v_str("red"));

        // Changing the parent value shows through again.
        s.update_property(parent, &name, v_str("green")).unwrap();
        assert_eq!(s.resolve_property(child, &name).unwrap(), v_str("green"));
    }

    #[test]
    fn builtin_properties_shadow() {
        let mut s = test_store();
        let o = s.create_object(NOTHING, NOTHING).unwrap();
        s.update_property(o, &Symbol::mk("name"), v_str("widget"))
            .unwrap();
        assert_eq!(
            s.resolve_property(o, &Symbol::mk("name")).unwrap(),
            v_str("widget")
        );
        assert!(
            s.add_property(o, Symbol::mk("name"), v_int(1), o, PropFlag::rc())
                .is_err()
        );
        let e = s
            .resolve_property(o, &Symbol::mk("no_such_prop"))
            .unwrap_err();
        assert_eq!(e.to_error().err_type, E_PROPNF);
    }

    #[test]
    fn duplicate_property_rejected_across_chain() {
        let mut s = test_store();
        let parent = s.create_object(NOTHING, NOTHING).unwrap();
        let child = s.create_object(parent, NOTHING).unwrap();
        let name = Symbol::mk("size");
        s.add_property(parent, name.clone(), v_int(1), parent, PropFlag::rc())
            .unwrap();
        assert!(matches!(
            s.add_property(child, name.clone(), v_int(2), child, PropFlag::rc()),
            Err(WorldStateError::DuplicatePropertyDefinition(_, _))
        ));
        // And downward: defining on the parent when a child already has it.
        let other = Symbol::mk("weight");
        s.add_property(child, other.clone(), v_int(2), child, PropFlag::rc())
            .unwrap();
        assert!(matches!(
            s.add_property(parent, other, v_int(1), parent, PropFlag::rc()),
            Err(WorldStateError::DuplicatePropertyDefinition(_, _))
        ));
    }

    #[test]
    fn delete_property_removes_descendant_overrides() {
        let mut s = test_store();
        let parent = s.create_object(NOTHING, NOTHING).unwrap();
        let child = s.create_object(parent, NOTHING).unwrap();
        let name = Symbol::mk("color");
        s.add_property(parent, name.clone(), v_str("red"), parent, PropFlag::rc())
            .unwrap();
        s.update_property(child, &name, v_str("blue")).unwrap();
        s.delete_property(parent, &name).unwrap();
        assert!(s.resolve_property(child, &name).is_err());
        assert!(s.get(child).unwrap().overrides.is_empty());
    }

    #[test]
    fn move_cycle_forbidden() {
        let mut s = test_store();
        let a = s.create_object(NOTHING, NOTHING).unwrap();
        let b = s.create_object(NOTHING, NOTHING).unwrap();
        s.move_object(b, a).unwrap();
        assert!(matches!(
            s.move_object(a, b),
            Err(WorldStateError::RecursiveMove(_, _))
        ));
        assert!(matches!(
            s.move_object(a, a),
            Err(WorldStateError::RecursiveMove(_, _))
        ));
        // Contents recomputed on legal moves.
        s.move_object(b, NOTHING).unwrap();
        assert!(s.get(a).unwrap().contents.is_empty());
    }

    #[test]
    fn chparent_cycle_forbidden() {
        let mut s = test_store();
        let a = s.create_object(NOTHING, NOTHING).unwrap();
        let b = s.create_object(a, NOTHING).unwrap();
        assert!(matches!(
            s.change_parent(a, b),
            Err(WorldStateError::RecursiveMove(_, _))
        ));
    }

    #[test]
    fn verb_resolution_walks_chain() {
        let mut s = test_store();
        let parent = s.create_object(NOTHING, NOTHING).unwrap();
        let child = s.create_object(parent, NOTHING).unwrap();
        s.add_verb(
            parent,
            vec!["l*ook".to_string()],
            parent,
            VerbFlag::rxd(),
            VerbArgsSpec::this_none_this(),
        )
        .unwrap();
        let (definer, idx, v) = s.find_verb(child, "look").unwrap();
        assert_eq!(definer, parent);
        assert_eq!(idx, 0);
        assert!(v.matches_name("l"));
        assert!(s.find_verb(child, "frob").is_err());
    }

    #[test]
    fn first_matching_verb_wins() {
        let mut s = test_store();
        let o = s.create_object(NOTHING, NOTHING).unwrap();
        s.add_verb(
            o,
            vec!["get".to_string()],
            o,
            VerbFlag::rxd(),
            VerbArgsSpec::this_none_this(),
        )
        .unwrap();
        s.add_verb(
            o,
            vec!["get".to_string()],
            Obj::mk_id(1),
            VerbFlag::rxd(),
            VerbArgsSpec::this_none_this(),
        )
        .unwrap();
        let (_, idx, v) = s.find_verb(o, "get").unwrap();
        assert_eq!(idx, 0);
        assert_eq!(v.owner, o);
    }

    #[test]
    fn renumber_takes_lowest_free() {
        let mut s = test_store();
        let a = s.create_object(NOTHING, NOTHING).unwrap(); // #2
        let _b = s.create_object(NOTHING, NOTHING).unwrap(); // #3
        let c = s.create_object(a, NOTHING).unwrap(); // #4
        s.recycle_object(a).unwrap(); // frees #2
        let new = s.renumber_object(c).unwrap();
        assert_eq!(new, Obj::mk_id(2));
        assert!(s.valid(new));
        assert!(!s.valid(Obj::mk_id(4)));
        // No free id below: keeps its id.
        let d = s.create_object(NOTHING, NOTHING).unwrap();
        let kept = s.renumber_object(d).unwrap();
        assert_eq!(kept, d);
    }

    #[test]
    fn reset_max_object_drops_tail() {
        let mut s = test_store();
        let a = s.create_object(NOTHING, NOTHING).unwrap(); // #2
        let b = s.create_object(NOTHING, NOTHING).unwrap(); // #3
        s.recycle_object(b).unwrap();
        s.recycle_object(a).unwrap();
        s.reset_max_object();
        assert_eq!(s.max_object(), 1);
        let n = s.create_object(NOTHING, NOTHING).unwrap();
        assert_eq!(n, Obj::mk_id(2));
    }
}
