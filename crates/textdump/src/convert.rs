use crate::{
    Object as TdObject, Propval, Textdump, TextdumpError, VERSION_STRING, Verbdef,
    VF_DEBUG, VF_DOBJSHIFT, VF_EXEC, VF_IOBJSHIFT, VF_OBJMASK, VF_PERMMASK, VF_READ, VF_WRITE,
};
use std::collections::BTreeMap;
use tracing::warn;
use warren_common::model::{ArgSpec, PrepSpec, VerbArgsSpec, VerbFlag};
use warren_common::util::BitEnum;
use warren_db::{Object, ObjectStore, PropDef, PropOverride, VerbDef};
use warren_var::{NOTHING, Obj, Symbol, Var, v_none};

fn pack_verb_flags(v: &VerbDef) -> u16 {
    let mut f = 0u16;
    if v.flags.contains(VerbFlag::Read) {
        f |= VF_READ;
    }
    if v.flags.contains(VerbFlag::Write) {
        f |= VF_WRITE;
    }
    if v.flags.contains(VerbFlag::Exec) {
        f |= VF_EXEC;
    }
    if v.flags.contains(VerbFlag::Debug) {
        f |= VF_DEBUG;
    }
    f |= (v.args.dobj as u16 & VF_OBJMASK) << VF_DOBJSHIFT;
    f |= (v.args.iobj as u16 & VF_OBJMASK) << VF_IOBJSHIFT;
    f
}

fn unpack_verb_flags(flags: u16, prep: i16) -> (BitEnum<VerbFlag>, VerbArgsSpec) {
    let perms = flags & VF_PERMMASK;
    let mut vf = BitEnum::new();
    if perms & VF_READ != 0 {
        vf |= VerbFlag::Read;
    }
    if perms & VF_WRITE != 0 {
        vf |= VerbFlag::Write;
    }
    if perms & VF_EXEC != 0 {
        vf |= VerbFlag::Exec;
    }
    if perms & VF_DEBUG != 0 {
        vf |= VerbFlag::Debug;
    }
    let dobj = ArgSpec::from_repr(((flags >> VF_DOBJSHIFT) & VF_OBJMASK) as u8)
        .unwrap_or(ArgSpec::None);
    let iobj = ArgSpec::from_repr(((flags >> VF_IOBJSHIFT) & VF_OBJMASK) as u8)
        .unwrap_or(ArgSpec::None);
    let prep = PrepSpec::from_i16(prep).unwrap_or(PrepSpec::None);
    (vf, VerbArgsSpec { dobj, prep, iobj })
}

/// Property names in the portable order: this object's definitions first,
/// then its parent's, and so on up the chain.
fn chain_prop_names(store: &ObjectStore, obj: Obj) -> Vec<Symbol> {
    let mut names = vec![];
    for a in store.ancestors(obj) {
        if let Ok(o) = store.get(a) {
            for d in &o.propdefs {
                names.push(d.name.clone());
            }
        }
    }
    names
}

/// Flatten the live store into the file layout, deriving the structural
/// chain pointers from the contents/children indices.
pub fn make_textdump(store: &ObjectStore) -> Textdump {
    let mut objects = BTreeMap::new();
    let mut programs = BTreeMap::new();

    let next_in = |list: &[Obj], me: Obj| -> Obj {
        match list.iter().position(|o| *o == me) {
            Some(i) if i + 1 < list.len() => list[i + 1],
            _ => NOTHING,
        }
    };

    for id in store.object_ids() {
        let o = store.get(id).expect("iterating live ids");
        let next = if o.location != NOTHING {
            store
                .get(o.location)
                .map(|l| next_in(&l.contents, id))
                .unwrap_or(NOTHING)
        } else {
            NOTHING
        };
        let sibling = if o.parent != NOTHING {
            store
                .get(o.parent)
                .map(|p| next_in(&p.children, id))
                .unwrap_or(NOTHING)
        } else {
            NOTHING
        };

        let verbdefs: Vec<Verbdef> = o
            .verbs
            .iter()
            .map(|v| Verbdef {
                name: v.names_string(),
                owner: v.owner,
                flags: pack_verb_flags(v),
                prep: v.args.prep.to_i16(),
            })
            .collect();

        for (i, v) in o.verbs.iter().enumerate() {
            if !v.code.is_empty() {
                programs.insert((id, i), v.code.clone());
            }
        }

        let mut propvals = vec![];
        for (i, name) in chain_prop_names(store, id).iter().enumerate() {
            let own = i < o.propdefs.len();
            if own {
                let d = &o.propdefs[i];
                propvals.push(Propval {
                    value: d.value.clone(),
                    owner: d.owner,
                    flags: d.flags.to_u16() as u8,
                    is_clear: false,
                });
            } else if let Some(ov) = o.overrides.get(name) {
                propvals.push(Propval {
                    value: if ov.value.is_clear() {
                        v_none()
                    } else {
                        ov.value.clone()
                    },
                    owner: ov.owner,
                    flags: ov.flags.to_u16() as u8,
                    is_clear: ov.value.is_clear(),
                });
            } else {
                // No local state: a clear slot with the inherited info.
                let (owner, flags) = store
                    .property_info(id, name)
                    .unwrap_or((o.owner, BitEnum::new()));
                propvals.push(Propval {
                    value: v_none(),
                    owner,
                    flags: flags.to_u16() as u8,
                    is_clear: true,
                });
            }
        }

        objects.insert(
            id,
            TdObject {
                id,
                name: o.name.clone(),
                flags: o.flags.to_u16() as u8,
                owner: o.owner,
                location: o.location,
                first_content: o.contents.first().copied().unwrap_or(NOTHING),
                next,
                parent: o.parent,
                first_child: o.children.first().copied().unwrap_or(NOTHING),
                sibling,
                verbdefs,
                propdefs: o.propdefs.iter().map(|d| d.name.to_string()).collect(),
                propvals,
            },
        );
    }

    Textdump {
        version_string: VERSION_STRING.to_string(),
        users: store.players(),
        objects,
        programs,
    }
}

/// Rebuild a live store from the file layout: contents/children recovered
/// by walking the chain pointers, property slots re-attached to their
/// definers, clear slots left to inherit.
pub fn load_textdump(td: Textdump) -> Result<ObjectStore, TextdumpError> {
    let mut store = ObjectStore::new();

    // First pass: objects with their own definitions; values placeholder.
    for (id, tdo) in &td.objects {
        let mut o = Object::new(*id, tdo.parent, tdo.owner);
        o.name = tdo.name.clone();
        o.flags = BitEnum::from_u8(tdo.flags);
        o.location = tdo.location;
        o.propdefs = tdo
            .propdefs
            .iter()
            .map(|n| PropDef {
                name: Symbol::mk(n),
                value: v_none(),
                owner: tdo.owner,
                flags: BitEnum::new(),
            })
            .collect();
        o.verbs = tdo
            .verbdefs
            .iter()
            .enumerate()
            .map(|(i, vd)| {
                let (flags, args) = unpack_verb_flags(vd.flags, vd.prep);
                VerbDef {
                    names: vd.name.split_whitespace().map(|s| s.to_string()).collect(),
                    owner: vd.owner,
                    flags,
                    args,
                    code: td.programs.get(&(*id, i)).cloned().unwrap_or_default(),
                    program: None,
                }
            })
            .collect();
        store.put_object(o);
    }

    // Recover contents/children orderings from the chains.
    for (id, tdo) in &td.objects {
        let mut contents = vec![];
        let mut cur = tdo.first_content;
        while cur != NOTHING {
            contents.push(cur);
            cur = match td.objects.get(&cur) {
                Some(o) => o.next,
                None => {
                    warn!("broken contents chain at {cur} under {id}");
                    NOTHING
                }
            };
        }
        let mut children = vec![];
        let mut cur = tdo.first_child;
        while cur != NOTHING {
            children.push(cur);
            cur = match td.objects.get(&cur) {
                Some(o) => o.sibling,
                None => {
                    warn!("broken child chain at {cur} under {id}");
                    NOTHING
                }
            };
        }
        store
            .with_object_mut(*id, |o| {
                o.contents = contents;
                o.children = children;
            })
            .map_err(|e| TextdumpError::LoadError("rebuilding indices".to_string(), e))?;
    }

    // Attach property values: own slots first, then overrides for
    // ancestor-defined names.
    for (id, tdo) in &td.objects {
        let chain = chain_prop_names(&store, *id);
        if chain.len() != tdo.propvals.len() {
            warn!(
                "object {id}: {} property slots for {} inherited names",
                tdo.propvals.len(),
                chain.len()
            );
        }
        let own_count = tdo.propdefs.len();
        for (i, pv) in tdo.propvals.iter().enumerate() {
            let Some(name) = chain.get(i) else {
                break;
            };
            let name = name.clone();
            let value: Var = pv.value.clone();
            let owner = pv.owner;
            let flags = BitEnum::from_u8(pv.flags);
            store
                .with_object_mut(*id, |o| {
                    if i < own_count {
                        let d = &mut o.propdefs[i];
                        d.value = value;
                        d.owner = owner;
                        d.flags = flags;
                    } else if pv.is_clear {
                        // Inherits; nothing to record.
                    } else {
                        o.overrides.insert(
                            name,
                            PropOverride {
                                value,
                                owner,
                                flags,
                            },
                        );
                    }
                })
                .map_err(|e| TextdumpError::LoadError("attaching properties".to_string(), e))?;
        }
    }

    // Ids absent from the dump below max-object were recycled.
    let max = store.max_object();
    for id in 0..=max {
        store.note_free_id(id);
    }

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TextdumpReader, TextdumpWriter};
    use std::io::BufReader;
    use warren_common::model::{ObjFlag, PropFlag};
    use warren_var::{v_err, v_int, v_list, v_str, E_PERM};

    fn sample_store() -> ObjectStore {
        let mut s = ObjectStore::bootstrap_minimal();
        let room = s.create_object(NOTHING, Obj::mk_id(1)).unwrap(); // #2
        let thing = s.create_object(room, Obj::mk_id(1)).unwrap(); // #3
        s.with_object_mut(room, |o| o.name = "The Den".to_string())
            .unwrap();
        s.with_object_mut(thing, |o| o.name = "brass lamp".to_string())
            .unwrap();
        s.move_object(thing, room).unwrap();
        s.add_property(
            room,
            Symbol::mk("description"),
            v_str("A cozy den."),
            Obj::mk_id(1),
            PropFlag::rc(),
        )
        .unwrap();
        s.add_property(
            room,
            Symbol::mk("junk"),
            v_list(&[v_int(1), v_err(E_PERM)]),
            Obj::mk_id(1),
            PropFlag::rwc(),
        )
        .unwrap();
        // An inherited, overridden slot.
        s.update_property(thing, &Symbol::mk("description"), v_str("Shiny."))
            .unwrap();
        s.add_verb(
            room,
            vec!["l*ook".to_string(), "examine".to_string()],
            Obj::mk_id(1),
            VerbFlag::rxd(),
            VerbArgsSpec::this_none_this(),
        )
        .unwrap();
        s.set_verb_code(room, 0, vec!["return 1;".to_string()])
            .unwrap();
        s
    }

    #[test]
    fn roundtrip_is_isomorphic() {
        let store = sample_store();
        let td = make_textdump(&store);

        let mut out = vec![];
        TextdumpWriter::new(&mut out).write_textdump(&td).unwrap();

        let back = TextdumpReader::new(BufReader::new(out.as_slice()))
            .read_textdump()
            .unwrap();
        let restored = load_textdump(back).unwrap();

        assert_eq!(restored.max_object(), store.max_object());
        assert_eq!(restored.object_count(), store.object_count());
        for id in store.object_ids() {
            let a = store.get(id).unwrap();
            let b = restored.get(id).unwrap();
            assert_eq!(a.name, b.name);
            assert_eq!(a.parent, b.parent);
            assert_eq!(a.location, b.location);
            assert_eq!(a.owner, b.owner);
            assert_eq!(a.flags, b.flags);
            assert_eq!(a.contents, b.contents);
            assert_eq!(a.children, b.children);
            assert_eq!(a.propdefs.len(), b.propdefs.len());
            assert_eq!(a.verbs.len(), b.verbs.len());
            for (va, vb) in a.verbs.iter().zip(b.verbs.iter()) {
                assert_eq!(va.names, vb.names);
                assert_eq!(va.flags, vb.flags);
                assert_eq!(va.args, vb.args);
                assert_eq!(va.code, vb.code);
            }
        }

        // Resolution behaves identically on the restored graph.
        let thing = Obj::mk_id(3);
        assert_eq!(
            restored
                .resolve_property(thing, &Symbol::mk("description"))
                .unwrap(),
            v_str("Shiny.")
        );
        assert_eq!(
            restored
                .resolve_property(thing, &Symbol::mk("junk"))
                .unwrap(),
            v_list(&[v_int(1), v_err(E_PERM)])
        );
    }

    #[test]
    fn users_listed_and_flagged() {
        let store = sample_store();
        let td = make_textdump(&store);
        assert_eq!(td.users, vec![Obj::mk_id(1)]);
        let restored = load_textdump(td).unwrap();
        assert!(
            restored
                .get(Obj::mk_id(1))
                .unwrap()
                .flags
                .contains(ObjFlag::User)
        );
    }

    #[test]
    fn gaps_become_recycled_ids() {
        let mut store = sample_store();
        let extra = store.create_object(NOTHING, NOTHING).unwrap(); // #4
        store.recycle_object(extra).unwrap();
        // A dump of this store has a gap at #4 but max_object past it is
        // not recorded in format 4; the gap below the highest live id is.
        let kept = store.create_object(NOTHING, NOTHING).unwrap();
        assert_eq!(kept, Obj::mk_id(4));
        let gone = store.create_object(NOTHING, NOTHING).unwrap(); // #5
        store.recycle_object(kept).unwrap();

        let td = make_textdump(&store);
        let restored = load_textdump(td).unwrap();
        assert_eq!(restored.max_object(), gone.id());
        // Creating in the restored store reuses the gap.
        let mut restored = restored;
        let reused = restored.create_object(NOTHING, NOTHING).unwrap();
        assert_eq!(reused, Obj::mk_id(4));
    }
}
