use warren_common::matching::ObjectNameMatcher;
use warren_common::model::WorldStateError;
use warren_db::WorldState;
use warren_var::{AMBIGUOUS, FAILED_MATCH, NOTHING, Obj, SYSTEM_OBJECT, Symbol, Variant};

/// Object-name matching against the live world: the player's environment
/// is the player itself, its contents, and the contents of its location.
pub struct WsMatchEnv<'a> {
    pub world: &'a WorldState,
    pub player: Obj,
}

impl WsMatchEnv<'_> {
    fn candidates(&self) -> Vec<Obj> {
        let mut c = vec![self.player];
        if let Ok(inv) = self.world.contents_of(self.player) {
            c.extend(inv);
        }
        if let Ok(loc) = self.world.location_of(self.player) {
            if loc != NOTHING {
                c.push(loc);
                if let Ok(room) = self.world.contents_of(loc) {
                    c.extend(room.into_iter().filter(|o| *o != self.player));
                }
            }
        }
        c
    }

    /// Names an object answers to: its name plus its `aliases` property,
    /// when that is a list of strings.
    fn names_of(&self, obj: Obj) -> Vec<String> {
        let mut names = vec![];
        if let Ok(name) = self.world.name_of(obj) {
            names.push(name);
        }
        if let Ok(aliases) = self.world.retrieve_property(obj, &Symbol::mk("aliases")) {
            if let Variant::List(l) = aliases.variant() {
                for a in l.iter() {
                    if let Variant::Str(s) = a.variant() {
                        names.push(s.as_str().to_string());
                    }
                }
            }
        }
        names
    }
}

impl ObjectNameMatcher for WsMatchEnv<'_> {
    fn match_object(&self, name: &str) -> Result<Obj, WorldStateError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(NOTHING);
        }
        if let Some(id) = name.strip_prefix('#') {
            if let Ok(id) = id.parse::<i64>() {
                let obj = Obj::mk_id(id);
                return Ok(if self.world.valid(obj) {
                    obj
                } else {
                    FAILED_MATCH
                });
            }
        }
        if name.eq_ignore_ascii_case("me") {
            return Ok(self.player);
        }
        if name.eq_ignore_ascii_case("here") {
            return Ok(self.world.location_of(self.player).unwrap_or(NOTHING));
        }
        if let Some(sysname) = name.strip_prefix('$') {
            if let Ok(v) = self
                .world
                .retrieve_property(SYSTEM_OBJECT, &Symbol::mk(sysname))
            {
                if let Variant::Obj(o) = v.variant() {
                    return Ok(*o);
                }
            }
            return Ok(FAILED_MATCH);
        }

        let lowered = name.to_lowercase();
        let mut exact = vec![];
        let mut prefixed = vec![];
        for obj in self.candidates() {
            for cand in self.names_of(obj) {
                let cand = cand.to_lowercase();
                if cand == lowered {
                    exact.push(obj);
                    break;
                }
                if cand.starts_with(&lowered) {
                    prefixed.push(obj);
                    break;
                }
            }
        }
        exact.dedup();
        prefixed.dedup();
        Ok(match (exact.len(), prefixed.len()) {
            (1, _) => exact[0],
            (0, 1) => prefixed[0],
            (0, 0) => FAILED_MATCH,
            _ => AMBIGUOUS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warren_db::ObjectStore;
    use warren_var::v_list;
    use warren_var::v_str;

    fn world_with_room() -> (WorldState, Obj, Obj, Obj) {
        let mut s = ObjectStore::bootstrap_minimal();
        let player = Obj::mk_id(1);
        let room = s.create_object(NOTHING, player).unwrap();
        let ball = s.create_object(NOTHING, player).unwrap();
        s.with_object_mut(room, |o| o.name = "The Den".to_string())
            .unwrap();
        s.with_object_mut(ball, |o| o.name = "red ball".to_string())
            .unwrap();
        s.add_property(
            ball,
            Symbol::mk("aliases"),
            v_list(&[v_str("ball"), v_str("sphere")]),
            player,
            warren_common::model::PropFlag::rc(),
        )
        .unwrap();
        s.move_object(player, room).unwrap();
        s.move_object(ball, room).unwrap();
        (WorldState::new(s), player, room, ball)
    }

    #[test]
    fn special_names() {
        let (world, player, room, _ball) = world_with_room();
        let env = WsMatchEnv {
            world: &world,
            player,
        };
        assert_eq!(env.match_object("me").unwrap(), player);
        assert_eq!(env.match_object("here").unwrap(), room);
        assert_eq!(env.match_object("#1").unwrap(), player);
        assert_eq!(env.match_object("#99").unwrap(), FAILED_MATCH);
        assert_eq!(env.match_object("").unwrap(), NOTHING);
    }

    #[test]
    fn name_alias_and_prefix() {
        let (world, player, _room, ball) = world_with_room();
        let env = WsMatchEnv {
            world: &world,
            player,
        };
        assert_eq!(env.match_object("red ball").unwrap(), ball);
        assert_eq!(env.match_object("sphere").unwrap(), ball);
        assert_eq!(env.match_object("re").unwrap(), ball);
        assert_eq!(env.match_object("frisbee").unwrap(), FAILED_MATCH);
    }
}
