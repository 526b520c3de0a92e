use crate::builtins::BfRet::Ret;
use crate::builtins::{BfCallState, BfErr, BfRet, BuiltinFunction, register, world_state_bf_err};
use crate::tasks::WsMatchEnv;
use std::collections::HashMap;
use warren_common::matching::ObjectNameMatcher;
use warren_common::model::ObjFlag;
use warren_var::{
    E_ARGS, E_INVARG, E_PERM, E_TYPE, NOTHING, Obj, Symbol, Var, Variant, v_bool, v_int,
    v_list_iter, v_obj,
};

fn obj_arg(args: &[Var], i: usize) -> Result<Obj, BfErr> {
    match args.get(i).map(|v| v.variant()) {
        Some(Variant::Obj(o)) => Ok(*o),
        Some(_) => Err(BfErr::Code(E_TYPE)),
        None => Err(BfErr::Code(E_ARGS)),
    }
}

fn bf_valid(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    Ok(Ret(v_bool(bf_args.world.valid(obj))))
}

/// create(parent [, owner]) -- wizards may create for anyone; others need
/// a fertile parent (or their own) and always own the result.
fn bf_create(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.is_empty() || bf_args.args.len() > 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let parent = obj_arg(&bf_args.args, 0)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    let owner = if bf_args.args.len() == 2 {
        let owner = obj_arg(&bf_args.args, 1)?;
        if owner != perms.who && !perms.is_wizard() {
            return Err(BfErr::Code(E_PERM));
        }
        owner
    } else {
        perms.who
    };

    if parent != NOTHING {
        if !bf_args.world.valid(parent) {
            return Err(BfErr::Code(E_INVARG));
        }
        let parent_owner = bf_args.world.owner_of(parent).unwrap_or(NOTHING);
        let parent_flags = bf_args.world.flags_of(parent).unwrap_or_default();
        if !perms.is_wizard()
            && perms.who != parent_owner
            && !parent_flags.contains(ObjFlag::Fertile)
        {
            return Err(BfErr::Code(E_PERM));
        }
    }

    bf_args
        .world
        .with_write(|s| s.create_object(parent, owner))
        .map(|o| Ret(v_obj(o)))
        .map_err(world_state_bf_err)
}

fn bf_recycle(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    let owner = bf_args.world.owner_of(obj).map_err(world_state_bf_err)?;
    if !perms.is_wizard() && perms.who != owner {
        return Err(BfErr::Code(E_PERM));
    }
    bf_args
        .world
        .with_write(|s| s.recycle_object(obj))
        .map(|_| Ret(v_int(0)))
        .map_err(world_state_bf_err)
}

fn bf_parent(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    bf_args
        .world
        .parent_of(obj)
        .map(|p| Ret(v_obj(p)))
        .map_err(world_state_bf_err)
}

fn bf_children(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    bf_args
        .world
        .with_read(|s| s.get(obj).map(|o| o.children.clone()))
        .map(|c| Ret(v_list_iter(c.into_iter().map(v_obj))))
        .map_err(world_state_bf_err)
}

fn bf_chparent(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let new_parent = obj_arg(&bf_args.args, 1)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    let owner = bf_args.world.owner_of(obj).map_err(world_state_bf_err)?;
    if !perms.is_wizard() && perms.who != owner {
        return Err(BfErr::Code(E_PERM));
    }
    bf_args
        .world
        .with_write(|s| s.change_parent(obj, new_parent))
        .map(|_| Ret(v_int(0)))
        .map_err(world_state_bf_err)
}

fn bf_move(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let what = obj_arg(&bf_args.args, 0)?;
    let dest = obj_arg(&bf_args.args, 1)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    let owner = bf_args.world.owner_of(what).map_err(world_state_bf_err)?;
    if !perms.is_wizard() && perms.who != owner {
        return Err(BfErr::Code(E_PERM));
    }
    bf_args
        .world
        .with_write(|s| s.move_object(what, dest))
        .map(|_| Ret(v_int(0)))
        .map_err(world_state_bf_err)
}

fn bf_max_object(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if !bf_args.args.is_empty() {
        return Err(BfErr::Code(E_ARGS));
    }
    Ok(Ret(v_obj(Obj::mk_id(bf_args.world.max_object()))))
}

/// chown(obj, new-owner) -- wizard only.
fn bf_chown(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let new_owner = obj_arg(&bf_args.args, 1)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    if !perms.is_wizard() {
        return Err(BfErr::Code(E_PERM));
    }
    bf_args
        .world
        .with_write(|s| s.with_object_mut(obj, |o| o.owner = new_owner))
        .map(|_| Ret(v_int(0)))
        .map_err(world_state_bf_err)
}

fn bf_renumber(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    if !perms.is_wizard() {
        return Err(BfErr::Code(E_PERM));
    }
    bf_args
        .world
        .with_write(|s| s.renumber_object(obj))
        .map(|o| Ret(v_obj(o)))
        .map_err(world_state_bf_err)
}

fn bf_reset_max_object(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if !bf_args.args.is_empty() {
        return Err(BfErr::Code(E_ARGS));
    }
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    if !perms.is_wizard() {
        return Err(BfErr::Code(E_PERM));
    }
    bf_args.world.with_write(|s| s.reset_max_object());
    Ok(Ret(v_int(0)))
}

fn bf_players(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if !bf_args.args.is_empty() {
        return Err(BfErr::Code(E_ARGS));
    }
    let players = bf_args.world.with_read(|s| s.players());
    Ok(Ret(v_list_iter(players.into_iter().map(v_obj))))
}

fn bf_is_player(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let flags = bf_args.world.flags_of(obj).map_err(world_state_bf_err)?;
    Ok(Ret(v_bool(flags.contains(ObjFlag::User))))
}

fn bf_is_wizard(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let flags = bf_args.world.flags_of(obj).map_err(world_state_bf_err)?;
    Ok(Ret(v_bool(flags.contains(ObjFlag::Wizard))))
}

/// set_player_flag(obj, value) -- wizard only; setting reserves the id
/// forever.
fn bf_set_player_flag(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let value = bf_args.args[1].is_true();
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    if !perms.is_wizard() {
        return Err(BfErr::Code(E_PERM));
    }
    bf_args
        .world
        .with_write(|s| s.set_player_flag(obj, value))
        .map(|_| Ret(v_int(0)))
        .map_err(world_state_bf_err)
}

/// match_object(name [, candidates]) -- name resolution in the calling
/// player's environment, or against an explicit candidate list.
fn bf_match_object(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.is_empty() || bf_args.args.len() > 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let Variant::Str(name) = bf_args.args[0].variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let name = name.as_str().to_string();

    if let Some(candidates) = bf_args.args.get(1) {
        let Variant::List(candidates) = candidates.variant() else {
            return Err(BfErr::Code(E_TYPE));
        };
        let lowered = name.to_lowercase();
        let mut exact = vec![];
        let mut prefixed = vec![];
        for c in candidates.iter() {
            let Variant::Obj(o) = c.variant() else {
                return Err(BfErr::Code(E_TYPE));
            };
            let Ok(oname) = bf_args.world.name_of(*o) else {
                continue;
            };
            let oname = oname.to_lowercase();
            if oname == lowered {
                exact.push(*o);
            } else if oname.starts_with(&lowered) {
                prefixed.push(*o);
            }
        }
        let result = match (exact.len(), prefixed.len()) {
            (1, _) => exact[0],
            (0, 1) => prefixed[0],
            (0, 0) => warren_var::FAILED_MATCH,
            _ => warren_var::AMBIGUOUS,
        };
        return Ok(Ret(v_obj(result)));
    }

    let env = WsMatchEnv {
        world: bf_args.world,
        player: bf_args.exec.player,
    };
    env.match_object(&name)
        .map(|o| Ret(v_obj(o)))
        .map_err(world_state_bf_err)
}

/// check_password(player, password) -- compare against the player's
/// crypted `password` property; never reveals which side failed.
fn bf_check_password(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let player = obj_arg(&bf_args.args, 0)?;
    let Variant::Str(password) = bf_args.args[1].variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    if !perms.is_wizard() && perms.who != player {
        return Err(BfErr::Code(E_PERM));
    }
    let stored = bf_args
        .world
        .retrieve_property(player, &Symbol::mk("password"));
    let ok = match stored {
        Ok(v) => match v.variant() {
            Variant::Str(hash) => {
                !hash.is_empty() && pwhash::unix::verify(password.as_str(), hash.as_str())
            }
            _ => false,
        },
        Err(_) => false,
    };
    Ok(Ret(v_bool(ok)))
}

pub(crate) fn register_bf_objects(builtins: &mut HashMap<Symbol, BuiltinFunction>) {
    register!(builtins,
        "valid" => bf_valid,
        "create" => bf_create,
        "recycle" => bf_recycle,
        "parent" => bf_parent,
        "children" => bf_children,
        "chparent" => bf_chparent,
        "move" => bf_move,
        "max_object" => bf_max_object,
        "chown" => bf_chown,
        "renumber" => bf_renumber,
        "reset_max_object" => bf_reset_max_object,
        "players" => bf_players,
        "is_player" => bf_is_player,
        "is_wizard" => bf_is_wizard,
        "set_player_flag" => bf_set_player_flag,
        "match_object" => bf_match_object,
        "check_password" => bf_check_password,
    );
}
