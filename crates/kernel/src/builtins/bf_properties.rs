use crate::builtins::BfRet::Ret;
use crate::builtins::{BfCallState, BfErr, BfRet, BuiltinFunction, register, world_state_bf_err};
use std::collections::HashMap;
use warren_common::model::{PropFlag, prop_perms_string};
use warren_var::{
    E_ARGS, E_INVARG, E_PERM, E_TYPE, Obj, Symbol, Var, Variant, v_bool, v_int, v_list,
    v_list_iter, v_obj, v_str, v_string,
};

fn obj_arg(args: &[Var], i: usize) -> Result<Obj, BfErr> {
    match args.get(i).map(|v| v.variant()) {
        Some(Variant::Obj(o)) => Ok(*o),
        Some(_) => Err(BfErr::Code(E_TYPE)),
        None => Err(BfErr::Code(E_ARGS)),
    }
}

fn name_arg(args: &[Var], i: usize) -> Result<Symbol, BfErr> {
    match args.get(i).map(|v| v.variant()) {
        Some(Variant::Str(s)) => Ok(Symbol::mk(s.as_str())),
        Some(_) => Err(BfErr::Code(E_TYPE)),
        None => Err(BfErr::Code(E_ARGS)),
    }
}

/// The property names defined on the object itself (not inherited ones).
fn bf_properties(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    bf_args
        .world
        .with_read(|s| {
            s.get(obj)
                .map(|o| o.propdefs.iter().map(|d| d.name.to_string()).collect::<Vec<_>>())
        })
        .map(|names| Ret(v_list_iter(names.into_iter().map(v_string))))
        .map_err(world_state_bf_err)
}

/// add_property(obj, name, value, {owner, perms})
fn bf_add_property(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 4 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let name = name_arg(&bf_args.args, 1)?;
    let value = bf_args.args[2].clone();
    let Variant::List(info) = bf_args.args[3].variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    if info.len() != 2 {
        return Err(BfErr::Code(E_INVARG));
    }
    let Some(owner) = info.index(1).ok().and_then(|v| v.as_object()) else {
        return Err(BfErr::Code(E_TYPE));
    };
    let perms_str = info.index(2).map_err(|_| BfErr::Code(E_INVARG))?;
    let Some(perms_str) = perms_str.as_string().map(|s| s.as_str().to_string()) else {
        return Err(BfErr::Code(E_TYPE));
    };
    let Some(flags) = PropFlag::parse_str(&perms_str) else {
        return Err(BfErr::Code(E_INVARG));
    };

    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    let obj_owner = bf_args.world.owner_of(obj).map_err(world_state_bf_err)?;
    if !perms.is_wizard() && perms.who != obj_owner {
        return Err(BfErr::Code(E_PERM));
    }
    if owner != perms.who && !perms.is_wizard() {
        return Err(BfErr::Code(E_PERM));
    }

    bf_args
        .world
        .with_write(|s| s.add_property(obj, name, value, owner, flags))
        .map(|_| Ret(v_int(0)))
        .map_err(world_state_bf_err)
}

fn bf_delete_property(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let name = name_arg(&bf_args.args, 1)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    let obj_owner = bf_args.world.owner_of(obj).map_err(world_state_bf_err)?;
    if !perms.is_wizard() && perms.who != obj_owner {
        return Err(BfErr::Code(E_PERM));
    }
    bf_args
        .world
        .with_write(|s| s.delete_property(obj, &name))
        .map(|_| Ret(v_int(0)))
        .map_err(world_state_bf_err)
}

fn bf_property_info(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let name = name_arg(&bf_args.args, 1)?;
    let (owner, flags) = bf_args
        .world
        .property_info(obj, &name)
        .map_err(world_state_bf_err)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    perms
        .check_property_allows(obj, name.as_str(), owner, flags, PropFlag::Read)
        .map_err(world_state_bf_err)?;
    Ok(Ret(v_list(&[
        v_obj(owner),
        v_str(&prop_perms_string(flags)),
    ])))
}

/// set_property_info(obj, name, {owner, perms [, new-name]})
fn bf_set_property_info(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 3 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let name = name_arg(&bf_args.args, 1)?;
    let Variant::List(info) = bf_args.args[2].variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    if info.len() < 2 || info.len() > 3 {
        return Err(BfErr::Code(E_INVARG));
    }
    let Some(new_owner) = info.index(1).ok().and_then(|v| v.as_object()) else {
        return Err(BfErr::Code(E_TYPE));
    };
    let perms_str = info.index(2).map_err(|_| BfErr::Code(E_INVARG))?;
    let Some(perms_str) = perms_str.as_string().map(|s| s.as_str().to_string()) else {
        return Err(BfErr::Code(E_TYPE));
    };
    let Some(flags) = PropFlag::parse_str(&perms_str) else {
        return Err(BfErr::Code(E_INVARG));
    };
    let new_name = match info.index(3) {
        Ok(v) => match v.variant() {
            Variant::Str(s) => Some(Symbol::mk(s.as_str())),
            _ => return Err(BfErr::Code(E_TYPE)),
        },
        Err(_) => None,
    };

    let (owner, cur_flags) = bf_args
        .world
        .property_info(obj, &name)
        .map_err(world_state_bf_err)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    perms
        .check_property_allows(obj, name.as_str(), owner, cur_flags, PropFlag::Write)
        .map_err(world_state_bf_err)?;
    if new_owner != perms.who && !perms.is_wizard() {
        return Err(BfErr::Code(E_PERM));
    }

    bf_args
        .world
        .with_write(|s| s.set_property_info(obj, &name, new_owner, flags, new_name))
        .map(|_| Ret(v_int(0)))
        .map_err(world_state_bf_err)
}

/// clear_property(obj, name) -- make the slot inherit again.
fn bf_clear_property(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let name = name_arg(&bf_args.args, 1)?;
    let (owner, flags) = bf_args
        .world
        .property_info(obj, &name)
        .map_err(world_state_bf_err)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    perms
        .check_property_allows(obj, name.as_str(), owner, flags, PropFlag::Write)
        .map_err(world_state_bf_err)?;
    bf_args
        .world
        .with_write(|s| s.clear_property(obj, &name))
        .map(|_| Ret(v_int(0)))
        .map_err(world_state_bf_err)
}

fn bf_is_clear_property(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let name = name_arg(&bf_args.args, 1)?;
    bf_args
        .world
        .with_read(|s| s.is_property_clear(obj, &name))
        .map(|c| Ret(v_bool(c)))
        .map_err(world_state_bf_err)
}

pub(crate) fn register_bf_properties(builtins: &mut HashMap<Symbol, BuiltinFunction>) {
    register!(builtins,
        "properties" => bf_properties,
        "add_property" => bf_add_property,
        "delete_property" => bf_delete_property,
        "property_info" => bf_property_info,
        "set_property_info" => bf_set_property_info,
        "clear_property" => bf_clear_property,
        "is_clear_property" => bf_is_clear_property,
    );
}
