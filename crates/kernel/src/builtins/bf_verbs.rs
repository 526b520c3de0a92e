use crate::builtins::BfRet::Ret;
use crate::builtins::{BfCallState, BfErr, BfRet, BuiltinFunction, register, world_state_bf_err};
use std::collections::HashMap;
use warren_common::model::{ArgSpec, PrepSpec, VerbArgsSpec, VerbFlag, verb_perms_string};
use warren_var::{
    E_ARGS, E_INVARG, E_PERM, E_TYPE, Obj, Symbol, Var, Variant, v_int, v_list, v_list_iter,
    v_obj, v_str, v_string,
};

fn obj_arg(args: &[Var], i: usize) -> Result<Obj, BfErr> {
    match args.get(i).map(|v| v.variant()) {
        Some(Variant::Obj(o)) => Ok(*o),
        Some(_) => Err(BfErr::Code(E_TYPE)),
        None => Err(BfErr::Code(E_ARGS)),
    }
}

fn str_arg(args: &[Var], i: usize) -> Result<String, BfErr> {
    match args.get(i).map(|v| v.variant()) {
        Some(Variant::Str(s)) => Ok(s.as_str().to_string()),
        Some(_) => Err(BfErr::Code(E_TYPE)),
        None => Err(BfErr::Code(E_ARGS)),
    }
}

/// {owner, perms, names} from an info-style list.
fn parse_verb_info(
    info: &Var,
) -> Result<(Obj, warren_common::util::BitEnum<VerbFlag>, Vec<String>), BfErr> {
    let Variant::List(info) = info.variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    if info.len() != 3 {
        return Err(BfErr::Code(E_INVARG));
    }
    let Some(owner) = info.index(1).ok().and_then(|v| v.as_object()) else {
        return Err(BfErr::Code(E_TYPE));
    };
    let perms = info.index(2).map_err(|_| BfErr::Code(E_INVARG))?;
    let Some(perms) = perms.as_string().map(|s| s.as_str().to_string()) else {
        return Err(BfErr::Code(E_TYPE));
    };
    let Some(flags) = VerbFlag::parse_str(&perms) else {
        return Err(BfErr::Code(E_INVARG));
    };
    let names_str = info.index(3).map_err(|_| BfErr::Code(E_INVARG))?;
    let Some(names_str) = names_str.as_string().map(|s| s.as_str().to_string()) else {
        return Err(BfErr::Code(E_TYPE));
    };
    let names: Vec<String> = names_str.split_whitespace().map(|s| s.to_string()).collect();
    if names.is_empty() {
        return Err(BfErr::Code(E_INVARG));
    }
    Ok((owner, flags, names))
}

/// {dobj, prep, iobj} from an args-style list.
fn parse_verb_args(spec: &Var) -> Result<VerbArgsSpec, BfErr> {
    let Variant::List(spec) = spec.variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    if spec.len() != 3 {
        return Err(BfErr::Code(E_INVARG));
    }
    let dobj = spec.index(1).map_err(|_| BfErr::Code(E_INVARG))?;
    let prep = spec.index(2).map_err(|_| BfErr::Code(E_INVARG))?;
    let iobj = spec.index(3).map_err(|_| BfErr::Code(E_INVARG))?;
    let (Some(dobj), Some(prep), Some(iobj)) = (
        dobj.as_string().and_then(|s| ArgSpec::from_string(s.as_str())),
        prep.as_string().and_then(|s| PrepSpec::parse(s.as_str())),
        iobj.as_string().and_then(|s| ArgSpec::from_string(s.as_str())),
    ) else {
        return Err(BfErr::Code(E_INVARG));
    };
    Ok(VerbArgsSpec { dobj, prep, iobj })
}

fn bf_verbs(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    bf_args
        .world
        .with_read(|s| {
            s.get(obj)
                .map(|o| o.verbs.iter().map(|v| v.names_string()).collect::<Vec<_>>())
        })
        .map(|names| Ret(v_list_iter(names.into_iter().map(v_string))))
        .map_err(world_state_bf_err)
}

/// add_verb(obj, {owner, perms, names}, {dobj, prep, iobj})
fn bf_add_verb(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 3 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let (owner, flags, names) = parse_verb_info(&bf_args.args[1])?;
    let argspec = parse_verb_args(&bf_args.args[2])?;

    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    perms.check_is_programmer().map_err(world_state_bf_err)?;
    let obj_owner = bf_args.world.owner_of(obj).map_err(world_state_bf_err)?;
    if !perms.is_wizard() && perms.who != obj_owner {
        return Err(BfErr::Code(E_PERM));
    }
    if owner != perms.who && !perms.is_wizard() {
        return Err(BfErr::Code(E_PERM));
    }

    bf_args
        .world
        .with_write(|s| s.add_verb(obj, names, owner, flags, argspec))
        .map(|i| Ret(v_int(i as i64 + 1)))
        .map_err(world_state_bf_err)
}

fn resolve_verbdef(
    bf_args: &BfCallState<'_>,
    obj: Obj,
    desc: &str,
) -> Result<(usize, warren_db::VerbDef), BfErr> {
    bf_args
        .world
        .with_read(|s| s.find_verbdef(obj, desc))
        .map_err(world_state_bf_err)
}

fn bf_delete_verb(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let desc = str_arg(&bf_args.args, 1)?;
    let (index, verbdef) = resolve_verbdef(bf_args, obj, &desc)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    perms
        .check_verb_allows(obj, &desc, verbdef.owner, verbdef.flags, VerbFlag::Write)
        .map_err(world_state_bf_err)?;
    bf_args
        .world
        .with_write(|s| s.delete_verb(obj, index))
        .map(|_| Ret(v_int(0)))
        .map_err(world_state_bf_err)
}

fn bf_verb_info(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let desc = str_arg(&bf_args.args, 1)?;
    let (_, verbdef) = resolve_verbdef(bf_args, obj, &desc)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    perms
        .check_verb_allows(obj, &desc, verbdef.owner, verbdef.flags, VerbFlag::Read)
        .map_err(world_state_bf_err)?;
    Ok(Ret(v_list(&[
        v_obj(verbdef.owner),
        v_str(&verb_perms_string(verbdef.flags)),
        v_str(&verbdef.names_string()),
    ])))
}

fn bf_set_verb_info(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 3 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let desc = str_arg(&bf_args.args, 1)?;
    let (new_owner, new_flags, new_names) = parse_verb_info(&bf_args.args[2])?;
    let (index, verbdef) = resolve_verbdef(bf_args, obj, &desc)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    perms
        .check_verb_allows(obj, &desc, verbdef.owner, verbdef.flags, VerbFlag::Write)
        .map_err(world_state_bf_err)?;
    if new_owner != perms.who && !perms.is_wizard() {
        return Err(BfErr::Code(E_PERM));
    }
    bf_args
        .world
        .with_write(|s| {
            s.set_verb_info(obj, index, Some(new_owner), Some(new_flags), Some(new_names))
        })
        .map(|_| Ret(v_int(0)))
        .map_err(world_state_bf_err)
}

fn bf_verb_args(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let desc = str_arg(&bf_args.args, 1)?;
    let (_, verbdef) = resolve_verbdef(bf_args, obj, &desc)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    perms
        .check_verb_allows(obj, &desc, verbdef.owner, verbdef.flags, VerbFlag::Read)
        .map_err(world_state_bf_err)?;
    Ok(Ret(v_list(&[
        v_str(verbdef.args.dobj.to_string()),
        v_str(&verbdef.args.prep.to_string()),
        v_str(verbdef.args.iobj.to_string()),
    ])))
}

fn bf_set_verb_args(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 3 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let desc = str_arg(&bf_args.args, 1)?;
    let argspec = parse_verb_args(&bf_args.args[2])?;
    let (index, verbdef) = resolve_verbdef(bf_args, obj, &desc)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    perms
        .check_verb_allows(obj, &desc, verbdef.owner, verbdef.flags, VerbFlag::Write)
        .map_err(world_state_bf_err)?;
    bf_args
        .world
        .with_write(|s| s.set_verb_args(obj, index, argspec))
        .map(|_| Ret(v_int(0)))
        .map_err(world_state_bf_err)
}

fn bf_verb_code(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let desc = str_arg(&bf_args.args, 1)?;
    let (_, verbdef) = resolve_verbdef(bf_args, obj, &desc)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    perms
        .check_verb_allows(obj, &desc, verbdef.owner, verbdef.flags, VerbFlag::Read)
        .map_err(world_state_bf_err)?;
    Ok(Ret(v_list_iter(
        verbdef.code.iter().map(|l| v_str(l)),
    )))
}

/// set_verb_code(obj, verb-desc, lines) -- replaces the source and
/// invalidates the cached program.
fn bf_set_verb_code(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 3 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let desc = str_arg(&bf_args.args, 1)?;
    let Variant::List(lines) = bf_args.args[2].variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let mut code = Vec::with_capacity(lines.len());
    for l in lines.iter() {
        match l.variant() {
            Variant::Str(s) => code.push(s.as_str().to_string()),
            _ => return Err(BfErr::Code(E_TYPE)),
        }
    }
    let (index, verbdef) = resolve_verbdef(bf_args, obj, &desc)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    perms.check_is_programmer().map_err(world_state_bf_err)?;
    perms
        .check_verb_allows(obj, &desc, verbdef.owner, verbdef.flags, VerbFlag::Write)
        .map_err(world_state_bf_err)?;

    // Report compile errors now, as a list of message strings.
    if let Err(e) = warren_compiler::compile(&code.join("\n")) {
        return Ok(Ret(v_list(&[v_string(e.to_string())])));
    }
    bf_args
        .world
        .with_write(|s| s.set_verb_code(obj, index, code))
        .map(|_| Ret(v_list(&[])))
        .map_err(world_state_bf_err)
}

/// disassemble(obj, verb-desc) -- with a tree-walking interpreter there is
/// no bytecode; the verb source is the program.
fn bf_disassemble(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let obj = obj_arg(&bf_args.args, 0)?;
    let desc = str_arg(&bf_args.args, 1)?;
    let (_, verbdef) = resolve_verbdef(bf_args, obj, &desc)?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    perms
        .check_verb_allows(obj, &desc, verbdef.owner, verbdef.flags, VerbFlag::Read)
        .map_err(world_state_bf_err)?;
    Ok(Ret(v_list_iter(
        verbdef.code.iter().map(|l| v_str(l)),
    )))
}

pub(crate) fn register_bf_verbs(builtins: &mut HashMap<Symbol, BuiltinFunction>) {
    register!(builtins,
        "verbs" => bf_verbs,
        "add_verb" => bf_add_verb,
        "delete_verb" => bf_delete_verb,
        "verb_info" => bf_verb_info,
        "set_verb_info" => bf_set_verb_info,
        "verb_args" => bf_verb_args,
        "set_verb_args" => bf_set_verb_args,
        "verb_code" => bf_verb_code,
        "set_verb_code" => bf_set_verb_code,
        "disassemble" => bf_disassemble,
    );
}
