use crate::builtins::BfRet::Ret;
use crate::builtins::{BfCallState, BfErr, BfRet, BuiltinFunction, register};
use std::collections::HashMap;
use warren_var::{E_ARGS, E_TYPE, List, Symbol, Var, Variant, v_int, v_list_iter};

fn list_arg<'a>(args: &'a [Var], i: usize) -> Result<&'a List, BfErr> {
    match args.get(i).map(|v| v.variant()) {
        Some(Variant::List(l)) => Ok(l),
        Some(_) => Err(BfErr::Code(E_TYPE)),
        None => Err(BfErr::Code(E_ARGS)),
    }
}

fn int_arg(args: &[Var], i: usize) -> Result<i64, BfErr> {
    match args.get(i).map(|v| v.variant()) {
        Some(Variant::Int(n)) => Ok(*n),
        Some(_) => Err(BfErr::Code(E_TYPE)),
        None => Err(BfErr::Code(E_ARGS)),
    }
}

fn bf_length(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    bf_args.args[0]
        .len()
        .map(v_int)
        .map(Ret)
        .map_err(BfErr::ErrValue)
}

/// Case-sensitive membership, unlike the `in` operator: the 1-based
/// position or 0.
fn bf_is_member(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let value = &bf_args.args[0];
    let list = list_arg(&bf_args.args, 1)?;
    let pos = list
        .iter()
        .position(|v| v.eq_case_sensitive(value))
        .map(|p| (p + 1) as i64)
        .unwrap_or(0);
    Ok(Ret(v_int(pos)))
}

/// listinsert(list, value [, index]) -- insert *before* index; the front
/// by default.
fn bf_listinsert(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() < 2 || bf_args.args.len() > 3 {
        return Err(BfErr::Code(E_ARGS));
    }
    let list = list_arg(&bf_args.args, 0)?;
    let value = bf_args.args[1].clone();
    let index = if bf_args.args.len() == 3 {
        int_arg(&bf_args.args, 2)?
    } else {
        1
    };
    if index < 1 {
        return Err(BfErr::ErrValue(warren_var::E_RANGE.into()));
    }
    let index = (index as usize).min(list.len() + 1);
    list.insert(index, value)
        .map(|l| Ret(Var::from_variant(Variant::List(l))))
        .map_err(BfErr::ErrValue)
}

/// listappend(list, value [, index]) -- insert *after* index; the end by
/// default.
fn bf_listappend(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() < 2 || bf_args.args.len() > 3 {
        return Err(BfErr::Code(E_ARGS));
    }
    let list = list_arg(&bf_args.args, 0)?;
    let value = bf_args.args[1].clone();
    if bf_args.args.len() == 2 {
        return Ok(Ret(Var::from_variant(Variant::List(list.push(value)))));
    }
    let index = int_arg(&bf_args.args, 2)?;
    if index < 0 {
        return Err(BfErr::ErrValue(warren_var::E_RANGE.into()));
    }
    let index = ((index + 1) as usize).min(list.len() + 1);
    list.insert(index, value)
        .map(|l| Ret(Var::from_variant(Variant::List(l))))
        .map_err(BfErr::ErrValue)
}

fn bf_listdelete(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let list = list_arg(&bf_args.args, 0)?;
    let index = int_arg(&bf_args.args, 1)?;
    if index < 1 {
        return Err(BfErr::ErrValue(warren_var::E_RANGE.into()));
    }
    list.remove_at(index as usize)
        .map(|l| Ret(Var::from_variant(Variant::List(l))))
        .map_err(BfErr::ErrValue)
}

fn bf_listset(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 3 {
        return Err(BfErr::Code(E_ARGS));
    }
    let list = list_arg(&bf_args.args, 0)?;
    let value = bf_args.args[1].clone();
    let index = int_arg(&bf_args.args, 2)?;
    if index < 1 {
        return Err(BfErr::ErrValue(warren_var::E_RANGE.into()));
    }
    list.index_set(index as usize, value)
        .map(|l| Ret(Var::from_variant(Variant::List(l))))
        .map_err(BfErr::ErrValue)
}

fn bf_setadd(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let list = list_arg(&bf_args.args, 0)?;
    let value = &bf_args.args[1];
    Ok(Ret(Var::from_variant(Variant::List(list.set_add(value)))))
}

fn bf_setremove(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let list = list_arg(&bf_args.args, 0)?;
    let value = &bf_args.args[1];
    Ok(Ret(Var::from_variant(Variant::List(list.set_remove(value)))))
}

/// sort(list) -- MOO ordering; every pair must be comparable, so mixed
/// scalar types fail with E_TYPE.
fn bf_sort(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let list = list_arg(&bf_args.args, 0)?;
    let mut items: Vec<Var> = list.iter().cloned().collect();
    for pair in items.windows(2) {
        pair[0]
            .cmp_values(&pair[1])
            .map_err(BfErr::ErrValue)?;
    }
    items.sort_by(|a, b| a.cmp_values(b).unwrap_or(std::cmp::Ordering::Equal));
    Ok(Ret(v_list_iter(items)))
}

fn bf_reverse(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let list = list_arg(&bf_args.args, 0)?;
    let mut items: Vec<Var> = list.iter().cloned().collect();
    items.reverse();
    Ok(Ret(v_list_iter(items)))
}

pub(crate) fn register_bf_list_sets(builtins: &mut HashMap<Symbol, BuiltinFunction>) {
    register!(builtins,
        "length" => bf_length,
        "is_member" => bf_is_member,
        "listinsert" => bf_listinsert,
        "listappend" => bf_listappend,
        "listdelete" => bf_listdelete,
        "listset" => bf_listset,
        "setadd" => bf_setadd,
        "setremove" => bf_setremove,
        "sort" => bf_sort,
        "reverse" => bf_reverse,
    );
}
