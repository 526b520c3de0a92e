use crate::builtins::BfRet::Ret;
use crate::builtins::{BfCallState, BfErr, BfRet, BuiltinFunction, register};
use md5::{Digest, Md5};
use std::collections::HashMap;
use warren_var::{E_ARGS, E_INVARG, E_TYPE, Obj, Symbol, Variant, v_int, v_obj, v_string};

fn bf_typeof(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    Ok(Ret(v_int(bf_args.args[0].type_code() as i64)))
}

fn bf_tostr(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let mut out = String::new();
    for arg in &bf_args.args {
        out.push_str(&arg.to_display_string());
    }
    Ok(Ret(v_string(out)))
}

fn bf_toliteral(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    Ok(Ret(v_string(bf_args.args[0].to_literal())))
}

fn bf_toint(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let v = match bf_args.args[0].variant() {
        Variant::Int(i) => v_int(*i),
        Variant::Obj(o) => v_int(o.id()),
        Variant::Err(e) => v_int(e.err_type as i64),
        Variant::Float(f) => v_int(*f as i64),
        Variant::Str(s) => v_int(s.as_str().trim().parse::<i64>().unwrap_or(0)),
        _ => return Err(BfErr::Code(E_TYPE)),
    };
    Ok(Ret(v))
}

fn bf_toobj(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let v = match bf_args.args[0].variant() {
        Variant::Int(i) => v_obj(Obj::mk_id(*i)),
        Variant::Obj(o) => v_obj(*o),
        Variant::Float(f) => v_obj(Obj::mk_id(*f as i64)),
        Variant::Str(s) => {
            let s = s.as_str().trim();
            let s = s.strip_prefix('#').unwrap_or(s);
            match s.parse::<i64>() {
                Ok(id) => v_obj(Obj::mk_id(id)),
                Err(_) => return Err(BfErr::Code(E_INVARG)),
            }
        }
        _ => return Err(BfErr::Code(E_TYPE)),
    };
    Ok(Ret(v))
}

pub(crate) fn md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02X}")).collect()
}

/// The hash of a value's literal form, so structurally equal values hash
/// equal.
fn bf_value_hash(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let literal = bf_args.args[0].to_literal();
    Ok(Ret(v_string(md5_hex(literal.as_bytes()))))
}

fn bf_equal(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let eq = bf_args.args[0].eq_case_sensitive(&bf_args.args[1]);
    Ok(Ret(v_int(if eq { 1 } else { 0 })))
}

pub(crate) fn register_bf_values(builtins: &mut HashMap<Symbol, BuiltinFunction>) {
    register!(builtins,
        "typeof" => bf_typeof,
        "tostr" => bf_tostr,
        "toliteral" => bf_toliteral,
        "toint" => bf_toint,
        "tonum" => bf_toint,
        "toobj" => bf_toobj,
        "value_hash" => bf_value_hash,
        "equal" => bf_equal,
    );
}
