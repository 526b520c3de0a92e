use crate::builtins::BfRet::Ret;
use crate::builtins::{BfCallState, BfErr, BfRet, BuiltinFunction, register};
use chrono::{Local, TimeZone};
use rand::Rng;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use warren_var::{E_ARGS, E_INVARG, E_TYPE, Symbol, Var, Variant, v_int, v_string};

fn int_arg(args: &[Var], i: usize) -> Result<i64, BfErr> {
    match args.get(i).map(|v| v.variant()) {
        Some(Variant::Int(n)) => Ok(*n),
        Some(_) => Err(BfErr::Code(E_TYPE)),
        None => Err(BfErr::Code(E_ARGS)),
    }
}

/// random([n]) -- uniform in [1..n].
fn bf_random(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() > 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let n = if bf_args.args.is_empty() {
        2_147_483_647
    } else {
        int_arg(&bf_args.args, 0)?
    };
    if n < 1 {
        return Err(BfErr::Code(E_INVARG));
    }
    let mut rng = rand::rng();
    Ok(Ret(v_int(rng.random_range(1..=n))))
}

fn bf_min(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.is_empty() {
        return Err(BfErr::Code(E_ARGS));
    }
    let mut best = int_arg(&bf_args.args, 0)?;
    for i in 1..bf_args.args.len() {
        best = best.min(int_arg(&bf_args.args, i)?);
    }
    Ok(Ret(v_int(best)))
}

fn bf_max(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.is_empty() {
        return Err(BfErr::Code(E_ARGS));
    }
    let mut best = int_arg(&bf_args.args, 0)?;
    for i in 1..bf_args.args.len() {
        best = best.max(int_arg(&bf_args.args, i)?);
    }
    Ok(Ret(v_int(best)))
}

fn bf_abs(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    Ok(Ret(v_int(int_arg(&bf_args.args, 0)?.wrapping_abs())))
}

/// Integer square root, rounded down.
fn bf_sqrt(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let n = int_arg(&bf_args.args, 0)?;
    if n < 0 {
        return Err(BfErr::Code(E_INVARG));
    }
    Ok(Ret(v_int((n as f64).sqrt().floor() as i64)))
}

// The transcendental functions work in thousandths: arguments are
// milliradians (or scaled inputs) and results are scaled by 1000 to stay
// in the integer domain.
fn scaled_unary(
    bf_args: &mut BfCallState<'_>,
    f: impl Fn(f64) -> f64,
) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let n = int_arg(&bf_args.args, 0)?;
    let x = n as f64 / 1000.0;
    let r = f(x);
    if !r.is_finite() {
        return Err(BfErr::Code(E_INVARG));
    }
    Ok(Ret(v_int((r * 1000.0).round() as i64)))
}

fn bf_sin(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    scaled_unary(bf_args, f64::sin)
}

fn bf_cos(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    scaled_unary(bf_args, f64::cos)
}

fn bf_tan(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    scaled_unary(bf_args, f64::tan)
}

fn bf_asin(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    scaled_unary(bf_args, f64::asin)
}

fn bf_acos(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    scaled_unary(bf_args, f64::acos)
}

fn bf_atan(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    scaled_unary(bf_args, f64::atan)
}

fn bf_exp(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    scaled_unary(bf_args, f64::exp)
}

fn bf_log(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    scaled_unary(bf_args, f64::ln)
}

fn bf_log10(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    scaled_unary(bf_args, f64::log10)
}

/// floatstr(n, precision) -- format a 1000-scaled integer as a decimal
/// string.
fn bf_floatstr(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let n = int_arg(&bf_args.args, 0)?;
    let precision = int_arg(&bf_args.args, 1)?;
    if !(0..=19).contains(&precision) {
        return Err(BfErr::Code(E_INVARG));
    }
    let value = n as f64 / 1000.0;
    Ok(Ret(v_string(format!(
        "{value:.prec$}",
        prec = precision as usize
    ))))
}

fn bf_time(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if !bf_args.args.is_empty() {
        return Err(BfErr::Code(E_ARGS));
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok(Ret(v_int(now)))
}

/// ctime([time]) -- the MOO-standard date format.
fn bf_ctime(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() > 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let t = if bf_args.args.is_empty() {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    } else {
        int_arg(&bf_args.args, 0)?
    };
    let Some(dt) = Local.timestamp_opt(t, 0).single() else {
        return Err(BfErr::Code(E_INVARG));
    };
    Ok(Ret(v_string(
        dt.format("%a %b %e %H:%M:%S %Y %Z").to_string(),
    )))
}

pub(crate) fn register_bf_num(builtins: &mut HashMap<Symbol, BuiltinFunction>) {
    register!(builtins,
        "random" => bf_random,
        "min" => bf_min,
        "max" => bf_max,
        "abs" => bf_abs,
        "sqrt" => bf_sqrt,
        "sin" => bf_sin,
        "cos" => bf_cos,
        "tan" => bf_tan,
        "asin" => bf_asin,
        "acos" => bf_acos,
        "atan" => bf_atan,
        "exp" => bf_exp,
        "log" => bf_log,
        "log10" => bf_log10,
        "floatstr" => bf_floatstr,
        "time" => bf_time,
        "ctime" => bf_ctime,
    );
}
