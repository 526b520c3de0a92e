use crate::builtins::BfRet::Ret;
use crate::builtins::bf_values::md5_hex;
use crate::builtins::{BfCallState, BfErr, BfRet, BuiltinFunction, register};
use rand::Rng;
use std::collections::HashMap;
use warren_var::{
    E_ARGS, E_INVARG, E_TYPE, Str, Symbol, Var, Variant, v_empty_list, v_int, v_list, v_list_iter,
    v_str, v_string,
};

fn str_arg<'a>(args: &'a [Var], i: usize) -> Result<&'a Str, BfErr> {
    match args.get(i).map(|v| v.variant()) {
        Some(Variant::Str(s)) => Ok(s),
        Some(_) => Err(BfErr::Code(E_TYPE)),
        None => Err(BfErr::Code(E_ARGS)),
    }
}

fn case_matters(args: &[Var], i: usize) -> bool {
    args.get(i).map(|v| v.is_true()).unwrap_or(false)
}

/// strsub(subject, what, with [, case-matters]) -- replace every
/// occurrence.
fn bf_strsub(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() < 3 || bf_args.args.len() > 4 {
        return Err(BfErr::Code(E_ARGS));
    }
    let subject = str_arg(&bf_args.args, 0)?;
    let what = str_arg(&bf_args.args, 1)?;
    let with = str_arg(&bf_args.args, 2)?;
    let case = case_matters(&bf_args.args, 3);
    if what.is_empty() {
        return Err(BfErr::Code(E_INVARG));
    }
    let mut out = String::new();
    let mut rest = subject.clone();
    loop {
        let pos = rest.index_of(what.as_str(), case);
        if pos == 0 {
            out.push_str(rest.as_str());
            break;
        }
        let before = rest.range(1, pos - 1).map_err(BfErr::ErrValue)?;
        out.push_str(before.as_str());
        out.push_str(with.as_str());
        let after_start = pos + what.len() as i64;
        rest = rest
            .range(after_start, rest.len() as i64)
            .unwrap_or_else(|_| Str::mk_str(""));
        if rest.is_empty() {
            break;
        }
    }
    Ok(Ret(v_string(out)))
}

fn bf_index(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() < 2 || bf_args.args.len() > 3 {
        return Err(BfErr::Code(E_ARGS));
    }
    let subject = str_arg(&bf_args.args, 0)?;
    let what = str_arg(&bf_args.args, 1)?;
    let case = case_matters(&bf_args.args, 2);
    Ok(Ret(v_int(subject.index_of(what.as_str(), case))))
}

fn bf_rindex(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() < 2 || bf_args.args.len() > 3 {
        return Err(BfErr::Code(E_ARGS));
    }
    let subject = str_arg(&bf_args.args, 0)?;
    let what = str_arg(&bf_args.args, 1)?;
    let case = case_matters(&bf_args.args, 2);
    Ok(Ret(v_int(subject.rindex_of(what.as_str(), case))))
}

/// Case-sensitive three-way comparison, unlike `==`.
fn bf_strcmp(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let a = str_arg(&bf_args.args, 0)?;
    let b = str_arg(&bf_args.args, 1)?;
    let r = match a.cmp_case_sensitive(b) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    };
    Ok(Ret(v_int(r)))
}

fn bf_explode(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.is_empty() || bf_args.args.len() > 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let subject = str_arg(&bf_args.args, 0)?;
    let sep = match bf_args.args.get(1) {
        Some(v) => match v.variant() {
            Variant::Str(s) => s.as_str().to_string(),
            _ => return Err(BfErr::Code(E_TYPE)),
        },
        None => " ".to_string(),
    };
    if sep.is_empty() {
        return Err(BfErr::Code(E_INVARG));
    }
    let parts: Vec<Var> = subject
        .as_str()
        .split(&sep)
        .filter(|p| !p.is_empty())
        .map(v_str)
        .collect();
    Ok(Ret(v_list(&parts)))
}

/// Translate the MOO `%`-escaped regular expression dialect into the host
/// engine's syntax: `%(`/`%)` group, `%|` alternates, `%<`/`%>`/`%b` are
/// word boundaries, `%w` a word character, `%1`..`%9` backreferences are
/// unsupported and rejected, and `%c` otherwise escapes `c`. Bare
/// parentheses, braces, and pipes are literal in MOO and get escaped.
fn translate_pattern(pattern: &str) -> Option<String> {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => {
                let escape = chars.next()?;
                match escape {
                    '(' => out.push('('),
                    ')' => out.push(')'),
                    '|' => out.push('|'),
                    '<' | '>' | 'b' => out.push_str("\\b"),
                    'B' => out.push_str("\\B"),
                    'w' => out.push_str("\\w"),
                    'W' => out.push_str("\\W"),
                    '1'..='9' => return None,
                    _ => {
                        if regex_syntax_special(escape) {
                            out.push('\\');
                        }
                        out.push(escape);
                    }
                }
            }
            '(' | ')' | '|' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    Some(out)
}

fn regex_syntax_special(c: char) -> bool {
    matches!(
        c,
        '.' | '*' | '+' | '?' | '[' | ']' | '^' | '$' | '\\' | '(' | ')' | '|' | '{' | '}'
    )
}

fn compile_moo_pattern(pattern: &str, case: bool) -> Result<regex::Regex, BfErr> {
    let translated = translate_pattern(pattern).ok_or(BfErr::Code(E_INVARG))?;
    regex::RegexBuilder::new(&translated)
        .case_insensitive(!case)
        .build()
        .map_err(|_| BfErr::Code(E_INVARG))
}

// The regex engine reports byte offsets; positions surface to MOO code as
// 1-based grapheme positions.
fn grapheme_pos(s: &str, byte_offset: usize) -> i64 {
    Str::mk_str(&s[..byte_offset]).len() as i64 + 1
}

/// The MOO match result: {start, end, captures, matched} with exactly nine
/// capture pairs padded with {0, -1}.
fn match_result(subject: &str, caps: &regex::Captures) -> Var {
    let whole = caps.get(0).expect("capture 0 is the match");
    let start = grapheme_pos(subject, whole.start());
    let end = grapheme_pos(subject, whole.end()) - 1;
    let mut groups = Vec::with_capacity(9);
    for i in 1..=9 {
        match caps.get(i) {
            Some(m) => {
                let gs = grapheme_pos(subject, m.start());
                let ge = grapheme_pos(subject, m.end()) - 1;
                groups.push(v_list(&[v_int(gs), v_int(ge)]));
            }
            None => groups.push(v_list(&[v_int(0), v_int(-1)])),
        }
    }
    v_list(&[
        v_int(start),
        v_int(end),
        v_list_iter(groups),
        v_str(whole.as_str()),
    ])
}

fn bf_match(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() < 2 || bf_args.args.len() > 3 {
        return Err(BfErr::Code(E_ARGS));
    }
    let subject = str_arg(&bf_args.args, 0)?.as_str().to_string();
    let pattern = str_arg(&bf_args.args, 1)?.as_str().to_string();
    let case = case_matters(&bf_args.args, 2);
    let re = compile_moo_pattern(&pattern, case)?;
    match re.captures(&subject) {
        Some(caps) => Ok(Ret(match_result(&subject, &caps))),
        None => Ok(Ret(v_empty_list())),
    }
}

/// Like `match`, but the rightmost occurrence.
fn bf_rmatch(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() < 2 || bf_args.args.len() > 3 {
        return Err(BfErr::Code(E_ARGS));
    }
    let subject = str_arg(&bf_args.args, 0)?.as_str().to_string();
    let pattern = str_arg(&bf_args.args, 1)?.as_str().to_string();
    let case = case_matters(&bf_args.args, 2);
    let re = compile_moo_pattern(&pattern, case)?;
    let mut last = None;
    let mut at = 0;
    while at <= subject.len() {
        match re.captures_at(&subject, at) {
            Some(caps) => {
                let m = caps.get(0).expect("capture 0 is the match");
                last = Some(match_result(&subject, &caps));
                at = m.start() + 1;
                while at < subject.len() && !subject.is_char_boundary(at) {
                    at += 1;
                }
            }
            None => break,
        }
    }
    match last {
        Some(r) => Ok(Ret(r)),
        None => Ok(Ret(v_empty_list())),
    }
}

/// substitute(template, match-result) -- splice `%0`..`%9` from the match
/// into the template; `%%` is a literal percent.
fn bf_substitute(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let template = str_arg(&bf_args.args, 0)?.as_str().to_string();
    let Some(subs) = bf_args.args[1].as_list() else {
        return Err(BfErr::Code(E_TYPE));
    };
    if subs.len() != 4 {
        return Err(BfErr::Code(E_INVARG));
    }
    let start = subs
        .index(1)
        .map_err(|_| BfErr::Code(E_INVARG))?
        .as_integer()
        .ok_or(BfErr::Code(E_INVARG))?;
    let captures = subs.index(3).map_err(|_| BfErr::Code(E_INVARG))?;
    let captures = captures.as_list().ok_or(BfErr::Code(E_INVARG))?;
    let matched = subs.index(4).map_err(|_| BfErr::Code(E_INVARG))?;
    let Some(matched) = matched.as_string().cloned() else {
        return Err(BfErr::Code(E_INVARG));
    };

    let group_text = |n: usize| -> Result<String, BfErr> {
        if n == 0 {
            return Ok(matched.as_str().to_string());
        }
        let pair = captures.index(n).map_err(|_| BfErr::Code(E_INVARG))?;
        let pair = pair.as_list().ok_or(BfErr::Code(E_INVARG))?;
        let (Some(gs), Some(ge)) = (
            pair.index(1).ok().and_then(|v| v.as_integer()),
            pair.index(2).ok().and_then(|v| v.as_integer()),
        ) else {
            return Err(BfErr::Code(E_INVARG));
        };
        if gs == 0 && ge == -1 {
            return Ok(String::new());
        }
        // Capture bounds are subject positions; shift into the match.
        let rel_start = gs - start + 1;
        let rel_end = ge - start + 1;
        matched
            .range(rel_start, rel_end)
            .map(|s| s.as_str().to_string())
            .map_err(|_| BfErr::Code(E_INVARG))
    };

    let mut out = String::new();
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(d @ '0'..='9') => {
                let n = d.to_digit(10).unwrap() as usize;
                out.push_str(&group_text(n)?);
            }
            _ => return Err(BfErr::Code(E_INVARG)),
        }
    }
    Ok(Ret(v_string(out)))
}

/// decode_binary(str) -- the MOO binary-string form (`~XX` escapes) as a
/// list of printable runs and byte values.
fn bf_decode_binary(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let s = str_arg(&bf_args.args, 0)?.as_str().to_string();
    let mut bytes = vec![];
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            let (Some(h), Some(l)) = (chars.next(), chars.next()) else {
                return Err(BfErr::Code(E_INVARG));
            };
            let hex: String = [h, l].iter().collect();
            let b = u8::from_str_radix(&hex, 16).map_err(|_| BfErr::Code(E_INVARG))?;
            bytes.push(b);
        } else if c.is_ascii() {
            bytes.push(c as u8);
        } else {
            return Err(BfErr::Code(E_INVARG));
        }
    }
    let mut out = vec![];
    let mut run = String::new();
    for b in bytes {
        if (32..=126).contains(&b) {
            run.push(b as char);
        } else {
            if !run.is_empty() {
                out.push(v_string(std::mem::take(&mut run)));
            }
            out.push(v_int(b as i64));
        }
    }
    if !run.is_empty() {
        out.push(v_string(run));
    }
    Ok(Ret(v_list_iter(out)))
}

/// encode_binary(@args) -- inverse of decode_binary.
fn bf_encode_binary(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let mut out = String::new();
    fn encode_one(v: &Var, out: &mut String) -> Result<(), BfErr> {
        match v.variant() {
            Variant::Str(s) => {
                for c in s.as_str().chars() {
                    if !c.is_ascii() {
                        return Err(BfErr::Code(E_INVARG));
                    }
                    let b = c as u8;
                    if (32..=126).contains(&b) && b != b'~' {
                        out.push(c);
                    } else {
                        out.push_str(&format!("~{b:02X}"));
                    }
                }
                Ok(())
            }
            Variant::Int(i) => {
                if !(0..=255).contains(i) {
                    return Err(BfErr::Code(E_INVARG));
                }
                out.push_str(&format!("~{:02X}", *i as u8));
                Ok(())
            }
            Variant::List(l) => {
                for v in l.iter() {
                    encode_one(v, out)?;
                }
                Ok(())
            }
            _ => Err(BfErr::Code(E_TYPE)),
        }
    }
    for v in &bf_args.args {
        encode_one(v, &mut out)?;
    }
    Ok(Ret(v_string(out)))
}

const SALT_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789./";

/// crypt(text [, salt]) -- classic unix crypt, as MOO cores expect for
/// password storage.
fn bf_crypt(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.is_empty() || bf_args.args.len() > 2 {
        return Err(BfErr::Code(E_ARGS));
    }
    let text = str_arg(&bf_args.args, 0)?.as_str().to_string();
    let salt = match bf_args.args.get(1) {
        Some(v) => match v.variant() {
            Variant::Str(s) => s.as_str().to_string(),
            _ => return Err(BfErr::Code(E_TYPE)),
        },
        None => {
            let mut rng = rand::rng();
            let a = SALT_CHARS[rng.random_range(0..SALT_CHARS.len())] as char;
            let b = SALT_CHARS[rng.random_range(0..SALT_CHARS.len())] as char;
            format!("{a}{b}")
        }
    };
    match pwhash::unix_crypt::hash_with(&salt, &text) {
        Ok(hashed) => Ok(Ret(v_string(hashed))),
        Err(_) => Err(BfErr::Code(E_INVARG)),
    }
}

fn bf_string_hash(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let s = str_arg(&bf_args.args, 0)?;
    Ok(Ret(v_string(md5_hex(s.as_str().as_bytes()))))
}

/// Hash of the raw bytes a binary string denotes.
fn bf_binary_hash(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if bf_args.args.len() != 1 {
        return Err(BfErr::Code(E_ARGS));
    }
    let s = str_arg(&bf_args.args, 0)?.as_str().to_string();
    let mut bytes = vec![];
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            let (Some(h), Some(l)) = (chars.next(), chars.next()) else {
                return Err(BfErr::Code(E_INVARG));
            };
            let hex: String = [h, l].iter().collect();
            let b = u8::from_str_radix(&hex, 16).map_err(|_| BfErr::Code(E_INVARG))?;
            bytes.push(b);
        } else if c.is_ascii() {
            bytes.push(c as u8);
        } else {
            return Err(BfErr::Code(E_INVARG));
        }
    }
    Ok(Ret(v_string(md5_hex(&bytes))))
}

pub(crate) fn register_bf_strings(builtins: &mut HashMap<Symbol, BuiltinFunction>) {
    register!(builtins,
        "strsub" => bf_strsub,
        "index" => bf_index,
        "rindex" => bf_rindex,
        "strcmp" => bf_strcmp,
        "explode" => bf_explode,
        "match" => bf_match,
        "rmatch" => bf_rmatch,
        "substitute" => bf_substitute,
        "decode_binary" => bf_decode_binary,
        "encode_binary" => bf_encode_binary,
        "crypt" => bf_crypt,
        "string_hash" => bf_string_hash,
        "binary_hash" => bf_binary_hash,
    );
}
