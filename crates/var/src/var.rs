use crate::VarType;
use crate::error::{
    Error,
    ErrorCode::{E_DIV, E_RANGE, E_TYPE},
};
use crate::list::List;
use crate::obj::Obj;
use crate::string::Str;
use crate::variant::Variant;
use bincode::de::Decoder;
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::{BorrowDecode, Decode, Encode};
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};

/// A MOO value.
#[derive(Clone)]
pub struct Var(Variant);

impl Var {
    pub fn from_variant(variant: Variant) -> Self {
        Var(variant)
    }

    pub fn mk_integer(i: i64) -> Self {
        Var(Variant::Int(i))
    }

    pub fn mk_object(o: Obj) -> Self {
        Var(Variant::Obj(o))
    }

    pub fn mk_str(s: &str) -> Self {
        Var(Variant::Str(Str::mk_str(s)))
    }

    pub fn mk_string(s: String) -> Self {
        Var(Variant::Str(Str::mk_string(s)))
    }

    pub fn mk_error(e: Error) -> Self {
        Var(Variant::Err(Box::new(e)))
    }

    pub fn mk_list(values: &[Var]) -> Self {
        Var(Variant::List(List::mk_list(values)))
    }

    pub fn mk_list_iter<IT: IntoIterator<Item = Var>>(values: IT) -> Self {
        Var(Variant::List(List::from_iter(values)))
    }

    pub fn mk_float(f: f64) -> Self {
        Var(Variant::Float(f))
    }

    pub fn mk_none() -> Self {
        Var(Variant::None)
    }

    pub fn mk_clear() -> Self {
        Var(Variant::Clear)
    }

    pub fn variant(&self) -> &Variant {
        &self.0
    }

    pub fn type_code(&self) -> VarType {
        match &self.0 {
            Variant::Int(_) => VarType::TYPE_INT,
            Variant::Obj(_) => VarType::TYPE_OBJ,
            Variant::Str(_) => VarType::TYPE_STR,
            Variant::Err(_) => VarType::TYPE_ERR,
            Variant::List(_) => VarType::TYPE_LIST,
            Variant::Float(_) => VarType::TYPE_FLOAT,
            Variant::Clear => VarType::TYPE_CLEAR,
            Variant::None => VarType::TYPE_NONE,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match &self.0 {
            Variant::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<Obj> {
        match &self.0 {
            Variant::Obj(o) => Some(*o),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&Str> {
        match &self.0 {
            Variant::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match &self.0 {
            Variant::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&Error> {
        match &self.0 {
            Variant::Err(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_clear(&self) -> bool {
        matches!(&self.0, Variant::Clear)
    }

    pub fn is_none(&self) -> bool {
        matches!(&self.0, Variant::None)
    }

    /// Truthiness: zero, the empty string, and the empty list are false.
    /// Everything else, error values included, is true.
    pub fn is_true(&self) -> bool {
        match &self.0 {
            Variant::Int(i) => *i != 0,
            Variant::Obj(_) => true,
            Variant::Str(s) => !s.is_empty(),
            Variant::Err(_) => true,
            Variant::List(l) => !l.is_empty(),
            Variant::Float(f) => *f != 0.0,
            Variant::Clear | Variant::None => false,
        }
    }

    /// Case-sensitive structural equality, for `strcmp`-family callers.
    pub fn eq_case_sensitive(&self, other: &Var) -> bool {
        match (&self.0, &other.0) {
            (Variant::Str(l), Variant::Str(r)) => l.eq_case_sensitive(r),
            (Variant::List(l), Variant::List(r)) => {
                l.len() == r.len()
                    && l.iter()
                        .zip(r.iter())
                        .all(|(a, b)| a.eq_case_sensitive(b))
            }
            _ => self == other,
        }
    }

    /// Ordering for `<`/`<=`/`>`/`>=`: defined on integers and strings only.
    pub fn cmp_values(&self, other: &Var) -> Result<Ordering, Error> {
        match (&self.0, &other.0) {
            (Variant::Int(l), Variant::Int(r)) => Ok(l.cmp(r)),
            (Variant::Str(l), Variant::Str(r)) => Ok(l.cmp(r)),
            _ => Err(E_TYPE.into()),
        }
    }

    /// The number of elements or graphemes; `E_TYPE` on scalars.
    pub fn len(&self) -> Result<i64, Error> {
        match &self.0 {
            Variant::Str(s) => Ok(s.len() as i64),
            Variant::List(l) => Ok(l.len() as i64),
            _ => Err(E_TYPE.into()),
        }
    }

    /// 1-based indexing into a string or list.
    pub fn index(&self, index: &Var) -> Result<Var, Error> {
        let Some(i) = index.as_integer() else {
            return Err(E_TYPE.into());
        };
        if i < 1 {
            return Err(E_RANGE.into());
        }
        match &self.0 {
            Variant::Str(s) => Ok(Var(Variant::Str(s.index(i as usize)?))),
            Variant::List(l) => l.index(i as usize),
            _ => Err(E_TYPE.into()),
        }
    }

    /// 1-based inclusive range over a string or list.
    pub fn range(&self, from: &Var, to: &Var) -> Result<Var, Error> {
        let (Some(from), Some(to)) = (from.as_integer(), to.as_integer()) else {
            return Err(E_TYPE.into());
        };
        match &self.0 {
            Variant::Str(s) => Ok(Var(Variant::Str(s.range(from, to)?))),
            Variant::List(l) => Ok(Var(Variant::List(l.range(from, to)?))),
            _ => Err(E_TYPE.into()),
        }
    }

    /// `base[index] = value`, producing the updated base. Assigning one
    /// string position requires a string value.
    pub fn index_set(&self, index: &Var, value: &Var) -> Result<Var, Error> {
        let Some(i) = index.as_integer() else {
            return Err(E_TYPE.into());
        };
        if i < 1 {
            return Err(E_RANGE.into());
        }
        match &self.0 {
            Variant::Str(s) => {
                let Some(v) = value.as_string() else {
                    return Err(E_TYPE.into());
                };
                Ok(Var(Variant::Str(s.index_set(i as usize, v.as_str())?)))
            }
            Variant::List(l) => Ok(Var(Variant::List(
                l.index_set(i as usize, value.clone())?,
            ))),
            _ => Err(E_TYPE.into()),
        }
    }

    /// `base[from..to] = value`, producing the updated base.
    pub fn range_set(&self, from: &Var, to: &Var, value: &Var) -> Result<Var, Error> {
        let (Some(from), Some(to)) = (from.as_integer(), to.as_integer()) else {
            return Err(E_TYPE.into());
        };
        match (&self.0, &value.0) {
            (Variant::Str(s), Variant::Str(v)) => {
                Ok(Var(Variant::Str(s.range_set(from, to, v.as_str())?)))
            }
            (Variant::List(l), Variant::List(v)) => {
                Ok(Var(Variant::List(l.range_set(from, to, v)?)))
            }
            _ => Err(E_TYPE.into()),
        }
    }

    /// Membership by MOO equality, for the `in` operator: 1-based position
    /// or 0.
    pub fn index_in(&self, container: &Var) -> Result<Var, Error> {
        match &container.0 {
            Variant::List(l) => Ok(Var::mk_integer(l.index_in(self))),
            _ => Err(E_TYPE.into()),
        }
    }

    pub fn add(&self, other: &Var) -> Result<Var, Error> {
        match (&self.0, &other.0) {
            (Variant::Int(l), Variant::Int(r)) => Ok(Var::mk_integer(l.wrapping_add(*r))),
            (Variant::Str(l), Variant::Str(r)) => Ok(Var(Variant::Str(l.append(r)))),
            // Mixed string arithmetic coerces the other operand to its
            // literal form and concatenates.
            (Variant::Str(l), _) => {
                Ok(Var::mk_string(format!("{}{}", l.as_str(), other.to_literal())))
            }
            (_, Variant::Str(r)) => {
                Ok(Var::mk_string(format!("{}{}", self.to_literal(), r.as_str())))
            }
            _ => Err(E_TYPE.into()),
        }
    }

    pub fn sub(&self, other: &Var) -> Result<Var, Error> {
        match (&self.0, &other.0) {
            (Variant::Int(l), Variant::Int(r)) => Ok(Var::mk_integer(l.wrapping_sub(*r))),
            _ => Err(E_TYPE.into()),
        }
    }

    pub fn mul(&self, other: &Var) -> Result<Var, Error> {
        match (&self.0, &other.0) {
            (Variant::Int(l), Variant::Int(r)) => Ok(Var::mk_integer(l.wrapping_mul(*r))),
            _ => Err(E_TYPE.into()),
        }
    }

    pub fn div(&self, other: &Var) -> Result<Var, Error> {
        match (&self.0, &other.0) {
            (Variant::Int(_), Variant::Int(0)) => Err(E_DIV.into()),
            (Variant::Int(l), Variant::Int(r)) => Ok(Var::mk_integer(l.wrapping_div(*r))),
            _ => Err(E_TYPE.into()),
        }
    }

    pub fn modulus(&self, other: &Var) -> Result<Var, Error> {
        match (&self.0, &other.0) {
            (Variant::Int(_), Variant::Int(0)) => Err(E_DIV.into()),
            (Variant::Int(l), Variant::Int(r)) => Ok(Var::mk_integer(l.wrapping_rem(*r))),
            _ => Err(E_TYPE.into()),
        }
    }

    pub fn pow(&self, other: &Var) -> Result<Var, Error> {
        match (&self.0, &other.0) {
            (Variant::Int(l), Variant::Int(r)) => {
                if *r < 0 {
                    return Err(E_TYPE.into());
                }
                Ok(Var::mk_integer(l.wrapping_pow(*r as u32)))
            }
            _ => Err(E_TYPE.into()),
        }
    }

    pub fn negate(&self) -> Result<Var, Error> {
        match &self.0 {
            Variant::Int(i) => Ok(Var::mk_integer(i.wrapping_neg())),
            _ => Err(E_TYPE.into()),
        }
    }

    pub fn not(&self) -> Var {
        Var::mk_integer(if self.is_true() { 0 } else { 1 })
    }

    /// The MOO literal form, as produced by `toliteral()`.
    pub fn to_literal(&self) -> String {
        match &self.0 {
            Variant::Int(i) => i.to_string(),
            Variant::Obj(o) => o.to_string(),
            Variant::Str(s) => quote_literal(s.as_str()),
            Variant::Err(e) => e.err_type.name().to_string(),
            Variant::List(l) => {
                let mut out = String::from("{");
                for (i, v) in l.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&v.to_literal());
                }
                out.push('}');
                out
            }
            Variant::Float(f) => format_float(*f),
            Variant::Clear | Variant::None => "0".to_string(),
        }
    }

    /// The display form used by `tostr()`: strings unquoted, errors by their
    /// description, lists collapse to the literal "{list}".
    pub fn to_display_string(&self) -> String {
        match &self.0 {
            Variant::Str(s) => s.as_str().to_string(),
            Variant::Err(e) => e.message(),
            Variant::List(_) => "{list}".to_string(),
            _ => self.to_literal(),
        }
    }
}

fn quote_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Floats are opaque, but they still print; integral values keep a trailing
/// ".0" so the literal re-reads as a float.
pub fn format_float(f: f64) -> String {
    if f.is_finite() && f == f.trunc() && f.abs() < 1e15 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Var {}

impl Debug for Var {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

// The shared immutable reps don't derive bincode, so Var encodes by variant
// tag, using the portable-format type numbering.
impl Encode for Var {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        match &self.0 {
            Variant::Int(i) => {
                0u8.encode(encoder)?;
                i.encode(encoder)
            }
            Variant::Obj(o) => {
                1u8.encode(encoder)?;
                o.id().encode(encoder)
            }
            Variant::Str(s) => {
                2u8.encode(encoder)?;
                s.as_str().encode(encoder)
            }
            Variant::Err(e) => {
                3u8.encode(encoder)?;
                (**e).encode(encoder)
            }
            Variant::List(l) => {
                4u8.encode(encoder)?;
                (l.len() as u64).encode(encoder)?;
                for v in l.iter() {
                    v.encode(encoder)?;
                }
                Ok(())
            }
            Variant::Clear => 5u8.encode(encoder),
            Variant::None => 6u8.encode(encoder),
            Variant::Float(f) => {
                9u8.encode(encoder)?;
                f.encode(encoder)
            }
        }
    }
}

impl<Context> Decode<Context> for Var {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let tag = u8::decode(decoder)?;
        match tag {
            0 => Ok(Var::mk_integer(i64::decode(decoder)?)),
            1 => Ok(Var::mk_object(Obj::mk_id(i64::decode(decoder)?))),
            2 => Ok(Var::mk_string(String::decode(decoder)?)),
            3 => Ok(Var::mk_error(Error::decode(decoder)?)),
            4 => {
                let len = u64::decode(decoder)?;
                let mut items = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    items.push(Var::decode(decoder)?);
                }
                Ok(Var::mk_list_iter(items))
            }
            5 => Ok(Var::mk_clear()),
            6 => Ok(Var::mk_none()),
            9 => Ok(Var::mk_float(f64::decode(decoder)?)),
            _ => Err(DecodeError::Other("invalid value tag")),
        }
    }
}

impl<'de, Context> BorrowDecode<'de, Context> for Var {
    fn borrow_decode<D: bincode::de::BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        Var::decode(decoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{E_DIV, E_RANGE, E_TYPE, v_err, v_int, v_list, v_obj, v_str};
    use crate::{NOTHING, Obj};
    use pretty_assertions::assert_eq;

    #[test]
    fn truthiness() {
        assert!(!v_int(0).is_true());
        assert!(v_int(-3).is_true());
        assert!(!v_str("").is_true());
        assert!(v_str("x").is_true());
        assert!(!v_list(&[]).is_true());
        assert!(v_list(&[v_int(0)]).is_true());
        // Error values are true.
        assert!(v_err(E_TYPE).is_true());
        assert!(v_obj(NOTHING).is_true());
    }

    #[test]
    fn equality_across_types_is_false() {
        assert_ne!(v_int(1), v_str("1"));
        assert_ne!(v_obj(Obj::mk_id(1)), v_int(1));
        assert_ne!(v_list(&[]), v_str(""));
    }

    #[test]
    fn arithmetic() {
        assert_eq!(v_int(2).add(&v_int(3)).unwrap(), v_int(5));
        assert_eq!(v_str("foo").add(&v_str("bar")).unwrap(), v_str("foobar"));
        assert_eq!(v_str("n=").add(&v_int(3)).unwrap(), v_str("n=3"));
        assert_eq!(v_int(7).div(&v_int(2)).unwrap(), v_int(3));
        assert_eq!(
            v_int(1).div(&v_int(0)).unwrap_err().err_type,
            E_DIV
        );
        assert_eq!(
            v_int(1).modulus(&v_int(0)).unwrap_err().err_type,
            E_DIV
        );
        assert_eq!(v_int(2).pow(&v_int(10)).unwrap(), v_int(1024));
        assert_eq!(
            v_int(1).add(&v_list(&[])).unwrap_err().err_type,
            E_TYPE
        );
    }

    #[test]
    fn index_boundaries() {
        let l = v_list(&[v_int(10), v_int(20)]);
        assert_eq!(l.index(&v_int(1)).unwrap(), v_int(10));
        assert_eq!(l.index(&v_int(0)).unwrap_err().err_type, E_RANGE);
        assert_eq!(l.index(&v_int(3)).unwrap_err().err_type, E_RANGE);
        let s = v_str("ab");
        assert_eq!(s.index(&v_int(2)).unwrap(), v_str("b"));
        assert_eq!(s.index(&v_int(3)).unwrap_err().err_type, E_RANGE);
    }

    #[test]
    fn literals() {
        assert_eq!(v_int(5).to_literal(), "5");
        assert_eq!(v_obj(Obj::mk_id(2)).to_literal(), "#2");
        assert_eq!(v_str("hi \"there\"").to_literal(), r#""hi \"there\"""#);
        assert_eq!(
            v_list(&[v_int(1), v_str("a")]).to_literal(),
            r#"{1, "a"}"#
        );
        assert_eq!(v_err(E_TYPE).to_literal(), "E_TYPE");
        assert_eq!(Var::mk_float(3.0).to_literal(), "3.0");
    }

    #[test]
    fn bincode_roundtrip() {
        let v = v_list(&[
            v_int(42),
            v_str("hello"),
            v_obj(Obj::mk_id(7)),
            v_err(E_RANGE),
            v_list(&[v_int(1)]),
            Var::mk_clear(),
            Var::mk_float(1.5),
        ]);
        let bytes = bincode::encode_to_vec(&v, bincode::config::standard()).unwrap();
        let (back, _): (Var, usize) =
            bincode::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        assert!(v.eq_case_sensitive(&back));
    }
}
