use crate::error::{Error, ErrorCode::E_RANGE};
use crate::var::Var;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// An immutable shared sequence of values. Mutating operations clone the
/// backing vector; values themselves are shared. Indices at this layer are
/// 1-based, matching the language surface.
#[derive(Clone, Default)]
pub struct List(Arc<Vec<Var>>);

impl List {
    pub fn mk_list(values: &[Var]) -> Self {
        List(Arc::new(values.to_vec()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Var> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Var] {
        &self.0
    }

    /// The element at 1-based `index`.
    pub fn index(&self, index: usize) -> Result<Var, Error> {
        if index < 1 || index > self.0.len() {
            return Err(E_RANGE.into());
        }
        Ok(self.0[index - 1].clone())
    }

    /// Replace the element at 1-based `index`.
    pub fn index_set(&self, index: usize, value: Var) -> Result<List, Error> {
        if index < 1 || index > self.0.len() {
            return Err(E_RANGE.into());
        }
        let mut v = (*self.0).clone();
        v[index - 1] = value;
        Ok(List(Arc::new(v)))
    }

    /// Insert `value` before 1-based `index`; `len + 1` appends. This is the
    /// `listinsert` contract; `listappend` adjusts by one at the call site.
    pub fn insert(&self, index: usize, value: Var) -> Result<List, Error> {
        if index < 1 || index > self.0.len() + 1 {
            return Err(E_RANGE.into());
        }
        let mut v = (*self.0).clone();
        v.insert(index - 1, value);
        Ok(List(Arc::new(v)))
    }

    pub fn remove_at(&self, index: usize) -> Result<List, Error> {
        if index < 1 || index > self.0.len() {
            return Err(E_RANGE.into());
        }
        let mut v = (*self.0).clone();
        v.remove(index - 1);
        Ok(List(Arc::new(v)))
    }

    pub fn push(&self, value: Var) -> List {
        let mut v = (*self.0).clone();
        v.push(value);
        List(Arc::new(v))
    }

    pub fn append(&self, other: &List) -> List {
        let mut v = (*self.0).clone();
        v.extend(other.iter().cloned());
        List(Arc::new(v))
    }

    /// The 1-based inclusive range `[from..to]`. Empty when `from == to + 1`.
    pub fn range(&self, from: i64, to: i64) -> Result<List, Error> {
        let len = self.0.len() as i64;
        if from > to {
            if from < 1 || from > len + 1 || to < 0 {
                return Err(E_RANGE.into());
            }
            return Ok(List::default());
        }
        if from < 1 || to > len {
            return Err(E_RANGE.into());
        }
        let v = self.0[(from - 1) as usize..to as usize].to_vec();
        Ok(List(Arc::new(v)))
    }

    /// Replace the 1-based inclusive range `[from..to]` with the elements of
    /// `replacement`.
    pub fn range_set(&self, from: i64, to: i64, replacement: &List) -> Result<List, Error> {
        let len = self.0.len() as i64;
        if from < 1 || from > len + 1 || to < from - 1 || to > len {
            return Err(E_RANGE.into());
        }
        let mut v = Vec::with_capacity(self.0.len() + replacement.len());
        v.extend_from_slice(&self.0[..(from - 1) as usize]);
        v.extend(replacement.iter().cloned());
        v.extend_from_slice(&self.0[to as usize..]);
        Ok(List(Arc::new(v)))
    }

    /// 1-based position of `value`, by MOO equality. 0 when absent.
    pub fn index_in(&self, value: &Var) -> i64 {
        self.0
            .iter()
            .position(|v| v == value)
            .map(|p| (p + 1) as i64)
            .unwrap_or(0)
    }

    pub fn contains(&self, value: &Var) -> bool {
        self.index_in(value) != 0
    }

    pub fn set_add(&self, value: &Var) -> List {
        if self.contains(value) {
            self.clone()
        } else {
            self.push(value.clone())
        }
    }

    pub fn set_remove(&self, value: &Var) -> List {
        match self.0.iter().position(|v| v == value) {
            Some(p) => {
                let mut v = (*self.0).clone();
                v.remove(p);
                List(Arc::new(v))
            }
            None => self.clone(),
        }
    }
}

impl FromIterator<Var> for List {
    fn from_iter<T: IntoIterator<Item = Var>>(iter: T) -> Self {
        List(Arc::new(iter.into_iter().collect()))
    }
}

impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }
}

impl Eq for List {}

impl Debug for List {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{v_int, v_list, v_str};

    #[test]
    fn index_and_range() {
        let l = v_list(&[v_int(1), v_int(2), v_int(3)]);
        let l = l.as_list().unwrap();
        assert_eq!(l.index(2).unwrap(), v_int(2));
        assert!(l.index(0).is_err());
        assert!(l.index(4).is_err());
        assert_eq!(
            l.range(2, 3).unwrap().as_slice(),
            &[v_int(2), v_int(3)][..]
        );
        assert_eq!(l.range(2, 1).unwrap().len(), 0);
        assert!(l.range(2, 4).is_err());
    }

    #[test]
    fn insert_positions() {
        let l = v_list(&[v_int(1), v_int(3)]);
        let l = l.as_list().unwrap();
        let l2 = l.insert(2, v_int(2)).unwrap();
        assert_eq!(l2.as_slice(), &[v_int(1), v_int(2), v_int(3)][..]);
        let l3 = l.insert(3, v_int(4)).unwrap();
        assert_eq!(l3.as_slice(), &[v_int(1), v_int(3), v_int(4)][..]);
        assert!(l.insert(4, v_int(9)).is_err());
    }

    #[test]
    fn sets_use_moo_equality() {
        let l = v_list(&[v_str("Foo")]);
        let l = l.as_list().unwrap();
        assert!(l.contains(&v_str("foo")));
        assert_eq!(l.set_add(&v_str("FOO")).len(), 1);
        assert_eq!(l.set_remove(&v_str("foo")).len(), 0);
    }
}
