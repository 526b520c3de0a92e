use crate::{
    Object, Propval, Textdump, TextdumpError, VERSION_STRING, Verbdef,
    TYPE_CLEAR, TYPE_ERR, TYPE_FLOAT, TYPE_INT, TYPE_LIST, TYPE_NONE, TYPE_OBJ, TYPE_STR,
};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use tracing::info;
use warren_var::{
    ErrorCode, Obj, Var, v_err, v_float, v_int, v_list_iter, v_none, v_obj, v_str,
};

pub struct TextdumpReader<R: Read> {
    reader: BufReader<R>,
    line_num: usize,
}

impl<R: Read> TextdumpReader<R> {
    pub fn new(reader: BufReader<R>) -> Self {
        Self {
            reader,
            line_num: 0,
        }
    }

    fn read_line(&mut self) -> Result<String, TextdumpError> {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .map_err(|e| TextdumpError::IoError(e, self.line_num))?;
        if n == 0 {
            return Err(TextdumpError::ParseError(
                "unexpected end of file".to_string(),
                self.line_num,
            ));
        }
        self.line_num += 1;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    fn read_num(&mut self) -> Result<i64, TextdumpError> {
        let line = self.read_line()?;
        line.trim().parse().map_err(|_| {
            TextdumpError::ParseError(format!("invalid number: {line}"), self.line_num)
        })
    }

    fn read_objid(&mut self) -> Result<Obj, TextdumpError> {
        Ok(Obj::mk_id(self.read_num()?))
    }

    fn read_float(&mut self) -> Result<f64, TextdumpError> {
        let line = self.read_line()?;
        line.trim().parse().map_err(|_| {
            TextdumpError::ParseError(format!("invalid float: {line}"), self.line_num)
        })
    }

    fn read_var(&mut self) -> Result<Var, TextdumpError> {
        let t = self.read_num()?;
        self.read_var_value(t)
    }

    fn read_var_value(&mut self, t: i64) -> Result<Var, TextdumpError> {
        let v = match t {
            TYPE_INT => v_int(self.read_num()?),
            TYPE_OBJ => v_obj(self.read_objid()?),
            TYPE_STR => v_str(&self.read_line()?),
            TYPE_ERR => {
                let code = self.read_num()?;
                let Some(e) = ErrorCode::from_repr(code as u8) else {
                    return Err(TextdumpError::ParseError(
                        format!("invalid error code: {code}"),
                        self.line_num,
                    ));
                };
                v_err(e)
            }
            TYPE_LIST => {
                let len = self.read_num()?;
                let mut items = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    items.push(self.read_var()?);
                }
                v_list_iter(items)
            }
            TYPE_NONE => v_none(),
            TYPE_FLOAT => v_float(self.read_float()?),
            _ => {
                return Err(TextdumpError::ParseError(
                    format!("invalid value type: {t}"),
                    self.line_num,
                ));
            }
        };
        Ok(v)
    }

    fn read_verbdef(&mut self) -> Result<Verbdef, TextdumpError> {
        let name = self.read_line()?;
        let owner = self.read_objid()?;
        let flags = self.read_num()? as u16;
        let prep = self.read_num()? as i16;
        Ok(Verbdef {
            name,
            owner,
            flags,
            prep,
        })
    }

    fn read_propval(&mut self) -> Result<Propval, TextdumpError> {
        let t = self.read_num()?;
        // Clear slots carry no value of their own, only owner and perms.
        let is_clear = t == TYPE_CLEAR;
        let value = if is_clear {
            v_none()
        } else {
            self.read_var_value(t)?
        };
        Ok(Propval {
            value,
            owner: self.read_objid()?,
            flags: self.read_num()? as u8,
            is_clear,
        })
    }

    fn read_object(&mut self) -> Result<Object, TextdumpError> {
        let ospec = self.read_line()?;
        let ospec = ospec.trim();
        let Some(oid_str) = ospec.strip_prefix('#') else {
            return Err(TextdumpError::ParseError(
                format!("invalid object spec: {ospec}"),
                self.line_num,
            ));
        };
        let id: i64 = oid_str.trim().parse().map_err(|_| {
            TextdumpError::ParseError(format!("invalid objid: {oid_str}"), self.line_num)
        })?;
        let name = self.read_line()?;
        let _handles = self.read_line()?;
        let flags = self.read_num()? as u8;
        let owner = self.read_objid()?;
        let location = self.read_objid()?;
        let first_content = self.read_objid()?;
        let next = self.read_objid()?;
        let parent = self.read_objid()?;
        let first_child = self.read_objid()?;
        let sibling = self.read_objid()?;

        let nverbs = self.read_num()? as usize;
        let mut verbdefs = Vec::with_capacity(nverbs);
        for _ in 0..nverbs {
            verbdefs.push(self.read_verbdef()?);
        }

        let npropdefs = self.read_num()? as usize;
        let mut propdefs = Vec::with_capacity(npropdefs);
        for _ in 0..npropdefs {
            propdefs.push(self.read_line()?);
        }

        let npropvals = self.read_num()? as usize;
        let mut propvals = Vec::with_capacity(npropvals);
        for _ in 0..npropvals {
            propvals.push(self.read_propval()?);
        }

        Ok(Object {
            id: Obj::mk_id(id),
            name,
            flags,
            owner,
            location,
            first_content,
            next,
            parent,
            first_child,
            sibling,
            verbdefs,
            propdefs,
            propvals,
        })
    }

    /// A `#obj:verbnum` program header, or None at the end-of-programs
    /// marker (the trailing clocks/tasks sections).
    fn read_program_header(&mut self) -> Result<Option<(Obj, usize)>, TextdumpError> {
        let line = self.read_line()?;
        let line = line.trim();
        if !line.starts_with('#') {
            return Ok(None);
        }
        let Some((obj_part, verb_part)) = line[1..].split_once(':') else {
            return Err(TextdumpError::ParseError(
                format!("invalid program header: {line}"),
                self.line_num,
            ));
        };
        let obj: i64 = obj_part.trim().parse().map_err(|_| {
            TextdumpError::ParseError(format!("invalid program header: {line}"), self.line_num)
        })?;
        let verbnum: usize = verb_part.trim().parse().map_err(|_| {
            TextdumpError::ParseError(format!("invalid program header: {line}"), self.line_num)
        })?;
        Ok(Some((Obj::mk_id(obj), verbnum)))
    }

    pub fn read_textdump(mut self) -> Result<Textdump, TextdumpError> {
        let version_string = self.read_line()?;
        if version_string.trim() != VERSION_STRING {
            return Err(TextdumpError::VersionError(format!(
                "unsupported version: {version_string}"
            )));
        }
        info!("textdump version: {}", version_string.trim());

        let nobjects = self.read_num()? as usize;
        let _nprogs = self.read_num()?;
        let _dummy = self.read_num()?;
        let nusers = self.read_num()? as usize;
        let mut users = Vec::with_capacity(nusers);
        for _ in 0..nusers {
            users.push(self.read_objid()?);
        }

        let mut objects = BTreeMap::new();
        for _ in 0..nobjects {
            let o = self.read_object()?;
            objects.insert(o.id, o);
        }
        info!("read {} objects", objects.len());

        // Programs run until the first non-"#" line (the clocks/tasks
        // trailer, which we do not interpret).
        let mut programs = BTreeMap::new();
        while let Some((obj, verbnum)) = match self.read_program_header() {
            Ok(h) => h,
            // EOF right after the last program is fine.
            Err(TextdumpError::ParseError(msg, _)) if msg.starts_with("unexpected end") => None,
            Err(e) => return Err(e),
        } {
            let mut lines = vec![];
            loop {
                let line = self.read_line()?;
                if line == "." {
                    break;
                }
                lines.push(line);
            }
            programs.insert((obj, verbnum), lines);
        }
        info!("read {} verb programs", programs.len());

        Ok(Textdump {
            version_string,
            objects,
            users,
            programs,
        })
    }
}
