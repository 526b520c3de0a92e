use crate::{
    Object, Propval, Textdump, TextdumpError, Verbdef,
    TYPE_CLEAR, TYPE_ERR, TYPE_FLOAT, TYPE_INT, TYPE_LIST, TYPE_NONE, TYPE_OBJ, TYPE_STR,
};
use std::io::{self, Write};
use warren_var::{Var, Variant};

pub struct TextdumpWriter<W: Write> {
    writer: W,
}

impl<W: Write> TextdumpWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    fn write_var(&mut self, var: &Var, is_clear: bool) -> Result<(), io::Error> {
        if is_clear {
            writeln!(self.writer, "{TYPE_CLEAR}")?;
            return Ok(());
        }
        match var.variant() {
            Variant::Int(i) => writeln!(self.writer, "{TYPE_INT}\n{i}")?,
            Variant::Obj(o) => writeln!(self.writer, "{TYPE_OBJ}\n{}", o.id())?,
            Variant::Str(s) => writeln!(self.writer, "{TYPE_STR}\n{}", s.as_str())?,
            Variant::Err(e) => writeln!(self.writer, "{TYPE_ERR}\n{}", e.err_type as u8)?,
            Variant::List(l) => {
                writeln!(self.writer, "{TYPE_LIST}\n{}", l.len())?;
                for v in l.iter() {
                    self.write_var(v, false)?;
                }
            }
            Variant::Float(f) => writeln!(self.writer, "{TYPE_FLOAT}\n{f:?}")?,
            Variant::Clear => writeln!(self.writer, "{TYPE_CLEAR}")?,
            Variant::None => writeln!(self.writer, "{TYPE_NONE}")?,
        }
        Ok(())
    }

    fn write_verbdef(&mut self, verbdef: &Verbdef) -> Result<(), io::Error> {
        writeln!(self.writer, "{}", verbdef.name)?;
        writeln!(self.writer, "{}", verbdef.owner.id())?;
        writeln!(self.writer, "{}", verbdef.flags)?;
        writeln!(self.writer, "{}", verbdef.prep)?;
        Ok(())
    }

    fn write_propval(&mut self, propval: &Propval) -> Result<(), io::Error> {
        self.write_var(&propval.value, propval.is_clear)?;
        writeln!(self.writer, "{}", propval.owner.id())?;
        writeln!(self.writer, "{}", propval.flags)?;
        Ok(())
    }

    fn write_object(&mut self, object: &Object) -> Result<(), io::Error> {
        writeln!(self.writer, "#{}", object.id.id())?;
        writeln!(self.writer, "{}", object.name)?;
        // The obsolete handles line.
        writeln!(self.writer)?;
        writeln!(self.writer, "{}", object.flags)?;
        writeln!(self.writer, "{}", object.owner.id())?;
        writeln!(self.writer, "{}", object.location.id())?;
        writeln!(self.writer, "{}", object.first_content.id())?;
        writeln!(self.writer, "{}", object.next.id())?;
        writeln!(self.writer, "{}", object.parent.id())?;
        writeln!(self.writer, "{}", object.first_child.id())?;
        writeln!(self.writer, "{}", object.sibling.id())?;
        writeln!(self.writer, "{}", object.verbdefs.len())?;
        for v in &object.verbdefs {
            self.write_verbdef(v)?;
        }
        writeln!(self.writer, "{}", object.propdefs.len())?;
        for p in &object.propdefs {
            writeln!(self.writer, "{p}")?;
        }
        writeln!(self.writer, "{}", object.propvals.len())?;
        for pv in &object.propvals {
            self.write_propval(pv)?;
        }
        Ok(())
    }

    pub fn write_textdump(&mut self, textdump: &Textdump) -> Result<(), TextdumpError> {
        self.write_textdump_io(textdump)
            .map_err(|e| TextdumpError::IoError(e, 0))
    }

    fn write_textdump_io(&mut self, textdump: &Textdump) -> Result<(), io::Error> {
        writeln!(self.writer, "{}", textdump.version_string)?;
        writeln!(self.writer, "{}", textdump.objects.len())?;
        writeln!(self.writer, "{}", textdump.programs.len())?;
        writeln!(self.writer, "0")?;
        writeln!(self.writer, "{}", textdump.users.len())?;
        for u in &textdump.users {
            writeln!(self.writer, "{}", u.id())?;
        }
        for object in textdump.objects.values() {
            self.write_object(object)?;
        }
        for ((obj, verbnum), lines) in &textdump.programs {
            writeln!(self.writer, "#{}:{}", obj.id(), verbnum)?;
            for line in lines {
                writeln!(self.writer, "{line}")?;
            }
            writeln!(self.writer, ".")?;
        }
        writeln!(self.writer, "0 clocks")?;
        writeln!(self.writer, "0 queued tasks")?;
        writeln!(self.writer, "0 suspended tasks")?;
        self.writer.flush()?;
        Ok(())
    }
}
