use bincode::de::Decoder;
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::{BorrowDecode, Decode, Encode};
use std::collections::HashMap;
use std::sync::Arc;
use warren_common::model::{ArgSpec, ObjFlag, PrepSpec, PropFlag, VerbArgsSpec, VerbFlag};
use warren_common::util::{BitEnum, verbcasecmp};
use warren_compiler::Program;
use warren_var::{NOTHING, Obj, Symbol, Var};

/// A property defined on this object: the root slot all descendants inherit.
#[derive(Clone, Debug, Encode, Decode)]
pub struct PropDef {
    pub name: Symbol,
    pub value: Var,
    pub owner: Obj,
    pub flags: BitEnum<PropFlag>,
}

/// A descendant's local state for an inherited property. A `Clear` value
/// defers back to the ancestor chain.
#[derive(Clone, Debug, Encode, Decode)]
pub struct PropOverride {
    pub value: Var,
    pub owner: Obj,
    pub flags: BitEnum<PropFlag>,
}

/// A verb defined on an object. `names` holds the space-separated patterns
/// split out; `program` is the lazily-filled AST cache, never serialized.
#[derive(Clone, Debug)]
pub struct VerbDef {
    pub names: Vec<String>,
    pub owner: Obj,
    pub flags: BitEnum<VerbFlag>,
    pub args: VerbArgsSpec,
    pub code: Vec<String>,
    pub program: Option<Arc<Program>>,
}

impl VerbDef {
    /// Whether any of this verb's name patterns matches the word.
    pub fn matches_name(&self, word: &str) -> bool {
        self.names.iter().any(|p| verbcasecmp(p, word))
    }

    pub fn names_string(&self) -> String {
        self.names.join(" ")
    }

    pub fn source(&self) -> String {
        self.code.join("\n")
    }
}

impl Encode for VerbDef {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        self.names.encode(encoder)?;
        self.owner.encode(encoder)?;
        self.flags.encode(encoder)?;
        (self.args.dobj as u8).encode(encoder)?;
        self.args.prep.to_i16().encode(encoder)?;
        (self.args.iobj as u8).encode(encoder)?;
        self.code.encode(encoder)
    }
}

impl<Context> Decode<Context> for VerbDef {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let names = Vec::<String>::decode(decoder)?;
        let owner = Obj::decode(decoder)?;
        let flags = BitEnum::<VerbFlag>::decode(decoder)?;
        let dobj = ArgSpec::from_repr(u8::decode(decoder)?)
            .ok_or(DecodeError::Other("invalid dobj spec"))?;
        let prep = PrepSpec::from_i16(i16::decode(decoder)?)
            .ok_or(DecodeError::Other("invalid preposition"))?;
        let iobj = ArgSpec::from_repr(u8::decode(decoder)?)
            .ok_or(DecodeError::Other("invalid iobj spec"))?;
        let code = Vec::<String>::decode(decoder)?;
        Ok(VerbDef {
            names,
            owner,
            flags,
            args: VerbArgsSpec { dobj, prep, iobj },
            code,
            program: None,
        })
    }
}

impl<'de, Context> BorrowDecode<'de, Context> for VerbDef {
    fn borrow_decode<D: bincode::de::BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        VerbDef::decode(decoder)
    }
}

/// One object in the world. `contents` and `children` are derived indices,
/// maintained by the store on move/chparent; objects refer to each other
/// only by id.
#[derive(Clone, Debug, Encode, Decode)]
pub struct Object {
    pub id: Obj,
    pub name: String,
    pub flags: BitEnum<ObjFlag>,
    pub owner: Obj,
    pub location: Obj,
    pub parent: Obj,
    pub contents: Vec<Obj>,
    pub children: Vec<Obj>,
    pub propdefs: Vec<PropDef>,
    pub overrides: HashMap<Symbol, PropOverride>,
    pub verbs: Vec<VerbDef>,
}

impl Object {
    pub fn new(id: Obj, parent: Obj, owner: Obj) -> Self {
        Object {
            id,
            name: String::new(),
            flags: BitEnum::new(),
            owner,
            location: NOTHING,
            parent,
            contents: vec![],
            children: vec![],
            propdefs: vec![],
            overrides: HashMap::new(),
            verbs: vec![],
        }
    }

    pub fn is_player(&self) -> bool {
        self.flags.contains(ObjFlag::User)
    }

    pub fn propdef(&self, name: &Symbol) -> Option<&PropDef> {
        self.propdefs.iter().find(|p| &p.name == name)
    }

    pub fn propdef_mut(&mut self, name: &Symbol) -> Option<&mut PropDef> {
        self.propdefs.iter_mut().find(|p| &p.name == name)
    }
}
