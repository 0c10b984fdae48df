//! Bytecode instruction set and compiled-code representation.
//!
//! This module defines the opcodes the offline compiler emits and the
//! executioner interprets, plus the in-memory view of a loaded story image.
//! Loading is intentionally thin: the image is a read-only slice of already
//! compiled instructions, a constant string pool, and list metadata — the
//! compiler that produces these bytes is out of scope for this crate.

use crate::codec::{self, Reader};
use crate::error::{Error, Result};
use crate::value::Value;

/// Header magic distinguishing a compiled story image from a snapshot blob
/// ("INKB" — bytecode, as opposed to the snapshot format's "INK1").
const MAGIC: u32 = 0x494e_4b42;
const VERSION: u16 = 1;

/// Binary arithmetic/bitwise operator family. The executioner delegates
/// the actual computation to [`crate::operators::apply_binop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    /// List shift: `list * int`.
    ListShift,
    /// List union: `list + list`.
    ListUnion,
    /// List difference: `list - list`.
    ListDifference,
}

/// Comparison / boolean operator family. Delegates to
/// [`crate::operators::apply_cmpop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Gt,
    GtE,
    Lt,
    LtE,
    And,
    Or,
    Has,
    HasNot,
}

/// List-table operator family, all delegating to [`crate::list_table::ListTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOp {
    Count,
    Min,
    Max,
    Invert,
    AllOrigin,
    Random,
}

/// The kind of frame a `PushFrame` opcode introduces, mirroring the
/// callstack frame kinds from the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Container,
    Function,
    Tunnel,
    Thread,
}

/// One compiled instruction. Operands that reference the constant pool or a
/// container table are stored as plain indices; resolving them is the
/// executioner's job, not this type's.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Push a constant value from the image's constant pool.
    LoadConst(u32),
    /// Push a literal value that doesn't need interning (small ints, bools).
    LoadImmediate(Value),
    /// Pop the top of the evaluation stack and discard it.
    Pop,
    /// Duplicate the top of the evaluation stack.
    Dup,
    /// Read a global or local variable by name onto the eval stack.
    LoadVar(String),
    /// Pop the eval stack into a variable (creating it if absent at global
    /// scope, per the `lookup` error kind's "set is a no-op" rule only
    /// applying to *unknown-name reads*, not writes).
    StoreVar(String),
    /// `a OP b` for the arithmetic/list family.
    BinaryOp(BinOp),
    /// `a OP b` for the comparison/boolean family.
    CompareOp(CmpOp),
    /// Unary boolean negation.
    Not,
    /// List-table unary/aggregate operator.
    ListOp(ListOp),
    /// Build a list value from `count` flag names already on the eval stack
    /// (as interned strings), resolving them through the list table.
    BuildList(u32),
    /// Contiguous flag-index subrange of the list on top of the stack.
    ListRange,
    /// Jump unconditionally to an absolute instruction index.
    Jump(u32),
    /// Pop the eval stack; jump if falsy.
    JumpIfFalse(u32),
    /// Push a divert target value (does not itself transfer control; used
    /// for indirect/variable diverts).
    LoadDivertTarget(u32),
    /// Transfer control to a container's entry point. No frame is pushed.
    Divert(u32),
    /// Transfer control to a container's entry point, pushing a callstack
    /// frame of the given kind so `Return` can resume here.
    PushFrame { target: u32, kind: FrameKind },
    /// Pop the innermost callstack frame and resume at its `return_ip`.
    Return,
    /// Push the `func_start`/`func_end`/`glue`/`newline`/`marker` stream
    /// control value named by this opcode directly onto the output stream.
    PushStreamMarker(Value),
    /// Pop the eval stack and append the value to the output stream.
    AppendToStream,
    /// Record a choice: pops condition flags and the choice text (already
    /// composed on the stream since the last `marker`).
    Choice {
        is_invisible_default: bool,
        is_once_only: bool,
    },
    /// Deterministic selection among `count` following containers, seeded
    /// from the current container's visit count.
    Sequence { count: u32, shuffle: bool },
    /// Attach an authored `# tag` comment to the line currently being
    /// composed, the knot being entered, or the story's global tag list,
    /// depending on where the compiler placed it in the instruction stream.
    Tag(u32),
    /// No-op, used as a padding/landing-pad target for jumps.
    Nop,
}

/// Per-container metadata read from the image's container table.
#[derive(Debug, Clone)]
pub struct ContainerMeta {
    pub name_hash: u64,
    pub entry_ip: u32,
    pub visits_tracked: bool,
    pub turns_tracked: bool,
}

/// Metadata for one declared list, as read from the image's list-metadata
/// section, ready to be handed to [`crate::list_table::ListTable::declare_list`].
#[derive(Debug, Clone)]
pub struct ListMeta {
    pub name: String,
    pub flag_names: Vec<String>,
}

/// A fully loaded, read-only story image.
///
/// This is the runtime's view of the bytes the offline compiler produced:
/// an instruction stream, a constant string pool, and the container/list
/// metadata tables needed to resolve diverts and list literals. Building
/// one from raw bytes is the minimal "loader" the data model calls for;
/// the byte format itself belongs to the out-of-scope offline compiler, so
/// [`Image::from_bytes`] only validates the header and hands back `Format`
/// errors for anything it doesn't recognize.
#[derive(Debug, Clone)]
pub struct Image {
    pub instructions: Vec<Command>,
    pub constants: Vec<String>,
    pub containers: Vec<ContainerMeta>,
    pub lists: Vec<ListMeta>,
    /// Entry point of the root container.
    pub root_ip: u32,
}

impl Image {
    /// Construct an image directly from already-decoded parts. This is the
    /// path used by tests and by any loader that has already parsed the
    /// compiler's binary format into these structures.
    pub fn new(
        instructions: Vec<Command>,
        constants: Vec<String>,
        containers: Vec<ContainerMeta>,
        lists: Vec<ListMeta>,
        root_ip: u32,
    ) -> Self {
        Self {
            instructions,
            constants,
            containers,
            lists,
            root_ip,
        }
    }

    pub fn constant(&self, id: u32) -> Option<&str> {
        self.constants.get(id as usize).map(|s| s.as_str())
    }

    pub fn container(&self, name_hash: u64) -> Option<&ContainerMeta> {
        self.containers.iter().find(|c| c.name_hash == name_hash)
    }

    pub fn instruction(&self, ip: u32) -> Option<&Command> {
        self.instructions.get(ip as usize)
    }

    /// Parse a compiled story image from its binary representation: a
    /// magic/version header, a container table, a NUL-terminated constant
    /// string pool, list metadata, the root entry point, and the
    /// instruction stream. Any malformed or truncated input is reported as
    /// [`Error::Format`]; this crate does not attempt to recover partial
    /// images.
    pub fn from_bytes(bytes: &[u8]) -> Result<Image> {
        let mut r = Reader::new(bytes);
        let magic = r.u32()?;
        if magic != MAGIC {
            return Err(Error::Format(format!("bad story image magic {magic:#x}")));
        }
        let version = r.u16()?;
        if version != VERSION {
            return Err(Error::Format(format!("unsupported story image version {version}")));
        }

        let container_count = r.u32()?;
        let mut containers = Vec::with_capacity(container_count as usize);
        for _ in 0..container_count {
            containers.push(ContainerMeta {
                name_hash: r.u64()?,
                entry_ip: r.u32()?,
                visits_tracked: r.bool()?,
                turns_tracked: r.bool()?,
            });
        }

        let mut constants = Vec::new();
        while let Some(s) = r.cstring()? {
            constants.push(s);
        }

        let list_count = r.u16()?;
        let mut lists = Vec::with_capacity(list_count as usize);
        for _ in 0..list_count {
            let name = r.cstring()?.ok_or_else(|| Error::Format("list metadata section ended early".into()))?;
            let flag_count = r.u16()?;
            let mut flag_names = Vec::with_capacity(flag_count as usize);
            for _ in 0..flag_count {
                flag_names.push(r.cstring()?.ok_or_else(|| Error::Format("list flag-name section ended early".into()))?);
            }
            lists.push(ListMeta { name, flag_names });
        }
        if r.cstring()?.is_some() {
            return Err(Error::Format("expected end of list metadata".into()));
        }

        let root_ip = r.u32()?;

        let instruction_count = r.u32()?;
        let mut instructions = Vec::with_capacity(instruction_count as usize);
        for _ in 0..instruction_count {
            instructions.push(read_command(&mut r)?);
        }

        Ok(Image {
            instructions,
            constants,
            containers,
            lists,
            root_ip,
        })
    }
}

fn binop_tag(op: BinOp) -> u8 {
    match op {
        BinOp::Add => 0,
        BinOp::Sub => 1,
        BinOp::Mult => 2,
        BinOp::Div => 3,
        BinOp::Mod => 4,
        BinOp::ListShift => 5,
        BinOp::ListUnion => 6,
        BinOp::ListDifference => 7,
    }
}

fn binop_from_tag(tag: u8) -> Result<BinOp> {
    match tag {
        0 => Ok(BinOp::Add),
        1 => Ok(BinOp::Sub),
        2 => Ok(BinOp::Mult),
        3 => Ok(BinOp::Div),
        4 => Ok(BinOp::Mod),
        5 => Ok(BinOp::ListShift),
        6 => Ok(BinOp::ListUnion),
        7 => Ok(BinOp::ListDifference),
        other => Err(Error::Format(format!("unknown binary op tag {other}"))),
    }
}

fn cmpop_tag(op: CmpOp) -> u8 {
    match op {
        CmpOp::Eq => 0,
        CmpOp::NotEq => 1,
        CmpOp::Gt => 2,
        CmpOp::GtE => 3,
        CmpOp::Lt => 4,
        CmpOp::LtE => 5,
        CmpOp::And => 6,
        CmpOp::Or => 7,
        CmpOp::Has => 8,
        CmpOp::HasNot => 9,
    }
}

fn cmpop_from_tag(tag: u8) -> Result<CmpOp> {
    match tag {
        0 => Ok(CmpOp::Eq),
        1 => Ok(CmpOp::NotEq),
        2 => Ok(CmpOp::Gt),
        3 => Ok(CmpOp::GtE),
        4 => Ok(CmpOp::Lt),
        5 => Ok(CmpOp::LtE),
        6 => Ok(CmpOp::And),
        7 => Ok(CmpOp::Or),
        8 => Ok(CmpOp::Has),
        9 => Ok(CmpOp::HasNot),
        other => Err(Error::Format(format!("unknown comparison op tag {other}"))),
    }
}

fn listop_tag(op: ListOp) -> u8 {
    match op {
        ListOp::Count => 0,
        ListOp::Min => 1,
        ListOp::Max => 2,
        ListOp::Invert => 3,
        ListOp::AllOrigin => 4,
        ListOp::Random => 5,
    }
}

fn listop_from_tag(tag: u8) -> Result<ListOp> {
    match tag {
        0 => Ok(ListOp::Count),
        1 => Ok(ListOp::Min),
        2 => Ok(ListOp::Max),
        3 => Ok(ListOp::Invert),
        4 => Ok(ListOp::AllOrigin),
        5 => Ok(ListOp::Random),
        other => Err(Error::Format(format!("unknown list op tag {other}"))),
    }
}

fn read_command(r: &mut Reader) -> Result<Command> {
    let tag = r.u8()?;
    Ok(match tag {
        0 => Command::LoadConst(r.u32()?),
        1 => Command::LoadImmediate(codec::read_value(r)?),
        2 => Command::Pop,
        3 => Command::Dup,
        4 => Command::LoadVar(r.cstring()?.ok_or_else(|| Error::Format("load_var name missing".into()))?),
        5 => Command::StoreVar(r.cstring()?.ok_or_else(|| Error::Format("store_var name missing".into()))?),
        6 => Command::BinaryOp(binop_from_tag(r.u8()?)?),
        7 => Command::CompareOp(cmpop_from_tag(r.u8()?)?),
        8 => Command::Not,
        9 => Command::ListOp(listop_from_tag(r.u8()?)?),
        10 => Command::BuildList(r.u32()?),
        11 => Command::ListRange,
        12 => Command::Jump(r.u32()?),
        13 => Command::JumpIfFalse(r.u32()?),
        14 => Command::LoadDivertTarget(r.u32()?),
        15 => Command::Divert(r.u32()?),
        16 => Command::PushFrame {
            target: r.u32()?,
            kind: codec::frame_kind_from_tag(r.u8()?)?,
        },
        17 => Command::Return,
        18 => Command::PushStreamMarker(codec::read_value(r)?),
        19 => Command::AppendToStream,
        20 => Command::Choice {
            is_invisible_default: r.bool()?,
            is_once_only: r.bool()?,
        },
        21 => Command::Sequence {
            count: r.u32()?,
            shuffle: r.bool()?,
        },
        22 => Command::Tag(r.u32()?),
        23 => Command::Nop,
        other => return Err(Error::Format(format!("unknown opcode tag {other}"))),
    })
}

#[cfg(test)]
fn write_command(w: &mut codec::Writer, cmd: &Command) {
    match cmd {
        Command::LoadConst(id) => {
            w.u8(0);
            w.u32(*id);
        }
        Command::LoadImmediate(value) => {
            w.u8(1);
            codec::write_value(w, value);
        }
        Command::Pop => w.u8(2),
        Command::Dup => w.u8(3),
        Command::LoadVar(name) => {
            w.u8(4);
            w.cstring(name);
        }
        Command::StoreVar(name) => {
            w.u8(5);
            w.cstring(name);
        }
        Command::BinaryOp(op) => {
            w.u8(6);
            w.u8(binop_tag(*op));
        }
        Command::CompareOp(op) => {
            w.u8(7);
            w.u8(cmpop_tag(*op));
        }
        Command::Not => w.u8(8),
        Command::ListOp(op) => {
            w.u8(9);
            w.u8(listop_tag(*op));
        }
        Command::BuildList(count) => {
            w.u8(10);
            w.u32(*count);
        }
        Command::ListRange => w.u8(11),
        Command::Jump(target) => {
            w.u8(12);
            w.u32(*target);
        }
        Command::JumpIfFalse(target) => {
            w.u8(13);
            w.u32(*target);
        }
        Command::LoadDivertTarget(target) => {
            w.u8(14);
            w.u32(*target);
        }
        Command::Divert(target) => {
            w.u8(15);
            w.u32(*target);
        }
        Command::PushFrame { target, kind } => {
            w.u8(16);
            w.u32(*target);
            w.u8(codec::frame_kind_tag(*kind));
        }
        Command::Return => w.u8(17),
        Command::PushStreamMarker(value) => {
            w.u8(18);
            codec::write_value(w, value);
        }
        Command::AppendToStream => w.u8(19),
        Command::Choice { is_invisible_default, is_once_only } => {
            w.u8(20);
            w.bool(*is_invisible_default);
            w.bool(*is_once_only);
        }
        Command::Sequence { count, shuffle } => {
            w.u8(21);
            w.u32(*count);
            w.bool(*shuffle);
        }
        Command::Tag(id) => {
            w.u8(22);
            w.u32(*id);
        }
        Command::Nop => w.u8(23),
    }
}

/// Serialize an image back to bytes matching [`Image::from_bytes`]'s
/// format. Only used by this module's own round-trip tests — producing a
/// real compiled story image is the offline compiler's job, not this
/// crate's.
#[cfg(test)]
fn write_image_bytes(image: &Image) -> Vec<u8> {
    let mut w = codec::Writer::new();
    w.u32(MAGIC);
    w.u16(VERSION);

    w.u32(image.containers.len() as u32);
    for c in &image.containers {
        w.u64(c.name_hash);
        w.u32(c.entry_ip);
        w.bool(c.visits_tracked);
        w.bool(c.turns_tracked);
    }

    for constant in &image.constants {
        w.cstring(constant);
    }
    w.end_cstring_section();

    w.u16(image.lists.len() as u16);
    for list in &image.lists {
        w.cstring(&list.name);
        w.u16(list.flag_names.len() as u16);
        for flag in &list.flag_names {
            w.cstring(flag);
        }
    }
    w.end_cstring_section();

    w.u32(image.root_ip);

    w.u32(image.instructions.len() as u32);
    for instr in &image.instructions {
        write_command(&mut w, instr);
    }

    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_image() -> Image {
        Image::new(
            vec![
                Command::LoadConst(0),
                Command::AppendToStream,
                Command::PushStreamMarker(Value::Newline),
                Command::LoadImmediate(Value::Int(3)),
                Command::StoreVar("score".into()),
                Command::BinaryOp(BinOp::Add),
                Command::CompareOp(CmpOp::Gt),
                Command::ListOp(ListOp::Count),
                Command::PushFrame { target: 0, kind: FrameKind::Function },
                Command::Sequence { count: 2, shuffle: true },
                Command::Tag(0),
                Command::Nop,
            ],
            vec!["hello".to_string()],
            vec![ContainerMeta {
                name_hash: 0xabcd,
                entry_ip: 0,
                visits_tracked: true,
                turns_tracked: false,
            }],
            vec![ListMeta {
                name: "Colors".to_string(),
                flag_names: vec!["Red".to_string(), "Blue".to_string()],
            }],
            0,
        )
    }

    #[test]
    fn from_bytes_round_trips_a_full_image() {
        let image = sample_image();
        let bytes = write_image_bytes(&image);
        let loaded = Image::from_bytes(&bytes).unwrap();

        assert_eq!(loaded.constants, image.constants);
        assert_eq!(loaded.root_ip, image.root_ip);
        assert_eq!(loaded.instructions.len(), image.instructions.len());
        assert_eq!(loaded.containers.len(), 1);
        assert_eq!(loaded.containers[0].name_hash, 0xabcd);
        assert!(loaded.containers[0].visits_tracked);
        assert_eq!(loaded.lists.len(), 1);
        assert_eq!(loaded.lists[0].flag_names, vec!["Red".to_string(), "Blue".to_string()]);
        assert!(matches!(loaded.instructions[8], Command::PushFrame { kind: FrameKind::Function, .. }));
        assert!(matches!(loaded.instructions[9], Command::Sequence { count: 2, shuffle: true }));
    }

    #[test]
    fn from_bytes_rejects_a_bad_magic_number() {
        let err = Image::from_bytes(&[1, 2, 3, 4]).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn from_bytes_rejects_truncated_input() {
        let image = sample_image();
        let bytes = write_image_bytes(&image);
        let err = Image::from_bytes(&bytes[..bytes.len() - 10]).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }
}
