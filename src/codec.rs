//! Shared little-endian primitive reader/writer, used by both the compiled
//! story image parser (`bytecode::Image::from_bytes`) and the snapshot
//! format. Keeping one codec means a `Value` or `FrameKind` is encoded
//! identically wherever it shows up in either byte format.

use crate::bytecode::FrameKind;
use crate::error::{Error, Result};
use crate::list_table::ListHandle;
use crate::string_table::StringId;
use crate::value::{DivertTarget, StringRef, Value, VariablePointer};

/// A sentinel byte prefix distinguishing an empty string from the
/// double-NUL end-of-section marker used by [`Writer::end_cstring_section`].
const EMPTY_STRING_SENTINEL: u8 = 0x03;

pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn bool(&mut self, v: bool) {
        self.u8(v as u8);
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// A single entry within a NUL-terminated-strings section.
    pub fn cstring(&mut self, s: &str) {
        if s.is_empty() {
            self.u8(EMPTY_STRING_SENTINEL);
        } else {
            self.buf.extend_from_slice(s.as_bytes());
        }
        self.u8(0);
    }

    /// Closes out a run of `cstring` entries with the double-NUL
    /// end-of-section marker.
    pub fn end_cstring_section(&mut self) {
        self.u8(0);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or_else(|| Error::Format("byte offset overflow".into()))?;
        let slice = self.buf.get(self.pos..end).ok_or_else(|| Error::Format("unexpected end of data".into()))?;
        self.pos = end;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool> {
        Ok(self.u8()? != 0)
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    /// One entry of a NUL-terminated-strings section, or `None` at the
    /// double-NUL end-of-section marker.
    pub fn cstring(&mut self) -> Result<Option<String>> {
        let mut bytes = Vec::new();
        loop {
            let b = self.u8()?;
            if b == 0 {
                break;
            }
            bytes.push(b);
        }
        if bytes.is_empty() {
            return Ok(None);
        }
        if bytes == [EMPTY_STRING_SENTINEL] {
            return Ok(Some(String::new()));
        }
        String::from_utf8(bytes).map(Some).map_err(|e| Error::Format(format!("invalid UTF-8 in byte stream: {e}")))
    }
}

pub fn frame_kind_tag(kind: FrameKind) -> u8 {
    match kind {
        FrameKind::Container => 0,
        FrameKind::Function => 1,
        FrameKind::Tunnel => 2,
        FrameKind::Thread => 3,
    }
}

pub fn frame_kind_from_tag(tag: u8) -> Result<FrameKind> {
    match tag {
        0 => Ok(FrameKind::Container),
        1 => Ok(FrameKind::Function),
        2 => Ok(FrameKind::Tunnel),
        3 => Ok(FrameKind::Thread),
        other => Err(Error::Format(format!("unknown frame kind tag {other}"))),
    }
}

pub fn write_value(w: &mut Writer, value: &Value) {
    match value {
        Value::None => w.u8(0),
        Value::Null => w.u8(1),
        Value::Bool(b) => {
            w.u8(2);
            w.bool(*b);
        }
        Value::Int(i) => {
            w.u8(3);
            w.i32(*i);
        }
        Value::UInt(u) => {
            w.u8(4);
            w.u32(*u);
        }
        Value::Float(f) => {
            w.u8(5);
            w.f32(*f);
        }
        Value::Str(StringRef::Interned(id)) => {
            w.u8(6);
            w.u32(id.0);
        }
        Value::Str(StringRef::Constant(ord)) => {
            w.u8(7);
            w.u32(*ord);
        }
        Value::List(handle) => {
            w.u8(8);
            w.u32(handle.0);
        }
        Value::ListFlag { list_id, flag } => {
            w.u8(9);
            w.i16(*list_id);
            w.i16(*flag);
        }
        Value::Divert(target) => {
            w.u8(10);
            w.u32(target.0);
        }
        Value::VariablePointer(ptr) => {
            w.u8(11);
            w.cstring(&ptr.name);
            w.i32(ptr.context);
        }
        Value::Newline => w.u8(12),
        Value::Glue => w.u8(13),
        Value::FuncStart => w.u8(14),
        Value::FuncEnd => w.u8(15),
        Value::TunnelFrame => w.u8(16),
        Value::Marker => w.u8(17),
    }
}

pub fn read_value(r: &mut Reader) -> Result<Value> {
    let tag = r.u8()?;
    Ok(match tag {
        0 => Value::None,
        1 => Value::Null,
        2 => Value::Bool(r.bool()?),
        3 => Value::Int(r.i32()?),
        4 => Value::UInt(r.u32()?),
        5 => Value::Float(r.f32()?),
        6 => Value::Str(StringRef::Interned(StringId(r.u32()?))),
        7 => Value::Str(StringRef::Constant(r.u32()?)),
        8 => Value::List(ListHandle(r.u32()?)),
        9 => Value::ListFlag {
            list_id: r.i16()?,
            flag: r.i16()?,
        },
        10 => Value::Divert(DivertTarget(r.u32()?)),
        11 => {
            let name = r.cstring()?.ok_or_else(|| Error::Format("variable pointer name missing".into()))?;
            let context = r.i32()?;
            Value::VariablePointer(VariablePointer { name, context })
        }
        12 => Value::Newline,
        13 => Value::Glue,
        14 => Value::FuncStart,
        15 => Value::FuncEnd,
        16 => Value::TunnelFrame,
        17 => Value::Marker,
        other => return Err(Error::Format(format!("unknown value tag {other}"))),
    })
}
