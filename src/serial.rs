//! Wire types for the v47 protocol.
//! The type name indicates the type that is sent/to be sent.
//! It's methods return/write the equivalent type.

use crate::errors::*;

use std::io::{self, prelude::*};
use std::marker::PhantomData;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

pub use uuid::Uuid;

/// Something that can be read from a buffer.
pub trait Readable: Sized {
    fn read_from<T: io::Read>(buf: &mut T) -> SekishoResult<Self>;
}

/// Something that can be written to a buffer.
pub trait Writable: Sized {
    fn write_to<T: io::Write>(&self, buf: &mut T) -> SekishoResult<()>;
}

// -----------------------------------
// https://wiki.vg/Protocol#Data_types
// -----------------------------------

// ---- Bool ---------------

pub type Bool = bool;

impl Readable for Bool {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> SekishoResult<Self> {
        Ok(buf.read_u8()? == 0x01)
    }
}

impl Writable for Bool {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> SekishoResult<()> {
        Ok(buf.write_u8(if *self { 0x01 } else { 0x00 })?)
    }
}

// ---- Byte ---------------

pub type Byte = i8;

impl Readable for Byte {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> SekishoResult<Self> {
        Ok(buf.read_i8()?)
    }
}

impl Writable for Byte {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> SekishoResult<()> {
        Ok(buf.write_i8(*self)?)
    }
}

// ---- Unsigned Byte ------

pub type UnsignedByte = u8;

impl Readable for UnsignedByte {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> SekishoResult<Self> {
        Ok(buf.read_u8()?)
    }
}

impl Writable for UnsignedByte {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> SekishoResult<()> {
        Ok(buf.write_u8(*self)?)
    }
}

// ---- Short --------------

pub type Short = i16;

impl Readable for Short {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> SekishoResult<Self> {
        Ok(buf.read_i16::<BigEndian>()?)
    }
}

impl Writable for Short {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> SekishoResult<()> {
        Ok(buf.write_i16::<BigEndian>(*self)?)
    }
}

// ---- Unsigned Short -----

pub type UnsignedShort = u16;

impl Readable for UnsignedShort {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> SekishoResult<Self> {
        Ok(buf.read_u16::<BigEndian>()?)
    }
}

impl Writable for UnsignedShort {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> SekishoResult<()> {
        Ok(buf.write_u16::<BigEndian>(*self)?)
    }
}

// ---- Long ---------------

pub type Long = i64;

impl Readable for Long {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> SekishoResult<Self> {
        Ok(buf.read_i64::<BigEndian>()?)
    }
}

impl Writable for Long {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> SekishoResult<()> {
        Ok(buf.write_i64::<BigEndian>(*self)?)
    }
}

// ---- String -------------

impl Readable for String {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> SekishoResult<Self> {
        let len = VarInt::read_from(buf)?.0;
        let mut bytes = vec![0; len as usize];
        buf.read_exact(&mut bytes)?;
        Ok(Self::from_utf8(bytes)?)
    }
}

impl Writable for String {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> SekishoResult<()> {
        let bytes = self.as_bytes();
        VarInt(bytes.len() as i32).write_to(buf)?;
        Ok(buf.write_all(bytes)?)
    }
}

// ---- VarInt -------------

/// A signed 32 bit value, LEB128 encoded in at most 5 bytes.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct VarInt(pub i32);

impl Readable for VarInt {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> SekishoResult<Self> {
        let mut res: u32 = 0;

        for byte_index in 0..5 {
            let byte = buf.read_u8()? as u32;

            res |= (byte & 0x7F) << (byte_index * 7);

            if (byte & 0x80) == 0 {
                return Ok(Self(res as i32));
            }
        }

        Err(Error::from(ProtocolViolation {
            expected: "varint terminating within 5 bytes".to_owned(),
        }))
    }
}

impl Writable for VarInt {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> SekishoResult<()> {
        let mut val = self.0 as u32;

        loop {
            let byte = (val & 0x7F) as u8;

            val >>= 7;

            if val == 0 {
                return Ok(buf.write_u8(byte)?);
            }

            buf.write_u8(byte | 0x80)?;
        }
    }
}

impl From<i32> for VarInt {
    #[inline]
    fn from(item: i32) -> Self {
        Self(item)
    }
}

impl From<VarInt> for i32 {
    #[inline]
    fn from(item: VarInt) -> Self {
        item.0
    }
}

impl From<usize> for VarInt {
    #[inline]
    fn from(item: usize) -> Self {
        Self(item as i32)
    }
}

impl From<VarInt> for usize {
    #[inline]
    fn from(item: VarInt) -> Self {
        item.0 as usize
    }
}

// ---- UUID ---------------

impl Readable for Uuid {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> SekishoResult<Self> {
        Ok(Self::from_u128(buf.read_u128::<BigEndian>()?))
    }
}

impl Writable for Uuid {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> SekishoResult<()> {
        Ok(buf.write_u128::<BigEndian>(self.as_u128())?)
    }
}

// ---- Byte Arrays --------

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ByteArray(pub Vec<u8>);

impl Readable for ByteArray {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> SekishoResult<Self> {
        let len = VarInt::read_from(buf)?.0 as usize;
        let mut data = vec![0; len];
        buf.read_exact(&mut data)?;
        Ok(Self(data))
    }
}

impl Writable for ByteArray {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> SekishoResult<()> {
        VarInt(self.0.len() as i32).write_to(buf)?;
        Ok(buf.write_all(&self.0[..])?)
    }
}

impl From<Vec<u8>> for ByteArray {
    #[inline]
    fn from(item: Vec<u8>) -> Self {
        Self(item)
    }
}

// ---- Arrays -------------

#[derive(Debug, PartialEq, Clone)]
pub struct GenericArray<L: Into<usize> + From<usize> + Readable + Writable, C: Readable + Writable>(
    pub Vec<C>,
    PhantomData<L>,
);

impl<L, C> Readable for GenericArray<L, C>
where
    L: Into<usize> + From<usize> + Readable + Writable,
    C: Readable + Writable,
{
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> SekishoResult<Self> {
        let len = L::read_from(buf)?.into();
        let mut data = Vec::with_capacity(len);
        for _ in 0..len {
            data.push(C::read_from(buf)?);
        }
        Ok(Self(data, PhantomData))
    }
}

impl<L, C> Writable for GenericArray<L, C>
where
    L: Into<usize> + From<usize> + Readable + Writable,
    C: Readable + Writable,
{
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> SekishoResult<()> {
        let len: L = self.0.len().into();
        len.write_to(buf)?;
        for i in &self.0 {
            i.write_to(buf)?;
        }
        Ok(())
    }
}

impl<L, C> From<Vec<C>> for GenericArray<L, C>
where
    L: Into<usize> + From<usize> + Readable + Writable,
    C: Readable + Writable,
{
    #[inline]
    fn from(item: Vec<C>) -> Self {
        Self(item, PhantomData)
    }
}

impl<L, C> From<GenericArray<L, C>> for Vec<C>
where
    L: Into<usize> + From<usize> + Readable + Writable,
    C: Readable + Writable,
{
    #[inline]
    fn from(item: GenericArray<L, C>) -> Self {
        item.0
    }
}

// ---- Option --------------

#[derive(Debug, PartialEq, Clone)]
pub struct GenericOption<C: Readable + Writable>(pub Option<C>);

impl<C: Readable + Writable> Readable for GenericOption<C> {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> SekishoResult<Self> {
        let exists = bool::read_from(buf)?;
        Ok(Self(if exists {
            Some(C::read_from(buf)?)
        } else {
            None
        }))
    }
}

impl<C: Readable + Writable> Writable for GenericOption<C> {
    #[inline]
    fn write_to<W: io::Write>(&self, buf: &mut W) -> SekishoResult<()> {
        match &self.0 {
            Some(s) => {
                true.write_to(buf)?;
                s.write_to(buf)
            }
            _ => false.write_to(buf),
        }
    }
}

// ---- Chat ---------------

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone)]
pub struct Action {
    action: String,
    value: String,
}

/// One node of a chat tree. Every field is optional on the wire.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatComponent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with: Option<Vec<Chat>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underlined: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strikethrough: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obfuscated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_event: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hover_event: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Vec<Chat>>,
}

/// Contents/style of a chat message. The wire representation is a
/// string containing a JSON document, which may be a bare string, a
/// component object or a list of either.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(untagged)]
pub enum Chat {
    Text(String),
    Component(Box<ChatComponent>),
    List(Vec<Chat>),
}

impl Chat {
    /// Plain text rendering: `text`, then `extra`, recursively;
    /// `translate` keys expand their `with` arguments in brackets.
    /// Formatting codes are stripped.
    pub fn plain(&self) -> String {
        let mut out = String::new();
        self.render(&mut out);
        strip_codes(&out)
    }

    fn render(&self, out: &mut String) {
        match self {
            Chat::Text(s) => out.push_str(s),
            Chat::List(items) => {
                for item in items {
                    item.render(out);
                }
            }
            Chat::Component(c) => {
                if let Some(key) = &c.translate {
                    out.push_str(key);
                    if let Some(args) = &c.with {
                        if !args.is_empty() {
                            out.push('[');
                            for (i, arg) in args.iter().enumerate() {
                                if i > 0 {
                                    out.push_str(", ");
                                }
                                arg.render(out);
                            }
                            out.push(']');
                        }
                    }
                }
                if let Some(text) = &c.text {
                    out.push_str(text);
                }
                if let Some(extra) = &c.extra {
                    for item in extra {
                        item.render(out);
                    }
                }
            }
        }
    }
}

impl From<&str> for Chat {
    /// Wraps a plain string as `{"text": s}`.
    #[inline]
    fn from(item: &str) -> Self {
        Self::Component(Box::new(ChatComponent {
            text: Some(item.to_owned()),
            ..Default::default()
        }))
    }
}

impl From<String> for Chat {
    #[inline]
    fn from(item: String) -> Self {
        Self::from(&item[..])
    }
}

impl Readable for Chat {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> SekishoResult<Self> {
        Ok(serde_json::from_str(&String::read_from(buf)?[..])?)
    }
}

impl Writable for Chat {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> SekishoResult<()> {
        serde_json::to_string(&self)?.write_to(buf)
    }
}

/// Remove `§x` formatting pairs from a string.
pub fn strip_codes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '§' {
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}
