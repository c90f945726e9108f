// Copyright 2022 Oxide Computer Company

//! The desktop interchange format: a concatenation of routing tables,
//! each framed by a header giving the owning chip's (x, y) coordinates
//! and the entry count, followed by that many `{key, mask, source,
//! route}` quads. Everything is little-endian. The coordinates mean
//! nothing to the minimisers and are carried through untouched.

use std::io::{ErrorKind, Read, Write};

use crate::error::Error;
use crate::table::{Entry, KeyMask, Table};

/// One frame of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub x: u8,
    pub y: u8,
    pub table: Table,
}

/// Read the next frame, or `None` at a clean end of stream. A stream
/// that ends inside a frame is an error.
pub fn read_frame<R: Read>(r: &mut R) -> Result<Option<Frame>, Error> {
    // Header: x, y, u16 length
    let mut header = [0u8; 4];
    match r.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    }
    let x = header[0];
    let y = header[1];
    let length = u16::from_le_bytes([header[2], header[3]]) as usize;

    let mut entries = Vec::with_capacity(length);
    for read in 0..length {
        let mut buf = [0u8; 16];
        r.read_exact(&mut buf).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                Error::Truncated { expected: length, read }
            } else {
                e.into()
            }
        })?;
        let word = |i: usize| {
            u32::from_le_bytes([
                buf[i * 4],
                buf[i * 4 + 1],
                buf[i * 4 + 2],
                buf[i * 4 + 3],
            ])
        };
        entries.push(Entry::new(
            KeyMask::new(word(0), word(1)),
            word(3),
            word(2),
        ));
    }

    Ok(Some(Frame { x, y, table: Table::new(entries) }))
}

/// Write one frame in the same layout, with the header length taken
/// from the table's current size.
pub fn write_frame<W: Write>(w: &mut W, frame: &Frame) -> Result<(), Error> {
    let length = frame.table.len() as u16;
    w.write_all(&[frame.x, frame.y])?;
    w.write_all(&length.to_le_bytes())?;

    for e in &frame.table.entries {
        w.write_all(&e.keymask.key.to_le_bytes())?;
        w.write_all(&e.keymask.mask.to_le_bytes())?;
        w.write_all(&e.source.to_le_bytes())?;
        w.write_all(&e.route.to_le_bytes())?;
    }
    Ok(())
}
