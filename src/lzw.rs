// lzw.rs
//
// Copyright (c) 2026  Douglas Lau
//
//! Lempel-Ziv-Welch compression for GIF
use std::io::{self, Write};

/// Maximum code width in bits allowed for GIF
const MAX_CODE_BITS: u8 = 12;

/// Code type
type Code = u16;

/// Packs variable-width codes into bytes, emitted as GIF data sub-blocks
/// of at most 255 bytes
struct BitPacker {
    /// Bits filled in the partial byte
    bit_index: u8,
    /// Current partial byte
    byte: u8,
    /// Bytes staged for the next sub-block
    chunk: [u8; 256],
    /// Number of staged bytes
    chunk_len: usize,
}

impl Default for BitPacker {
    fn default() -> Self {
        BitPacker {
            bit_index: 0,
            byte: 0,
            chunk: [0; 256],
            chunk_len: 0,
        }
    }
}

impl BitPacker {
    /// Insert a single bit (the low bit of `bit`)
    fn write_bit(&mut self, bit: Code) {
        self.byte |= ((bit & 1) as u8) << self.bit_index;
        self.bit_index += 1;
        if self.bit_index > 7 {
            // move the finished byte to the chunk and start a new one
            self.chunk[self.chunk_len] = self.byte;
            self.chunk_len += 1;
            self.bit_index = 0;
            self.byte = 0;
        }
    }

    /// Write one code, least significant bit first
    fn write_code<W: Write>(
        &mut self,
        w: &mut W,
        mut code: Code,
        length: u8,
    ) -> io::Result<()> {
        for _ in 0..length {
            self.write_bit(code);
            code >>= 1;
            if self.chunk_len == 255 {
                self.flush_chunk(w)?;
            }
        }
        Ok(())
    }

    /// Write the staged bytes as one length-prefixed sub-block.
    ///
    /// Must not be called with an empty chunk; a zero length byte is the
    /// sub-block series terminator.
    fn flush_chunk<W: Write>(&mut self, w: &mut W) -> io::Result<()> {
        debug_assert!(self.chunk_len > 0);
        w.write_all(&[self.chunk_len as u8])?;
        w.write_all(&self.chunk[..self.chunk_len])?;
        self.bit_index = 0;
        self.byte = 0;
        self.chunk_len = 0;
        Ok(())
    }
}

/// Dictionary for the compressor: a 256-ary tree with one node per code,
/// where entry 0 means unassigned
struct CodeTree(Vec<[Code; 256]>);

impl CodeTree {
    /// 4096 codes at the GIF maximum of 12 bits
    const SIZE: usize = 1 << MAX_CODE_BITS;

    /// Create a new code tree
    fn new() -> Self {
        CodeTree(vec![[0; 256]; Self::SIZE])
    }

    /// Clear all assignments
    fn reset(&mut self) {
        for node in &mut self.0 {
            *node = [0; 256];
        }
    }

    /// Get the code extending `code` with `data`, if assigned
    fn child(&self, code: Code, data: u8) -> Option<Code> {
        match self.0[code as usize][data as usize] {
            0 => None,
            child => Some(child),
        }
    }

    /// Assign a code extending `code` with `data`
    fn set_child(&mut self, code: Code, data: u8, child: Code) {
        self.0[code as usize][data as usize] = child;
    }
}

/// LZW data compressor with adaptive code width
pub struct Compressor {
    /// Dictionary tree
    tree: CodeTree,
    /// Minimum code bits
    min_code_size: u8,
    /// Current code bits
    code_size: u8,
    /// Highest assigned code
    max_code: Code,
}

impl Compressor {
    /// Create a new compressor; `min_code_size` is the palette bit depth
    pub(crate) fn new(min_code_size: u8) -> Self {
        Compressor {
            tree: CodeTree::new(),
            min_code_size,
            code_size: min_code_size + 1,
            max_code: (1 << min_code_size) + 1,
        }
    }

    /// Get the clear code
    fn clear_code(&self) -> Code {
        1 << self.min_code_size
    }

    /// Get the end of information code
    fn end_code(&self) -> Code {
        self.clear_code() + 1
    }

    /// Compress a symbol stream into LZW sub-blocks, ending with the
    /// zero-length sub-block terminator
    pub(crate) fn compress<W: Write>(
        &mut self,
        w: &mut W,
        symbols: impl IntoIterator<Item = u8>,
    ) -> io::Result<()> {
        let mut packer = BitPacker::default();
        // start with fresh dictionaries on both ends
        packer.write_code(w, self.clear_code(), self.code_size)?;
        let mut curr_code = None;
        for symbol in symbols {
            curr_code = Some(match curr_code {
                // first symbol of a new run
                None => Code::from(symbol),
                Some(code) => match self.tree.child(code, symbol) {
                    // current run is still in the dictionary
                    Some(next) => next,
                    None => {
                        // finish the run and insert its extension
                        packer.write_code(w, code, self.code_size)?;
                        self.max_code += 1;
                        self.tree.set_child(code, symbol, self.max_code);
                        if self.max_code >= 1 << self.code_size {
                            // codes have outgrown their width
                            self.code_size += 1;
                        }
                        if self.max_code == (CodeTree::SIZE - 1) as Code {
                            // the dictionary is full, begin anew
                            packer.write_code(
                                w,
                                self.clear_code(),
                                self.code_size,
                            )?;
                            self.tree.reset();
                            self.code_size = self.min_code_size + 1;
                            self.max_code = self.end_code();
                        }
                        Code::from(symbol)
                    }
                },
            });
        }
        if let Some(code) = curr_code {
            packer.write_code(w, code, self.code_size)?;
        }
        packer.write_code(w, self.clear_code(), self.code_size)?;
        packer.write_code(w, self.end_code(), self.min_code_size + 1)?;
        // pad the partial byte and write out the last chunk
        while packer.bit_index > 0 {
            packer.write_bit(0);
        }
        if packer.chunk_len > 0 {
            packer.flush_chunk(w)?;
        }
        w.write_all(&[0]) // sub-block series terminator
    }
}

/// Join a series of length-prefixed sub-blocks back into raw LZW bytes
#[cfg(test)]
pub(crate) fn unframe(mut data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let len = data[0] as usize;
        if len == 0 {
            break;
        }
        out.extend_from_slice(&data[1..=len]);
        data = &data[1 + len..];
    }
    out
}

/// Decompress raw LZW bytes, for round-trip checks
#[cfg(test)]
pub(crate) fn decompress(data: &[u8], min_code_size: u8) -> Vec<u8> {
    let clear_code: Code = 1 << min_code_size;
    let end_code = clear_code + 1;
    // dictionary of (parent, data) entries
    let reset = |dict: &mut Vec<(Option<Code>, u8)>| {
        dict.clear();
        for data in 0..clear_code {
            dict.push((None, data as u8));
        }
        dict.push((None, 0)); // clear code
        dict.push((None, 0)); // end code
    };
    let mut dict = Vec::new();
    reset(&mut dict);
    let mut code_size = min_code_size + 1;
    let mut prev: Option<Code> = None;
    let mut out = Vec::new();
    let mut bit_pos = 0;
    while let Some(code) = read_code(data, &mut bit_pos, code_size) {
        if code == clear_code {
            reset(&mut dict);
            code_size = min_code_size + 1;
            prev = None;
            continue;
        }
        if code == end_code {
            break;
        }
        let start = out.len();
        if (code as usize) < dict.len() {
            expand(&dict, code, &mut out);
            if let Some(p) = prev {
                let first = out[start];
                dict.push((Some(p), first));
            }
        } else {
            // the run that was just defined by the encoder
            let p = prev.unwrap();
            expand(&dict, p, &mut out);
            let first = out[start];
            out.push(first);
            dict.push((Some(p), first));
        }
        if dict.len() == 1 << code_size && code_size < MAX_CODE_BITS {
            code_size += 1;
        }
        prev = Some(code);
    }
    out
}

/// Read one code of `code_size` bits, least significant bit first
#[cfg(test)]
fn read_code(data: &[u8], bit_pos: &mut usize, code_size: u8) -> Option<Code> {
    if *bit_pos + code_size as usize > data.len() * 8 {
        return None;
    }
    let mut code = 0;
    for i in 0..code_size {
        let p = *bit_pos + i as usize;
        if data[p / 8] >> (p % 8) & 1 == 1 {
            code |= 1 << i;
        }
    }
    *bit_pos += code_size as usize;
    Some(code)
}

/// Append the expansion of a dictionary entry
#[cfg(test)]
fn expand(dict: &[(Option<Code>, u8)], code: Code, out: &mut Vec<u8>) {
    let start = out.len();
    let mut node = dict[code as usize];
    loop {
        out.push(node.1);
        match node.0 {
            Some(parent) => node = dict[parent as usize],
            None => break,
        }
    }
    out[start..].reverse();
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn packs_solid_run() {
        let mut out = Vec::new();
        Compressor::new(2).compress(&mut out, [3, 3, 3, 3]).unwrap();
        // clear 3 6 3 clear end, all at 3 bits
        assert_eq!(&out[..], &[0x03, 0x9C, 0xC7, 0x02, 0x00]);
    }

    #[test]
    fn round_trip_solid() {
        let symbols = vec![7u8; 4096];
        let mut out = Vec::new();
        Compressor::new(8)
            .compress(&mut out, symbols.iter().copied())
            .unwrap();
        assert_eq!(decompress(&unframe(&out), 8), symbols);
    }

    #[test]
    fn round_trip_runs() {
        // stepped runs grow the dictionary and widen codes
        let symbols: Vec<u8> = (0..4096).map(|i| (i / 64) as u8).collect();
        let mut out = Vec::new();
        Compressor::new(8)
            .compress(&mut out, symbols.iter().copied())
            .unwrap();
        assert_eq!(decompress(&unframe(&out), 8), symbols);
    }

    #[test]
    fn round_trip_random() {
        // enough noise to fill the dictionary and force a mid-stream
        // clear code
        let mut symbols = Vec::with_capacity(8192);
        let mut seed = 0x2F6E_2B1A_u32;
        for _ in 0..8192 {
            seed = seed.wrapping_mul(134_775_813).wrapping_add(1);
            symbols.push((seed >> 24) as u8);
        }
        let mut out = Vec::new();
        Compressor::new(8)
            .compress(&mut out, symbols.iter().copied())
            .unwrap();
        assert_eq!(decompress(&unframe(&out), 8), symbols);
    }

    #[test]
    fn round_trip_small_code_sizes() {
        for depth in 1..=8u8 {
            let symbols: Vec<u8> = (0..256u32)
                .map(|i| (i % (1 << depth)) as u8)
                .collect();
            let mut out = Vec::new();
            Compressor::new(depth)
                .compress(&mut out, symbols.iter().copied())
                .unwrap();
            assert_eq!(decompress(&unframe(&out), depth), symbols);
        }
    }

    #[test]
    fn sub_blocks_capped_at_255() {
        let symbols: Vec<u8> = (0..16384u32).map(|i| (i % 251) as u8).collect();
        let mut out = Vec::new();
        Compressor::new(8)
            .compress(&mut out, symbols.iter().copied())
            .unwrap();
        let mut pos = 0;
        let mut terminated = false;
        while pos < out.len() {
            let len = out[pos] as usize;
            if len == 0 {
                terminated = true;
                assert_eq!(pos, out.len() - 1);
                break;
            }
            pos += 1 + len;
        }
        assert!(terminated);
    }
}
