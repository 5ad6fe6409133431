// encode.rs
//
// Copyright (c) 2026  Douglas Lau
//
//! GIF file encoding
use crate::block::*;
use crate::lzw::Compressor;
use crate::palette::{Palette, TRANSPARENCY_INDEX};
use crate::palettize;
use crate::{Error, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

impl Header {
    /// Format a header block
    fn format<W: Write>(self, w: &mut W) -> io::Result<()> {
        w.write_all(b"GIF89a")
    }
}

impl LogicalScreenDesc {
    /// Format a logical screen desc block
    fn format<W: Write>(self, w: &mut W) -> io::Result<()> {
        let width = self.screen_width();
        let height = self.screen_height();
        w.write_all(&[
            width as u8,
            (width >> 8) as u8,
            height as u8,
            (height >> 8) as u8,
            self.flags(),
            self.background_color_idx(),
            self.pixel_aspect_ratio(),
        ])
    }
}

impl GlobalColorTable {
    /// Format the dummy global color table
    fn format<W: Write>(self, w: &mut W) -> io::Result<()> {
        w.write_all(&[0; 6])
    }
}

impl Application {
    /// Format the NETSCAPE2.0 looping extension block
    fn format<W: Write>(self, w: &mut W) -> io::Result<()> {
        let loop_count = self.loop_count();
        w.write_all(&[0x21, 0xFF, 11])?;
        w.write_all(b"NETSCAPE2.0")?;
        w.write_all(&[
            3, // sub-block size
            1, // sub-block ID
            loop_count as u8,
            (loop_count >> 8) as u8,
            0, // block terminator
        ])
    }
}

impl GraphicControl {
    /// Format a graphic control extension block
    fn format<W: Write>(self, w: &mut W) -> io::Result<()> {
        let delay = self.delay_time_cs();
        w.write_all(&[
            0x21,
            0xF9,
            4, // block size
            self.flags(),
            delay as u8,
            (delay >> 8) as u8,
            self.transparent_color_idx(),
            0, // block terminator
        ])
    }
}

impl ImageDesc {
    /// Format an image descriptor block
    fn format<W: Write>(self, w: &mut W) -> io::Result<()> {
        let left = self.left();
        let top = self.top();
        let width = self.width();
        let height = self.height();
        w.write_all(&[
            0x2C,
            left as u8,
            (left >> 8) as u8,
            top as u8,
            (top >> 8) as u8,
            width as u8,
            (width >> 8) as u8,
            height as u8,
            (height >> 8) as u8,
            self.flags(),
        ])
    }
}

impl Palette {
    /// Format the local color table
    fn format<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let table_len = 1 << self.bit_depth();
        let mut colors = Vec::with_capacity(table_len * 3);
        colors.extend_from_slice(&[0, 0, 0]); // slot 0: transparency
        for i in 1..table_len {
            let (r, g, b) = self.color(i);
            colors.extend_from_slice(&[r, g, b]);
        }
        w.write_all(&colors)
    }
}

impl Trailer {
    /// Format a trailer block
    fn format<W: Write>(self, w: &mut W) -> io::Result<()> {
        w.write_all(&[0x3B])
    }
}

/// Encoder for writing animated GIF files.
///
/// Frames are RGBA8 buffers with a top-left origin.  Each frame gets its
/// own palette; pixels unchanged since the previous frame are stored as
/// transparency so only the delta is compressed.
///
/// Dropping a writer without calling [close] still writes the trailer and
/// flushes, but any error doing so is lost.
///
/// [close]: struct.Writer.html#method.close
pub struct Writer<W: Write> {
    /// Output for encoded data; `None` after close
    writer: Option<W>,
    /// The most recent palettized frame, with the palette index of each
    /// pixel in its alpha byte
    old_image: Vec<u8>,
    /// Screen width in pixels
    width: u16,
    /// Screen height in pixels
    height: u16,
    /// Has no frame been written yet?
    first_frame: bool,
}

impl Writer<BufWriter<File>> {
    /// Create a GIF file at `path`.
    ///
    /// `delay_cs` is the time between frames in hundredths of a second;
    /// when non-zero, a looping extension is written so the animation
    /// repeats forever.  On failure no file writer exists.
    pub fn create<P: AsRef<Path>>(
        path: P,
        width: u16,
        height: u16,
        delay_cs: u16,
    ) -> Result<Self> {
        let file = File::create(path)?;
        Writer::new(BufWriter::new(file), width, height, delay_cs)
    }
}

impl<W: Write> Writer<W> {
    /// Create an encoder writing to `writer`.
    ///
    /// The preamble is written immediately: header, logical screen
    /// descriptor, dummy global color table and, when `delay_cs` is
    /// non-zero, the looping extension.
    pub fn new(
        mut writer: W,
        width: u16,
        height: u16,
        delay_cs: u16,
    ) -> Result<Self> {
        Header::default().format(&mut writer)?;
        LogicalScreenDesc::default()
            .with_screen_width(width)
            .with_screen_height(height)
            .format(&mut writer)?;
        GlobalColorTable::default().format(&mut writer)?;
        if delay_cs != 0 {
            Application::default().format(&mut writer)?;
        }
        let old_image =
            vec![0; usize::from(width) * usize::from(height) * 4];
        Ok(Writer {
            writer: Some(writer),
            old_image,
            width,
            height,
            first_frame: true,
        })
    }

    /// Write one frame of RGBA8 pixels (alpha is ignored).
    ///
    /// `image` must hold `width * height * 4` bytes, and the dimensions
    /// must match those the writer was created with.  `bit_depth` sets
    /// the local palette size for this frame, 1 to 8 bits; decoders
    /// commonly reject code sizes below 2, so depth 1 is best avoided.
    /// With `dither` the frame is Floyd-Steinberg error-diffused,
    /// otherwise each pixel maps to its nearest palette color.
    pub fn write_frame(
        &mut self,
        image: &[u8],
        width: u16,
        height: u16,
        delay_cs: u16,
        bit_depth: u8,
        dither: bool,
    ) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::ClosedWriter)?;
        if width != self.width
            || height != self.height
            || image.len() != self.old_image.len()
        {
            return Err(Error::InvalidFrameDimensions);
        }
        if !(1..=8).contains(&bit_depth) {
            return Err(Error::InvalidBitDepth(bit_depth));
        }
        let have_last = !self.first_frame;
        // a dithered frame diffuses error across the whole image, so its
        // palette is built from the full frame instead of the delta
        let palette = if dither || !have_last {
            Palette::build(None, image, bit_depth, dither)
        } else {
            Palette::build(Some(&self.old_image), image, bit_depth, dither)
        };
        if dither {
            palettize::dither_image(
                image,
                &mut self.old_image,
                have_last,
                usize::from(width),
                usize::from(height),
                &palette,
            );
        } else {
            palettize::threshold_image(
                image,
                &mut self.old_image,
                have_last,
                &palette,
            );
        }
        self.first_frame = false;
        GraphicControl::default()
            .with_delay_time_cs(delay_cs)
            .with_transparent_color_idx(TRANSPARENCY_INDEX as u8)
            .format(writer)?;
        ImageDesc::default()
            .with_width(width)
            .with_height(height)
            .with_bit_depth(bit_depth)
            .format(writer)?;
        palette.format(writer)?;
        writer.write_all(&[bit_depth])?; // LZW minimum code size
        let w = usize::from(width);
        let h = usize::from(height);
        let indexed = &self.old_image;
        let symbols = (0..h).flat_map(move |y| {
            // bottom-left origin input reads rows back to front
            let y = if cfg!(feature = "flip-vert") { h - 1 - y } else { y };
            (0..w).map(move |x| indexed[(y * w + x) * 4 + 3])
        });
        Compressor::new(bit_depth).compress(writer, symbols)?;
        debug!(
            "frame: {}x{}, depth {}, dither {}",
            width, height, bit_depth, dither
        );
        Ok(())
    }

    /// Write the trailer and flush the output.
    ///
    /// Closing a second time, or writing frames afterwards, returns
    /// [ClosedWriter](enum.Error.html#variant.ClosedWriter).
    pub fn close(&mut self) -> Result<()> {
        match self.writer.take() {
            Some(mut writer) => {
                Trailer::default().format(&mut writer)?;
                writer.flush()?;
                self.old_image = Vec::new();
                Ok(())
            }
            None => Err(Error::ClosedWriter),
        }
    }
}

impl<W: Write> Drop for Writer<W> {
    fn drop(&mut self) {
        // the trailer must be written even when the caller never closed
        if let Some(mut writer) = self.writer.take() {
            let _ = Trailer::default().format(&mut writer);
            let _ = writer.flush();
        }
    }
}
