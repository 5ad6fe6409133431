// lib.rs      giffer crate.
//
// Copyright (c) 2026  Douglas Lau
//
//! # giffer
//!
//! A library for encoding animated GIF images from raw RGBA frames.
//!
//! Every frame gets its own palette from a modified median cut quantizer
//! over a k-d tree in RGB space.  Pixels unchanged since the previous
//! frame are stored as transparency, so only the delta is LZW-compressed.
//! Frames may be mapped to the palette with Floyd-Steinberg dithering or
//! by nearest color.
//!
//! ## Example
//! ```
//! use giffer::Writer;
//! # fn main() -> giffer::Result<()> {
//! let mut out = Vec::new();
//! let mut writer = Writer::new(&mut out, 2, 2, 0)?;
//! let frame = [
//!     255, 0, 0, 255, 255, 0, 0, 255,
//!     255, 0, 0, 255, 255, 0, 0, 255,
//! ];
//! writer.write_frame(&frame, 2, 2, 0, 8, false)?;
//! writer.close()?;
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]

#[macro_use]
extern crate log;

pub mod block;
mod encode;
mod error;
mod lzw;
mod palette;
mod palettize;

pub use crate::encode::Writer;
pub use crate::error::{Error, Result};
pub use crate::palette::Palette;
