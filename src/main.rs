// main.rs      giffer command
//
// Copyright (c) 2026  Douglas Lau
//
#![forbid(unsafe_code)]

use clap::{App, AppSettings, Arg, ArgMatches};
use giffer::Writer;
use pix::rgb::SRgba8;
use pix::Raster;
use rgb::ComponentBytes;
use std::error::Error;
use std::io::{self, Write as _};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Crate version
const VERSION: &str = std::env!("CARGO_PKG_VERSION");

/// Main entry point
fn main() {
    env_logger::builder().format_timestamp(None).init();
    if let Err(e) = run() {
        let mut err = StandardStream::stderr(ColorChoice::Auto);
        let mut red = ColorSpec::new();
        red.set_fg(Some(Color::Red)).set_intense(true);
        let _ = err.set_color(&red);
        let _ = writeln!(err, "error: {}", e);
        let _ = err.reset();
        std::process::exit(1);
    }
}

/// Create clap App
fn create_app() -> App<'static, 'static> {
    App::new("giffer")
        .version(VERSION)
        .about("Animated GIF maker")
        .setting(AppSettings::ArgRequiredElseHelp)
        .arg(
            Arg::with_name("input-files")
                .short("i")
                .long("input-files")
                .takes_value(true)
                .multiple(true)
                .value_name("frame.png")
                .help("PNG frames to encode, in order"),
        )
        .arg(
            Arg::with_name("output-file")
                .short("o")
                .long("output-file")
                .takes_value(true)
                .default_value("out.gif")
                .help("name of the GIF file to generate"),
        )
        .arg(
            Arg::with_name("delay")
                .long("delay")
                .takes_value(true)
                .default_value("2")
                .help("delay between frames in hundredths of a second"),
        )
        .arg(
            Arg::with_name("bit-depth")
                .long("bit-depth")
                .takes_value(true)
                .default_value("8")
                .help("palette depth of the output image, 1 to 8 bits"),
        )
        .arg(
            Arg::with_name("dither")
                .long("dither")
                .help("dither the image instead of thresholding"),
        )
        .arg(
            Arg::with_name("numeric-sort")
                .long("numeric-sort")
                .help("sort input files in natural number order"),
        )
        .arg(
            Arg::with_name("gen-example")
                .long("gen-example")
                .help("generate an example GIF"),
        )
}

/// Run the command
fn run() -> Result<(), Box<dyn Error>> {
    let matches = create_app().get_matches();
    let output = matches.value_of("output-file").unwrap();
    let delay = matches.value_of("delay").unwrap().parse()?;
    let bit_depth = matches.value_of("bit-depth").unwrap().parse()?;
    let dither = matches.is_present("dither");
    if matches.is_present("gen-example") {
        return example(output, delay, bit_depth);
    }
    let inputs = input_files(&matches)?;
    encode_files(&inputs, output, delay, bit_depth, dither)
}

/// Collect input file names, sorted if requested
fn input_files(matches: &ArgMatches) -> Result<Vec<String>, Box<dyn Error>> {
    let mut inputs: Vec<String> = matches
        .values_of("input-files")
        .map(|v| v.map(String::from).collect())
        .unwrap_or_default();
    if inputs.is_empty() {
        return Err("--input-files requires at least one argument".into());
    }
    if matches.is_present("numeric-sort") {
        inputs.sort_by(|a, b| natord::compare(a, b));
    }
    Ok(inputs)
}

/// Encode PNG frames into a GIF file
fn encode_files(
    inputs: &[String],
    output: &str,
    delay: u16,
    bit_depth: u8,
    dither: bool,
) -> Result<(), Box<dyn Error>> {
    let first = lodepng::decode32_file(&inputs[0])
        .map_err(|e| format!("{}: {}", inputs[0], e))?;
    let width = u16::try_from(first.width)?;
    let height = u16::try_from(first.height)?;
    let mut writer = Writer::create(output, width, height, delay)?;
    let total = inputs.len();
    writer.write_frame(
        first.buffer.as_bytes(),
        width,
        height,
        delay,
        bit_depth,
        dither,
    )?;
    progress(1, total)?;
    for (frame, path) in inputs.iter().enumerate().skip(1) {
        let image = lodepng::decode32_file(path)
            .map_err(|e| format!("{}: {}", path, e))?;
        if image.width != usize::from(width)
            || image.height != usize::from(height)
        {
            return Err(format!("{}: frame size differs", path).into());
        }
        writer.write_frame(
            image.buffer.as_bytes(),
            width,
            height,
            delay,
            bit_depth,
            dither,
        )?;
        progress(frame + 1, total)?;
    }
    println!();
    writer.close()?;
    Ok(())
}

/// Generate an example GIF: a slowly cycling plasma
fn example(
    output: &str,
    delay: u16,
    bit_depth: u8,
) -> Result<(), Box<dyn Error>> {
    const WIDTH: u16 = 512;
    const HEIGHT: u16 = 512;
    const FRAMES: u32 = 256;
    let mut writer = Writer::create(output, WIDTH, HEIGHT, delay)?;
    let mut raster =
        Raster::<SRgba8>::with_clear(u32::from(WIDTH), u32::from(HEIGHT));
    for frame in 0..FRAMES {
        let t = frame as f32 * std::f32::consts::TAU / 255.0;
        for y in 0..u32::from(HEIGHT) {
            let fy = y as f32 / f32::from(HEIGHT);
            for x in 0..u32::from(WIDTH) {
                let fx = x as f32 / f32::from(WIDTH);
                let red = 0.5 + 0.5 * (t + fx).cos();
                let grn = 0.5 + 0.5 * (t + fy + 2.0).cos();
                let blu = 0.5 + 0.5 * (t + fx + 4.0).cos();
                *raster.pixel_mut(x as i32, y as i32) =
                    SRgba8::new(unorm(red), unorm(grn), unorm(blu), 255);
            }
        }
        writer.write_frame(
            raster.as_u8_slice(),
            WIDTH,
            HEIGHT,
            delay,
            bit_depth,
            true,
        )?;
        progress(frame as usize + 1, FRAMES as usize)?;
    }
    println!();
    writer.close()?;
    Ok(())
}

/// Convert a float to unorm
fn unorm(v: f32) -> u8 {
    (255.0 * v).round() as u8
}

/// Show progress on one line
fn progress(frame: usize, total: usize) -> Result<(), io::Error> {
    print!(
        "\rWriting frame {}/{} ({:.0}%)",
        frame,
        total,
        frame as f32 * 100.0 / total as f32
    );
    io::stdout().flush()
}
