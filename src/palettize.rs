// palettize.rs
//
// Copyright (c) 2026  Douglas Lau
//
//! Mapping frame pixels to palette entries
use crate::palette::{Palette, TRANSPARENCY_INDEX};

/// Map each pixel to its nearest palette color, no dithering.
///
/// `out` holds the previous palettized frame when `have_last` is true;
/// pixels whose color it already matches are emitted as transparency so
/// the decoder keeps what it has.  On return `out` holds this frame's
/// palettized colors, with the palette index in the alpha byte.
pub(crate) fn threshold_image(
    next: &[u8],
    out: &mut [u8],
    have_last: bool,
    pal: &Palette,
) {
    for (px, old) in next.chunks_exact(4).zip(out.chunks_exact_mut(4)) {
        if have_last
            && old[0] == px[0]
            && old[1] == px[1]
            && old[2] == px[2]
        {
            old[3] = TRANSPARENCY_INDEX as u8;
        } else {
            let mut best_diff = 1_000_000;
            let mut best_ind = 1;
            pal.closest(
                [i32::from(px[0]), i32::from(px[1]), i32::from(px[2])],
                &mut best_ind,
                &mut best_diff,
                1,
            );
            let (r, g, b) = pal.color(best_ind);
            old[0] = r;
            old[1] = g;
            old[2] = b;
            old[3] = best_ind as u8;
        }
    }
}

/// Map pixels with Floyd-Steinberg dithering.
///
/// Accumulators carry each channel scaled by 256; the extra eight bits
/// let fractions of a color step survive diffusion.  A pixel whose wanted
/// color matches the previous frame becomes transparent and diffuses no
/// error.
pub(crate) fn dither_image(
    next: &[u8],
    out: &mut [u8],
    have_last: bool,
    width: usize,
    height: usize,
    pal: &Palette,
) {
    let mut quant: Vec<i32> =
        next.iter().map(|&c| i32::from(c) * 256).collect();
    for y in 0..height {
        for x in 0..width {
            let base = 4 * (y * width + x);
            // the color we want, rounded to nearest
            let rr = (quant[base] + 127) / 256;
            let gg = (quant[base + 1] + 127) / 256;
            let bb = (quant[base + 2] + 127) / 256;
            if have_last
                && i32::from(out[base]) == rr
                && i32::from(out[base + 1]) == gg
                && i32::from(out[base + 2]) == bb
            {
                quant[base] = rr;
                quant[base + 1] = gg;
                quant[base + 2] = bb;
                quant[base + 3] = TRANSPARENCY_INDEX as i32;
                continue;
            }
            let mut best_diff = 1_000_000;
            let mut best_ind = TRANSPARENCY_INDEX;
            pal.closest([rr, gg, bb], &mut best_ind, &mut best_diff, 1);
            let (pr, pg, pb) = pal.color(best_ind);
            let r_err = quant[base] - i32::from(pr) * 256;
            let g_err = quant[base + 1] - i32::from(pg) * 256;
            let b_err = quant[base + 2] - i32::from(pb) * 256;
            quant[base] = i32::from(pr);
            quant[base + 1] = i32::from(pg);
            quant[base + 2] = i32::from(pb);
            quant[base + 3] = best_ind as i32;
            // propagate the error to the neighbors not yet visited
            if x + 1 < width {
                diffuse(&mut quant, base + 4, r_err, g_err, b_err, 7);
            }
            if y + 1 < height {
                let south = 4 * ((y + 1) * width + x);
                if x > 0 {
                    diffuse(&mut quant, south - 4, r_err, g_err, b_err, 3);
                }
                diffuse(&mut quant, south, r_err, g_err, b_err, 5);
                if x + 1 < width {
                    diffuse(&mut quant, south + 4, r_err, g_err, b_err, 1);
                }
            }
        }
    }
    // the low bytes now hold the palettized frame
    for (q, o) in quant.iter().zip(out.iter_mut()) {
        *o = *q as u8;
    }
}

/// Add one weighted share of quantization error, clamped so the
/// accumulator never goes negative; dark pixels would otherwise drive
/// neighbors below zero where later diffusion fights itself.
fn diffuse(
    quant: &mut [i32],
    base: usize,
    r_err: i32,
    g_err: i32,
    b_err: i32,
    weight: i32,
) {
    quant[base] += (-quant[base]).max(r_err * weight / 16);
    quant[base + 1] += (-quant[base + 1]).max(g_err * weight / 16);
    quant[base + 2] += (-quant[base + 2]).max(b_err * weight / 16);
    debug_assert!(
        quant[base] >= 0 && quant[base + 1] >= 0 && quant[base + 2] >= 0
    );
}

#[cfg(test)]
mod test {
    use super::*;

    fn solid_frame(r: u8, g: u8, b: u8) -> Vec<u8> {
        let mut frame = Vec::with_capacity(16);
        for _ in 0..4 {
            frame.extend_from_slice(&[r, g, b, 255]);
        }
        frame
    }

    fn gradient_frame() -> Vec<u8> {
        let mut frame = Vec::with_capacity(8 * 8 * 4);
        for y in 0..8u16 {
            for x in 0..8u16 {
                frame.extend_from_slice(&[
                    (x * 32) as u8,
                    (y * 32) as u8,
                    0,
                    255,
                ]);
            }
        }
        frame
    }

    #[test]
    fn threshold_palettizes_first_frame() {
        let frame = solid_frame(255, 0, 0);
        let pal = Palette::build(None, &frame, 8, false);
        let mut out = vec![0; frame.len()];
        threshold_image(&frame, &mut out, false, &pal);
        let ind = out[3];
        assert_ne!(ind, TRANSPARENCY_INDEX as u8);
        for px in out.chunks_exact(4) {
            assert_eq!((px[0], px[1], px[2], px[3]), (255, 0, 0, ind));
        }
    }

    #[test]
    fn threshold_marks_unchanged_transparent() {
        let frame = solid_frame(255, 0, 0);
        let pal = Palette::build(None, &frame, 8, false);
        let mut out = vec![0; frame.len()];
        threshold_image(&frame, &mut out, false, &pal);
        // second identical frame builds its palette from an empty delta
        let pal = Palette::build(Some(&out), &frame, 8, false);
        threshold_image(&frame, &mut out, true, &pal);
        for px in out.chunks_exact(4) {
            assert_eq!(px[3], TRANSPARENCY_INDEX as u8);
            // the decoder keeps the previous color
            assert_eq!((px[0], px[1], px[2]), (255, 0, 0));
        }
    }

    #[test]
    fn dither_transparent_on_exact_match() {
        let frame = gradient_frame();
        // 64 distinct colors at full depth palettize exactly
        let pal = Palette::build(None, &frame, 8, true);
        let mut out = vec![0; frame.len()];
        dither_image(&frame, &mut out, false, 8, 8, &pal);
        for (px, o) in frame.chunks_exact(4).zip(out.chunks_exact(4)) {
            assert_eq!((px[0], px[1], px[2]), (o[0], o[1], o[2]));
            assert_ne!(o[3], TRANSPARENCY_INDEX as u8);
        }
        // the unchanged frame dithered again is all transparency
        let pal = Palette::build(None, &frame, 8, true);
        dither_image(&frame, &mut out, true, 8, 8, &pal);
        for (px, o) in frame.chunks_exact(4).zip(out.chunks_exact(4)) {
            assert_eq!(o[3], TRANSPARENCY_INDEX as u8);
            assert_eq!((px[0], px[1], px[2]), (o[0], o[1], o[2]));
        }
    }

    #[test]
    fn dither_bounds_gradient_error() {
        let frame = gradient_frame();
        let pal = Palette::build(None, &frame, 4, true);
        let mut out = vec![0; frame.len()];
        dither_image(&frame, &mut out, false, 8, 8, &pal);
        let mut total = 0i32;
        for (px, o) in frame.chunks_exact(4).zip(out.chunks_exact(4)) {
            assert_ne!(o[3], TRANSPARENCY_INDEX as u8);
            total += (i32::from(px[0]) - i32::from(o[0])).abs()
                + (i32::from(px[1]) - i32::from(o[1])).abs()
                + (i32::from(px[2]) - i32::from(o[2])).abs();
        }
        let mean_per_channel = total / (64 * 3);
        assert!(mean_per_channel < 40, "mean error {}", mean_per_channel);
    }

    #[test]
    fn dither_survives_hard_edges() {
        // alternating black and white exercises the negative clamp; the
        // debug assertion in diffuse checks accumulators stay positive
        let mut frame = Vec::with_capacity(8 * 8 * 4);
        for i in 0..64 {
            let v = if i % 2 == 0 { 0 } else { 255 };
            frame.extend_from_slice(&[v, v, v, 255]);
        }
        let pal = Palette::build(None, &frame, 2, true);
        let mut out = vec![0; frame.len()];
        dither_image(&frame, &mut out, false, 8, 8, &pal);
        for o in out.chunks_exact(4) {
            assert_ne!(o[3], TRANSPARENCY_INDEX as u8);
        }
    }
}
