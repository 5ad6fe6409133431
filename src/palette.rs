// palette.rs
//
// Copyright (c) 2026  Douglas Lau
//
//! Color quantization over a k-d tree in RGB space
//!
//! Each frame gets its own [Palette], built by recursively partitioning
//! the frame's pixels along the color axis of largest range and averaging
//! the cells at the bottom, the "modified median cut" technique.

/// Palette slot reserved for pixels unchanged since the previous frame
pub(crate) const TRANSPARENCY_INDEX: usize = 0;

/// Color palette for one frame
///
/// Representative colors live at slots `1..=2.pow(bit_depth) - 1`; slot 0
/// is reserved for transparency and stays black.  A split tree over RGB
/// space is stored in heap fashion: the left child of node `i` is node
/// `2 * i`, the right child `2 * i + 1`, and nodes `2.pow(bit_depth)..`
/// are implicitly the leaves holding the colors.  All leaves under a
/// node's left subtree are below its split value on its split axis.
#[derive(Clone)]
pub struct Palette {
    /// Color table depth, 1 to 8 bits
    bit_depth: u8,
    /// Red components
    pub(crate) r: [u8; 256],
    /// Green components
    pub(crate) g: [u8; 256],
    /// Blue components
    pub(crate) b: [u8; 256],
    /// Split axis per tree node (0 red, 1 green, 2 blue)
    pub(crate) tree_split_elt: [u8; 256],
    /// Split threshold per tree node
    pub(crate) tree_split: [u8; 256],
}

impl Palette {
    /// Build a palette from a frame of RGBA8 pixels.
    ///
    /// When `last_frame` is given, only the pixels that changed since
    /// that frame feed the quantizer, concentrating palette capacity on
    /// the delta.  `build_for_dither` pins the darkest color of the frame
    /// to slot 1 and the lightest to the top slot; without them, diffused
    /// error has nowhere to settle and builds up into artifacts.
    pub fn build(
        last_frame: Option<&[u8]>,
        frame: &[u8],
        bit_depth: u8,
        build_for_dither: bool,
    ) -> Self {
        debug_assert!((1..=8).contains(&bit_depth));
        let mut pal = Palette {
            bit_depth,
            r: [0; 256],
            g: [0; 256],
            b: [0; 256],
            tree_split_elt: [0; 256],
            tree_split: [0; 256],
        };
        // the split reorders pixels in place, so work on a copy
        let mut image = frame.to_vec();
        let mut num_pixels = frame.len() / 4;
        if let Some(last) = last_frame {
            num_pixels = pick_changed_pixels(last, &mut image, num_pixels);
            trace!("palette built from {} changed pixels", num_pixels);
        }
        let last_elt = 1 << bit_depth;
        let split_elt = last_elt / 2;
        let split_dist = split_elt / 2;
        pal.split(
            &mut image[..num_pixels * 4],
            1,
            last_elt,
            split_elt,
            split_dist,
            1,
            build_for_dither,
        );
        // neutral decision at the boundary node so the transparency leaf
        // cannot hijack real colors
        pal.tree_split[1 << (bit_depth - 1)] = 0;
        pal.tree_split_elt[1 << (bit_depth - 1)] = 0;
        pal.r[TRANSPARENCY_INDEX] = 0;
        pal.g[TRANSPARENCY_INDEX] = 0;
        pal.b[TRANSPARENCY_INDEX] = 0;
        pal
    }

    /// Split pixels into a balanced tree, assigning colors to the slot
    /// range `first_elt..last_elt`
    fn split(
        &mut self,
        image: &mut [u8],
        first_elt: usize,
        last_elt: usize,
        split_elt: usize,
        split_dist: usize,
        tree_node: usize,
        build_for_dither: bool,
    ) {
        if last_elt <= first_elt || image.is_empty() {
            return;
        }
        let num_pixels = image.len() / 4;
        // base case, bottom of the tree
        if last_elt == first_elt + 1 {
            if build_for_dither {
                if first_elt == 1 {
                    let (r, g, b) = darkest_color(image);
                    self.set_color(first_elt, r, g, b);
                    return;
                }
                if first_elt == (1 << self.bit_depth) - 1 {
                    let (r, g, b) = lightest_color(image);
                    self.set_color(first_elt, r, g, b);
                    return;
                }
            }
            let (r, g, b) = average_color(image);
            self.set_color(first_elt, r, g, b);
            return;
        }
        // split along the axis with the largest range
        let (r_range, g_range, b_range) = color_ranges(image);
        let mut split_com = 1;
        if b_range > g_range {
            split_com = 2;
        }
        if r_range > b_range && r_range > g_range {
            split_com = 0;
        }
        let sub_pixels_a =
            num_pixels * (split_elt - first_elt) / (last_elt - first_elt);
        partition_by_median(image, 0, num_pixels, split_com, sub_pixels_a);
        self.tree_split_elt[tree_node] = split_com as u8;
        self.tree_split[tree_node] = image[sub_pixels_a * 4 + split_com];
        let (head, tail) = image.split_at_mut(sub_pixels_a * 4);
        self.split(
            head,
            first_elt,
            split_elt,
            split_elt - split_dist,
            split_dist / 2,
            tree_node * 2,
            build_for_dither,
        );
        self.split(
            tail,
            split_elt,
            last_elt,
            split_elt + split_dist,
            split_dist / 2,
            tree_node * 2 + 1,
            build_for_dither,
        );
    }

    /// Walk the tree for the palette entry closest to an RGB color.
    ///
    /// `best_ind` and `best_diff` are in/out parameters; they only change
    /// when a leaf under `tree_root` beats the current best.  Distance is
    /// L1, which is cheaper than euclidean and good enough for visual
    /// quantization.  The transparency slot never wins.
    pub fn closest(
        &self,
        rgb: [i32; 3],
        best_ind: &mut usize,
        best_diff: &mut i32,
        tree_root: usize,
    ) {
        let leaves = 1 << self.bit_depth;
        // base case, bottom of the tree
        if tree_root > leaves - 1 {
            let ind = tree_root - leaves;
            if ind == TRANSPARENCY_INDEX {
                return;
            }
            let diff = (rgb[0] - i32::from(self.r[ind])).abs()
                + (rgb[1] - i32::from(self.g[ind])).abs()
                + (rgb[2] - i32::from(self.b[ind])).abs();
            if diff < *best_diff {
                *best_ind = ind;
                *best_diff = diff;
            }
            return;
        }
        let split_comp = rgb[self.tree_split_elt[tree_root] as usize];
        let split_pos = i32::from(self.tree_split[tree_root]);
        if split_pos > split_comp {
            self.closest(rgb, best_ind, best_diff, tree_root * 2);
            if *best_diff > split_pos - split_comp {
                // a closer color may still be in the right subtree
                self.closest(rgb, best_ind, best_diff, tree_root * 2 + 1);
            }
        } else {
            self.closest(rgb, best_ind, best_diff, tree_root * 2 + 1);
            if *best_diff > split_comp - split_pos {
                self.closest(rgb, best_ind, best_diff, tree_root * 2);
            }
        }
    }

    /// Get the palette bit depth
    pub fn bit_depth(&self) -> u8 {
        self.bit_depth
    }

    /// Get the color at a palette slot
    pub fn color(&self, entry: usize) -> (u8, u8, u8) {
        (self.r[entry], self.g[entry], self.b[entry])
    }

    fn set_color(&mut self, entry: usize, r: u8, g: u8, b: u8) {
        self.r[entry] = r;
        self.g[entry] = g;
        self.b[entry] = b;
    }
}

/// Find the darkest color in an image, per channel
fn darkest_color(image: &[u8]) -> (u8, u8, u8) {
    let mut r = 255;
    let mut g = 255;
    let mut b = 255;
    for px in image.chunks_exact(4) {
        r = r.min(px[0]);
        g = g.min(px[1]);
        b = b.min(px[2]);
    }
    (r, g, b)
}

/// Find the lightest color in an image, per channel
fn lightest_color(image: &[u8]) -> (u8, u8, u8) {
    let mut r = 0;
    let mut g = 0;
    let mut b = 0;
    for px in image.chunks_exact(4) {
        r = r.max(px[0]);
        g = g.max(px[1]);
        b = b.max(px[2]);
    }
    (r, g, b)
}

/// Average all colors in an image, rounding to nearest
fn average_color(image: &[u8]) -> (u8, u8, u8) {
    let num_pixels = (image.len() / 4) as u64;
    let mut r = 0;
    let mut g = 0;
    let mut b = 0;
    for px in image.chunks_exact(4) {
        r += u64::from(px[0]);
        g += u64::from(px[1]);
        b += u64::from(px[2]);
    }
    r += num_pixels / 2;
    g += num_pixels / 2;
    b += num_pixels / 2;
    ((r / num_pixels) as u8, (g / num_pixels) as u8, (b / num_pixels) as u8)
}

/// Get the per-channel range across an image
fn color_ranges(image: &[u8]) -> (i32, i32, i32) {
    let mut min = [255u8; 3];
    let mut max = [0u8; 3];
    for px in image.chunks_exact(4) {
        for c in 0..3 {
            min[c] = min[c].min(px[c]);
            max[c] = max[c].max(px[c]);
        }
    }
    (
        i32::from(max[0]) - i32::from(min[0]),
        i32::from(max[1]) - i32::from(min[1]),
        i32::from(max[2]) - i32::from(min[2]),
    )
}

/// Exchange two pixels in place
fn swap_pixels(image: &mut [u8], a: usize, b: usize) {
    for c in 0..4 {
        image.swap(a * 4 + c, b * 4 + c);
    }
}

/// The partition operation from quicksort, over one color axis.
///
/// Pixels equal to the pivot alternate sides so constant regions stay
/// balanced.
fn partition(
    image: &mut [u8],
    left: usize,
    right: usize,
    com: usize,
    pivot_index: usize,
) -> usize {
    let pivot_value = image[pivot_index * 4 + com];
    swap_pixels(image, pivot_index, right - 1);
    let mut store_index = left;
    let mut split = false;
    for i in left..right - 1 {
        let val = image[i * 4 + com];
        if val < pivot_value {
            swap_pixels(image, i, store_index);
            store_index += 1;
        } else if val == pivot_value {
            if split {
                swap_pixels(image, i, store_index);
                store_index += 1;
            }
            split = !split;
        }
    }
    swap_pixels(image, store_index, right - 1);
    store_index
}

/// Incomplete quickselect: order the pixels just enough that everything
/// below `needed_center` is at or below the value there on the chosen
/// axis, and everything above is at or above it
fn partition_by_median(
    image: &mut [u8],
    left: usize,
    right: usize,
    com: usize,
    needed_center: usize,
) {
    if left + 1 < right {
        let pivot_index =
            partition(image, left, right, com, left + (right - left) / 2);
        // only recurse into the side that contains the median
        if pivot_index > needed_center {
            partition_by_median(image, left, pivot_index, com, needed_center);
        }
        if pivot_index < needed_center {
            partition_by_median(image, pivot_index + 1, right, com, needed_center);
        }
    }
}

/// Move the pixels that changed since the last frame to the front of the
/// buffer, returning how many there are
fn pick_changed_pixels(
    last_frame: &[u8],
    frame: &mut [u8],
    num_pixels: usize,
) -> usize {
    let mut num_changed = 0;
    for i in 0..num_pixels {
        let rd = i * 4;
        if last_frame[rd] != frame[rd]
            || last_frame[rd + 1] != frame[rd + 1]
            || last_frame[rd + 2] != frame[rd + 2]
        {
            frame.copy_within(rd..rd + 3, num_changed * 4);
            num_changed += 1;
        }
    }
    num_changed
}

#[cfg(test)]
mod test {
    use super::*;

    /// 2x2 frame of one solid color
    fn solid_frame(r: u8, g: u8, b: u8) -> Vec<u8> {
        let mut frame = Vec::with_capacity(16);
        for _ in 0..4 {
            frame.extend_from_slice(&[r, g, b, 255]);
        }
        frame
    }

    /// 8x8 frame with red and green gradients
    fn gradient_frame() -> Vec<u8> {
        let mut frame = Vec::with_capacity(8 * 8 * 4);
        for y in 0..8u16 {
            for x in 0..8u16 {
                frame.extend_from_slice(&[(x * 32) as u8, (y * 32) as u8, 0, 255]);
            }
        }
        frame
    }

    #[test]
    fn transparency_slot_is_black() {
        let pal = Palette::build(None, &solid_frame(10, 200, 30), 8, false);
        assert_eq!(pal.color(0), (0, 0, 0));
    }

    #[test]
    fn tree_boundary_neutralized() {
        for depth in 1..=8 {
            let pal = Palette::build(None, &gradient_frame(), depth, false);
            let node = 1 << (depth - 1);
            assert_eq!(pal.tree_split[node], 0);
            assert_eq!(pal.tree_split_elt[node], 0);
        }
    }

    #[test]
    fn lookup_skips_transparency() {
        // black pixels are as close to the transparency slot as possible
        let pal = Palette::build(None, &solid_frame(0, 0, 0), 8, false);
        let mut best_ind = TRANSPARENCY_INDEX;
        let mut best_diff = 1_000_000;
        pal.closest([0, 0, 0], &mut best_ind, &mut best_diff, 1);
        assert_ne!(best_ind, TRANSPARENCY_INDEX);
        assert_eq!(best_diff, 0);
    }

    #[test]
    fn lookup_finds_exact_colors() {
        // few distinct colors at full depth: every color gets a slot
        let mut frame = Vec::new();
        for r in [0u8, 85, 170, 255] {
            for b in [0u8, 85, 170, 255] {
                frame.extend_from_slice(&[r, 99, b, 255]);
            }
        }
        let pal = Palette::build(None, &frame, 8, false);
        for r in [0, 85, 170, 255] {
            for b in [0, 85, 170, 255] {
                let mut best_ind = 1;
                let mut best_diff = 1_000_000;
                pal.closest([r, 99, b], &mut best_ind, &mut best_diff, 1);
                assert_eq!(best_diff, 0);
                let (pr, pg, pb) = pal.color(best_ind);
                assert_eq!((i32::from(pr), i32::from(pg), i32::from(pb)), (r, 99, b));
            }
        }
    }

    #[test]
    fn dither_palette_keeps_extremes() {
        let pal = Palette::build(None, &gradient_frame(), 4, true);
        assert_eq!(pal.color(1), (0, 0, 0));
        assert_eq!(pal.color(15), (224, 224, 0));
    }

    #[test]
    fn swap_includes_alpha() {
        let mut image = [1, 2, 3, 4, 5, 6, 7, 8];
        swap_pixels(&mut image, 0, 1);
        assert_eq!(image, [5, 6, 7, 8, 1, 2, 3, 4]);
    }

    #[test]
    fn average_rounds_to_nearest() {
        let image = [0, 0, 0, 255, 1, 3, 255, 255];
        assert_eq!(average_color(&image), (1, 2, 128));
    }

    #[test]
    fn median_partition_orders_axis() {
        let reds = [9u8, 3, 250, 4, 77, 128, 0, 31, 254, 12, 66, 200];
        let mut image = Vec::new();
        for r in reds {
            image.extend_from_slice(&[r, 0, 0, 255]);
        }
        let center = reds.len() / 2;
        partition_by_median(&mut image, 0, reds.len(), 0, center);
        let val = image[center * 4];
        for i in 0..center {
            assert!(image[i * 4] <= val);
        }
        for i in center..reds.len() {
            assert!(image[i * 4] >= val);
        }
    }

    #[test]
    fn changed_pixels_compact_to_front() {
        let last = [9, 9, 9, 255, 1, 2, 3, 255, 4, 5, 6, 255];
        let mut frame = vec![9, 9, 9, 255, 1, 2, 9, 255, 4, 5, 6, 255];
        let n = pick_changed_pixels(&last, &mut frame, 3);
        assert_eq!(n, 1);
        assert_eq!(&frame[..3], &[1, 2, 9]);
        // alpha-only changes do not count
        let mut frame = vec![9, 9, 9, 0, 1, 2, 3, 0, 4, 5, 6, 0];
        assert_eq!(pick_changed_pixels(&last, &mut frame, 3), 0);
    }
}
