//! Bitmap drawing primitives.
//!
//! All primitives operate on the VGC's 320x200 one-byte-per-pixel bitmap.
//! Lines and circles are Bresenham/midpoint; flood fill runs a scanline
//! algorithm over an explicit stack so deep fills cannot recurse out of
//! stack.

/// Bitmap width in pixels.
pub const GFX_WIDTH: u32 = 320;
/// Bitmap height in pixels.
pub const GFX_HEIGHT: u32 = 200;
/// Bitmap size in bytes.
pub const GFX_BYTES: usize = (GFX_WIDTH * GFX_HEIGHT) as usize;

/// Set one pixel. Out-of-range coordinates are ignored.
pub fn plot(gfx: &mut [u8], x: i32, y: i32, colour: u8) {
    if (0..GFX_WIDTH as i32).contains(&x) && (0..GFX_HEIGHT as i32).contains(&y) {
        gfx[(y as u32 * GFX_WIDTH + x as u32) as usize] = colour;
    }
}

/// Read one pixel, 0 outside the bitmap.
#[must_use]
pub fn pixel(gfx: &[u8], x: i32, y: i32) -> u8 {
    if (0..GFX_WIDTH as i32).contains(&x) && (0..GFX_HEIGHT as i32).contains(&y) {
        gfx[(y as u32 * GFX_WIDTH + x as u32) as usize]
    } else {
        0
    }
}

/// Bresenham line.
pub fn line(gfx: &mut [u8], x0: i32, y0: i32, x1: i32, y1: i32, colour: u8) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);

    loop {
        plot(gfx, x, y, colour);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Midpoint circle outline.
pub fn circle(gfx: &mut [u8], cx: i32, cy: i32, radius: i32, colour: u8) {
    if radius < 0 {
        return;
    }
    let mut x = radius;
    let mut y = 0;
    let mut err = 1 - radius;

    while x >= y {
        plot(gfx, cx + x, cy + y, colour);
        plot(gfx, cx + y, cy + x, colour);
        plot(gfx, cx - y, cy + x, colour);
        plot(gfx, cx - x, cy + y, colour);
        plot(gfx, cx - x, cy - y, colour);
        plot(gfx, cx - y, cy - x, colour);
        plot(gfx, cx + y, cy - x, colour);
        plot(gfx, cx + x, cy - y, colour);
        y += 1;
        if err < 0 {
            err += 2 * y + 1;
        } else {
            x -= 1;
            err += 2 * (y - x) + 1;
        }
    }
}

/// Rectangle outline.
pub fn rect(gfx: &mut [u8], x0: i32, y0: i32, x1: i32, y1: i32, colour: u8) {
    line(gfx, x0, y0, x1, y0, colour);
    line(gfx, x0, y1, x1, y1, colour);
    line(gfx, x0, y0, x0, y1, colour);
    line(gfx, x1, y0, x1, y1, colour);
}

/// Filled rectangle.
pub fn fill_rect(gfx: &mut [u8], x0: i32, y0: i32, x1: i32, y1: i32, colour: u8) {
    let (x0, x1) = (x0.min(x1), x0.max(x1));
    let (y0, y1) = (y0.min(y1), y0.max(y1));
    for y in y0..=y1 {
        for x in x0..=x1 {
            plot(gfx, x, y, colour);
        }
    }
}

/// Scanline flood fill from a seed point, with an explicit stack.
pub fn flood_fill(gfx: &mut [u8], x: i32, y: i32, colour: u8) {
    let target = pixel(gfx, x, y);
    if target == colour
        || !(0..GFX_WIDTH as i32).contains(&x)
        || !(0..GFX_HEIGHT as i32).contains(&y)
    {
        return;
    }

    let mut stack = vec![(x, y)];
    while let Some((sx, sy)) = stack.pop() {
        if pixel(gfx, sx, sy) != target {
            continue;
        }

        // Walk to the left edge of this span
        let mut left = sx;
        while left > 0 && pixel(gfx, left - 1, sy) == target {
            left -= 1;
        }

        // Fill rightward, seeding the rows above and below on colour edges
        let mut span_above = false;
        let mut span_below = false;
        let mut cx = left;
        while cx < GFX_WIDTH as i32 && pixel(gfx, cx, sy) == target {
            plot(gfx, cx, sy, colour);

            let above = sy > 0 && pixel(gfx, cx, sy - 1) == target;
            if above && !span_above {
                stack.push((cx, sy - 1));
            }
            span_above = above;

            let below = sy < GFX_HEIGHT as i32 - 1 && pixel(gfx, cx, sy + 1) == target;
            if below && !span_below {
                stack.push((cx, sy + 1));
            }
            span_below = below;

            cx += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap() -> Vec<u8> {
        vec![0u8; GFX_BYTES]
    }

    #[test]
    fn plot_and_read_back() {
        let mut gfx = bitmap();
        plot(&mut gfx, 10, 20, 7);
        assert_eq!(pixel(&gfx, 10, 20), 7);
        // Out-of-range writes are dropped
        plot(&mut gfx, -1, 0, 7);
        plot(&mut gfx, 320, 0, 7);
        plot(&mut gfx, 0, 200, 7);
    }

    #[test]
    fn horizontal_line_is_contiguous() {
        let mut gfx = bitmap();
        line(&mut gfx, 5, 10, 15, 10, 3);
        for x in 5..=15 {
            assert_eq!(pixel(&gfx, x, 10), 3);
        }
        assert_eq!(pixel(&gfx, 4, 10), 0);
        assert_eq!(pixel(&gfx, 16, 10), 0);
    }

    #[test]
    fn diagonal_line_hits_endpoints() {
        let mut gfx = bitmap();
        line(&mut gfx, 0, 0, 12, 7, 1);
        assert_eq!(pixel(&gfx, 0, 0), 1);
        assert_eq!(pixel(&gfx, 12, 7), 1);
    }

    #[test]
    fn circle_has_cardinal_points() {
        let mut gfx = bitmap();
        circle(&mut gfx, 100, 100, 20, 5);
        assert_eq!(pixel(&gfx, 120, 100), 5);
        assert_eq!(pixel(&gfx, 80, 100), 5);
        assert_eq!(pixel(&gfx, 100, 120), 5);
        assert_eq!(pixel(&gfx, 100, 80), 5);
        assert_eq!(pixel(&gfx, 100, 100), 0, "interior untouched");
    }

    #[test]
    fn fill_rect_covers_inclusive_bounds() {
        let mut gfx = bitmap();
        fill_rect(&mut gfx, 8, 4, 3, 2, 9); // reversed corners
        for y in 2..=4 {
            for x in 3..=8 {
                assert_eq!(pixel(&gfx, x, y), 9);
            }
        }
        assert_eq!(pixel(&gfx, 2, 2), 0);
    }

    #[test]
    fn flood_fill_respects_boundary() {
        let mut gfx = bitmap();
        rect(&mut gfx, 10, 10, 30, 30, 1);
        flood_fill(&mut gfx, 20, 20, 2);
        assert_eq!(pixel(&gfx, 20, 20), 2);
        assert_eq!(pixel(&gfx, 11, 11), 2);
        assert_eq!(pixel(&gfx, 10, 10), 1, "border keeps its colour");
        assert_eq!(pixel(&gfx, 9, 20), 0, "outside untouched");
    }

    #[test]
    fn flood_fill_noop_on_same_colour() {
        let mut gfx = bitmap();
        flood_fill(&mut gfx, 0, 0, 0);
        assert!(gfx.iter().all(|&p| p == 0));
    }
}
