//! Renders a grid snapshot as a bordered character map.

use std::io::{self, Write};

use gridlife_core::{Grid, Occupant};

/// Food glyphs ramp across this energy range.
const FOOD_ENERGY_RANGE: i64 = 5000;

/// Letters assigned to organism species by genome hash.
const SPECIES_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn food_glyph(energy: i64) -> char {
    match energy {
        e if e > FOOD_ENERGY_RANGE / 5 * 4 => '⁙',
        e if e > FOOD_ENERGY_RANGE / 5 * 3 => '⁘',
        e if e > FOOD_ENERGY_RANGE / 5 * 2 => '⁖',
        e if e > FOOD_ENERGY_RANGE / 5 => '⁚',
        _ => '·',
    }
}

fn species_glyph(hash: u64) -> char {
    SPECIES_ALPHABET[(hash % SPECIES_ALPHABET.len() as u64) as usize] as char
}

/// Picks the glyph used to draw an occupant.
pub fn occupant_glyph(occupant: &Occupant) -> char {
    match occupant {
        Occupant::Food(food) => food_glyph(gridlife_core::Energetic::energy(food.as_ref())),
        Occupant::Organism(org) => org
            .driver()
            .map_or('?', |driver| species_glyph(driver.hash())),
        Occupant::Null => ' ',
    }
}

/// Renders the world to `out` as a box-drawing bordered map, one line per
/// row.
pub fn draw_world(out: &mut impl Write, grid: &Grid) -> io::Result<()> {
    for line in world_lines(grid) {
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

/// The bordered map as individual lines, for writers that manage their own
/// line endings (the raw-mode terminal loop).
pub fn world_lines(grid: &Grid) -> Vec<String> {
    let mut points = Vec::new();
    let (width, height, _) = grid.locations(&mut points);
    let width = width.max(0) as usize;
    let height = height.max(0) as usize;

    let mut rows = vec![vec![' '; width]; height];
    for point in &points {
        rows[point.y as usize][point.x as usize] = occupant_glyph(&point.value);
    }

    let mut lines = Vec::with_capacity(height + 2);
    let mut top = String::with_capacity(width + 2);
    top.push('┌');
    top.extend(std::iter::repeat('─').take(width));
    top.push('┐');
    lines.push(top);
    for row in rows {
        let mut line = String::with_capacity(width + 2);
        line.push('│');
        line.extend(row);
        line.push('│');
        lines.push(line);
    }
    let mut bottom = String::with_capacity(width + 2);
    bottom.push('└');
    bottom.extend(std::iter::repeat('─').take(width));
    bottom.push('┘');
    lines.push(bottom);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridlife_core::{Energetic, Food, Organism, PutWhen};
    use std::sync::Arc;

    #[test]
    fn empty_world_is_a_bordered_box() {
        let grid = Grid::new(3, 2);
        let lines = world_lines(&grid);
        assert_eq!(lines, vec!["┌───┐", "│   │", "│   │", "└───┘"]);
    }

    #[test]
    fn occupants_are_drawn_at_their_cells() {
        let grid = Grid::new(3, 2);
        grid.put(1, 0, Occupant::Food(Food::new(100)), PutWhen::Always);
        let lines = world_lines(&grid);
        assert_eq!(lines[1], "│ · │");
    }

    #[test]
    fn food_glyph_scales_with_energy() {
        assert_eq!(food_glyph(100), '·');
        assert_eq!(food_glyph(1500), '⁚');
        assert_eq!(food_glyph(2500), '⁖');
        assert_eq!(food_glyph(3500), '⁘');
        assert_eq!(food_glyph(4500), '⁙');
    }

    #[test]
    fn driverless_organisms_draw_as_unknown() {
        let org = Organism::random();
        org.add(10);
        assert_eq!(occupant_glyph(&Occupant::Organism(org)), '?');
    }

    #[test]
    fn species_glyphs_stay_in_the_alphabet() {
        for hash in [0, 1, 61, 62, u64::MAX] {
            let glyph = species_glyph(hash);
            assert!(glyph.is_ascii_alphanumeric());
        }
    }

    #[test]
    fn draw_world_terminates_lines() {
        let grid = Grid::new(2, 2);
        let mut buffer = Vec::new();
        draw_world(&mut buffer, &grid).expect("draw");
        let text = String::from_utf8(buffer).expect("utf8");
        assert_eq!(text.lines().count(), 4);
    }
}
