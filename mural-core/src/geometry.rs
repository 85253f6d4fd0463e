//! Spatial rules for areas.
//!
//! Membership is decided by geometry: a card belongs to an area when its
//! position lies inside the area bounds (edges inclusive) on the same board.
//! `Area::card_ids` is only a cache of this.

use crate::model::{Area, Bounds, Card, Point};

pub const AREA_PADDING: f64 = 20.0;
pub const AREA_LABEL_GAP: f64 = 40.0;
pub const GRID_SPACING: f64 = 10.0;
/// Nominal card footprint used when sizing a new area around cards.
pub const FOOTPRINT_WIDTH: f64 = 240.0;
pub const FOOTPRINT_HEIGHT: f64 = 120.0;
/// Grid cell used when organizing an area.
pub const CELL_WIDTH: f64 = 150.0;
pub const CELL_HEIGHT: f64 = 100.0;

pub fn area_contains(area: &Area, card: &Card) -> bool {
    area.board == card.board && area.bounds.contains(card.position)
}

/// Cards inside the area, in the order given.
pub fn cards_in_area<'a>(area: &Area, cards: &'a [Card]) -> Vec<&'a Card> {
    cards.iter().filter(|c| area_contains(area, c)).collect()
}

/// Bounds enclosing the given cards, padded for a new area.
///
/// Returns `None` for an empty slice.
pub fn enclosing_bounds<'a, I>(cards: I) -> Option<Bounds>
where
    I: IntoIterator<Item = &'a Card>,
{
    let mut iter = cards.into_iter();
    let first = iter.next()?.position;
    let (mut min, mut max) = (first, first);
    for card in iter {
        min.x = min.x.min(card.position.x);
        min.y = min.y.min(card.position.y);
        max.x = max.x.max(card.position.x);
        max.y = max.y.max(card.position.y);
    }

    Some(Bounds {
        x: min.x - AREA_PADDING,
        y: min.y - AREA_PADDING,
        width: max.x - min.x + FOOTPRINT_WIDTH + AREA_PADDING * 2.0,
        height: max.y - min.y + FOOTPRINT_HEIGHT + AREA_PADDING * 2.0,
    })
}

/// Number of grid columns that fit inside `bounds`, at least one.
pub fn grid_columns(bounds: &Bounds) -> usize {
    let usable = bounds.width - AREA_PADDING * 2.0;
    let cols = (usable / (CELL_WIDTH + GRID_SPACING)).floor();
    if cols.is_finite() && cols >= 1.0 {
        cols as usize
    } else {
        1
    }
}

/// Position of the `index`-th card when laying out an area as a grid.
pub fn grid_slot(bounds: &Bounds, index: usize) -> Point {
    let cols = grid_columns(bounds);
    let row = index / cols;
    let col = index % cols;
    Point {
        x: bounds.x + AREA_PADDING + col as f64 * (CELL_WIDTH + GRID_SPACING),
        y: bounds.y + AREA_LABEL_GAP + row as f64 * (CELL_HEIGHT + GRID_SPACING),
    }
}
