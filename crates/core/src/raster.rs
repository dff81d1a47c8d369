//! Row/column partitioning of a rectangle into addressable cells.
//!
//! Cell size is floor division of the area by the raster dimensions; the
//! remainder pixels on the right and bottom edges belong to no cell.

use crate::error::{Error, Result};
use crate::geometry::Rect;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Raster {
    rows: Option<u32>,
    cols: Option<u32>,
}

impl Raster {
    pub fn new(rows: u32, cols: u32) -> Result<Self> {
        let mut raster = Raster::default();
        raster.set_rows(rows)?;
        raster.set_cols(cols)?;
        Ok(raster)
    }

    pub fn set_rows(&mut self, rows: u32) -> Result<()> {
        if rows == 0 {
            return Err(Error::InvalidSetting("raster rows must be positive".into()));
        }
        self.rows = Some(rows);
        Ok(())
    }

    pub fn set_cols(&mut self, cols: u32) -> Result<()> {
        if cols == 0 {
            return Err(Error::InvalidSetting("raster cols must be positive".into()));
        }
        self.cols = Some(cols);
        Ok(())
    }

    /// Configured row count, 0 when unset.
    pub fn rows(&self) -> u32 {
        self.rows.unwrap_or(0)
    }

    pub fn cols(&self) -> u32 {
        self.cols.unwrap_or(0)
    }

    /// Both dimensions configured.
    pub fn is_valid(&self) -> bool {
        self.rows.is_some() && self.cols.is_some()
    }

    pub fn row_h(&self, area: &Rect) -> i32 {
        self.rows.map_or(0, |rows| area.h / rows as i32)
    }

    pub fn col_w(&self, area: &Rect) -> i32 {
        self.cols.map_or(0, |cols| area.w / cols as i32)
    }

    pub fn row(&self, area: &Rect, row: u32) -> Result<Rect> {
        let rows = self
            .rows
            .ok_or_else(|| Error::Range("raster has no rows configured".into()))?;
        check_index("row", row, rows)?;
        let rh = self.row_h(area);
        Ok(Rect::new(area.x, area.y + row as i32 * rh, area.w, rh))
    }

    pub fn col(&self, area: &Rect, col: u32) -> Result<Rect> {
        let cols = self
            .cols
            .ok_or_else(|| Error::Range("raster has no columns configured".into()))?;
        check_index("column", col, cols)?;
        let cw = self.col_w(area);
        Ok(Rect::new(area.x + col as i32 * cw, area.y, cw, area.h))
    }

    pub fn cell(&self, area: &Rect, row: u32, col: u32) -> Result<Rect> {
        let row_rect = self.row(area, row)?;
        let col_rect = self.col(area, col)?;
        Ok(Rect::new(col_rect.x, row_rect.y, col_rect.w, row_rect.h))
    }
}

fn check_index(what: &str, index: u32, count: u32) -> Result<()> {
    if index >= count {
        return Err(Error::Range(format!(
            "raster {} {} outside 0..{}",
            what, index, count
        )));
    }
    Ok(())
}

/// A named or coded sub-area of a region, see [`crate::Region::get`].
///
/// Grid codes are three digits `RRC`: raster size, row, column. A row or
/// column equal to the raster size selects the whole column or row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionPart {
    Grid { raster: u32, row: u32, col: u32 },
    /// Half the width, vertically full, horizontally centred.
    MidVertical,
    /// Half the height, horizontally full, vertically centred.
    MidHorizontal,
    /// Half width and half height, centred.
    MidBig,
}

impl RegionPart {
    pub const NORTH: RegionPart = RegionPart::Grid { raster: 2, row: 0, col: 2 };
    pub const SOUTH: RegionPart = RegionPart::Grid { raster: 2, row: 1, col: 2 };
    pub const WEST: RegionPart = RegionPart::Grid { raster: 2, row: 2, col: 0 };
    pub const EAST: RegionPart = RegionPart::Grid { raster: 2, row: 2, col: 1 };
    pub const NORTH_WEST: RegionPart = RegionPart::Grid { raster: 2, row: 0, col: 0 };
    pub const NORTH_EAST: RegionPart = RegionPart::Grid { raster: 2, row: 0, col: 1 };
    pub const SOUTH_WEST: RegionPart = RegionPart::Grid { raster: 2, row: 1, col: 0 };
    pub const SOUTH_EAST: RegionPart = RegionPart::Grid { raster: 2, row: 1, col: 1 };
    pub const NORTH_MID: RegionPart = RegionPart::Grid { raster: 3, row: 0, col: 1 };
    pub const SOUTH_MID: RegionPart = RegionPart::Grid { raster: 3, row: 2, col: 1 };
    pub const WEST_MID: RegionPart = RegionPart::Grid { raster: 3, row: 1, col: 0 };
    pub const EAST_MID: RegionPart = RegionPart::Grid { raster: 3, row: 1, col: 2 };
    pub const MID_THIRD: RegionPart = RegionPart::Grid { raster: 3, row: 1, col: 1 };

    pub fn from_code(code: u32) -> Result<Self> {
        if !(200..=999).contains(&code) {
            return Err(Error::Range(format!("region part code {} not in 200..=999", code)));
        }
        let raster = code / 100;
        let row = code / 10 % 10;
        let col = code % 10;
        if row > raster || col > raster {
            return Err(Error::Range(format!(
                "region part code {}: index exceeds raster {}",
                code, raster
            )));
        }
        Ok(RegionPart::Grid { raster, row, col })
    }

    pub fn code(&self) -> Option<u32> {
        match self {
            RegionPart::Grid { raster, row, col } => Some(raster * 100 + row * 10 + col),
            _ => None,
        }
    }

    pub fn area_of(&self, area: &Rect) -> Result<Rect> {
        match *self {
            RegionPart::MidVertical => Ok(Rect::new(area.x + area.w / 4, area.y, area.w / 2, area.h)),
            RegionPart::MidHorizontal => Ok(Rect::new(area.x, area.y + area.h / 4, area.w, area.h / 2)),
            RegionPart::MidBig => Ok(Rect::new(
                area.x + area.w / 4,
                area.y + area.h / 4,
                area.w / 2,
                area.h / 2,
            )),
            RegionPart::Grid { raster, row, col } => {
                let grid = Raster::new(raster, raster)?;
                match (row == raster, col == raster) {
                    (true, true) => Ok(*area),
                    (true, false) => grid.col(area, col),
                    (false, true) => grid.row(area, row),
                    (false, false) => grid.cell(area, row, col),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cells_use_floor_division() {
        let area = Rect::new(0, 0, 100, 100);
        let raster = Raster::new(2, 2).unwrap();
        assert_eq!(raster.cell(&area, 0, 0).unwrap(), Rect::new(0, 0, 50, 50));
        assert_eq!(raster.cell(&area, 1, 1).unwrap(), Rect::new(50, 50, 50, 50));

        let odd = Rect::new(10, 20, 101, 31);
        let raster = Raster::new(3, 2).unwrap();
        assert_eq!(raster.cell(&odd, 2, 1).unwrap(), Rect::new(60, 40, 50, 10));
    }

    #[test]
    fn test_out_of_bounds_is_range_error() {
        let area = Rect::new(0, 0, 100, 100);
        let raster = Raster::new(2, 2).unwrap();
        assert!(matches!(raster.cell(&area, 2, 0), Err(Error::Range(_))));
        assert!(matches!(raster.col(&area, 5), Err(Error::Range(_))));
    }

    #[test]
    fn test_partial_raster() {
        let area = Rect::new(0, 0, 90, 90);
        let mut raster = Raster::default();
        assert!(!raster.is_valid());
        raster.set_rows(3).unwrap();
        assert!(!raster.is_valid());
        assert_eq!(raster.row(&area, 1).unwrap(), Rect::new(0, 30, 90, 30));
        assert!(raster.col(&area, 0).is_err());
        raster.set_cols(3).unwrap();
        assert!(raster.is_valid());
        assert!(raster.set_cols(0).is_err());
    }

    #[test]
    fn test_region_part_codes() {
        let area = Rect::new(0, 0, 100, 100);
        assert_eq!(RegionPart::NORTH.area_of(&area).unwrap(), Rect::new(0, 0, 100, 50));
        assert_eq!(RegionPart::EAST.area_of(&area).unwrap(), Rect::new(50, 0, 50, 100));
        assert_eq!(RegionPart::NORTH_EAST.area_of(&area).unwrap(), Rect::new(50, 0, 50, 50));
        assert_eq!(RegionPart::from_code(522).unwrap().area_of(&area).unwrap(), Rect::new(40, 40, 20, 20));
        assert_eq!(RegionPart::from_code(333).unwrap().area_of(&area).unwrap(), area);
        assert_eq!(RegionPart::MidBig.area_of(&area).unwrap(), Rect::new(25, 25, 50, 50));
        assert_eq!(RegionPart::NORTH.code(), Some(202));
        assert!(RegionPart::from_code(199).is_err());
        assert!(RegionPart::from_code(248).is_err());
    }
}
