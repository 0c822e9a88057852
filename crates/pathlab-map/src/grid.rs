use std::fmt::Display;
use std::str::FromStr;

use crate::{MapError, Zone};

/// A rectangular grid of zones, as consumed by the pathfinding program.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ZoneMap {
    pub height: usize,
    pub width: usize,
    pub cells: Vec<Vec<Zone>>,
}

impl ZoneMap {
    pub fn new(height: usize, width: usize, fill: Zone) -> Self {
        Self {
            height,
            width,
            cells: vec![vec![fill; width]; height],
        }
    }

    pub fn get(&self, row: usize, col: usize) -> Option<Zone> {
        self.cells.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Returns a copy surrounded by a one cell ring of cliffs.
    pub fn with_cliff_border(&self) -> Self {
        let mut bordered = ZoneMap::new(self.height + 2, self.width + 2, Zone::Cliff);
        for (row, cells) in self.cells.iter().enumerate() {
            bordered.cells[row + 1][1..=self.width].copy_from_slice(cells);
        }
        bordered
    }

    /// The header line, `"<height> <width>"`.
    pub fn header(&self) -> String {
        format!("{} {}", self.height, self.width)
    }
}

impl Display for ZoneMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.header())?;
        for row in &self.cells {
            for cell in row {
                write!(f, "{}", cell)?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

impl FromStr for ZoneMap {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lines = s.lines();
        let header = lines.next().unwrap_or_default();
        let (height, width) = parse_header(header)?;

        let mut cells = Vec::with_capacity(height);
        for (row, line) in lines.enumerate() {
            if row >= height {
                return Err(MapError::RowCount {
                    expected: height,
                    found: row + 1,
                });
            }
            let zones = line
                .chars()
                .map(Zone::from_code)
                .collect::<Result<Vec<_>, _>>()?;
            if zones.len() != width {
                return Err(MapError::RowWidth {
                    row,
                    expected: width,
                    found: zones.len(),
                });
            }
            cells.push(zones);
        }
        if cells.len() != height {
            return Err(MapError::RowCount {
                expected: height,
                found: cells.len(),
            });
        }

        Ok(ZoneMap {
            height,
            width,
            cells,
        })
    }
}

fn parse_header(line: &str) -> Result<(usize, usize), MapError> {
    let mut parts = line.split_whitespace();
    let mut next_dim = || {
        parts
            .next()
            .and_then(|p| p.parse::<usize>().ok())
            .ok_or_else(|| MapError::Header(line.to_string()))
    };
    let height = next_dim()?;
    let width = next_dim()?;
    if parts.next().is_some() {
        return Err(MapError::Header(line.to_string()));
    }
    Ok((height, width))
}
