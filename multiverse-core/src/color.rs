// src/color.rs

//! Opinion colors labelling conflicting payloads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Label of a conflicting transaction, or `Undefined` for uncolored payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    /// No opinion / uncolored payload
    Undefined,
    /// The red branch
    Red,
    /// The green branch
    Green,
    /// The blue branch
    Blue,
}

impl Color {
    /// The three colors that can actually conflict
    pub const CONFLICT_COLORS: [Color; 3] = [Color::Red, Color::Green, Color::Blue];

    /// Maps an index to a conflict color (0 maps to `Undefined`)
    pub fn from_index(index: usize) -> Self {
        match index {
            1 => Color::Red,
            2 => Color::Green,
            3 => Color::Blue,
            _ => Color::Undefined,
        }
    }

    /// Rank in the fixed tie-break order: Red > Green > Blue > Undefined
    pub fn rank(&self) -> u8 {
        match self {
            Color::Red => 3,
            Color::Green => 2,
            Color::Blue => 1,
            Color::Undefined => 0,
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::Undefined
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Color::Undefined => "Undefined",
            Color::Red => "Red",
            Color::Green => "Green",
            Color::Blue => "Blue",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "R" | "Red" => Ok(Color::Red),
            "G" | "Green" => Ok(Color::Green),
            "B" | "Blue" => Ok(Color::Blue),
            "U" | "Undefined" => Ok(Color::Undefined),
            other => Err(format!("unknown color: {}", other)),
        }
    }
}
