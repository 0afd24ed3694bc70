use crate::core::array2d::Array2DRef;
use crate::core::error::{ErrorContext, Res};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfaColor {
    Red,
    Green,
    Blue,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BayerPhase {
    Rggb,
    Grbg,
    Gbrg,
    Bggr,
}

impl BayerPhase {
    pub const ALL: [BayerPhase; 4] = [
        BayerPhase::Rggb,
        BayerPhase::Grbg,
        BayerPhase::Gbrg,
        BayerPhase::Bggr,
    ];

    pub fn colors(self) -> [CfaColor; 4] {
        use CfaColor::*;
        match self {
            BayerPhase::Rggb => [Red, Green, Green, Blue],
            BayerPhase::Grbg => [Green, Red, Blue, Green],
            BayerPhase::Gbrg => [Green, Blue, Red, Green],
            BayerPhase::Bggr => [Blue, Green, Green, Red],
        }
    }
}

/// X-Trans layout at phase (0, 0), row by row.
pub const XTRANS_BASE: [[CfaColor; 6]; 6] = {
    use CfaColor::{Blue as B, Green as G, Red as R};
    [
        [G, G, R, G, G, B],
        [G, G, B, G, G, R],
        [B, R, G, R, B, G],
        [G, G, B, G, G, R],
        [G, G, R, G, G, B],
        [R, B, G, B, R, G],
    ]
};

/// Repeating color filter pattern, `width` x `height` cells in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorFilterArray {
    width: usize,
    height: usize,
    cells: Vec<CfaColor>,
}

impl ErrorContext for ColorFilterArray {
    fn describe(&self) -> Option<String> {
        Some(format!("CFA {}x{}", self.width, self.height))
    }
}

impl ColorFilterArray {
    pub fn new(width: usize, height: usize, cells: Vec<CfaColor>) -> Res<Self> {
        let cfa = Self {
            width,
            height,
            cells,
        };
        if width == 0 || height == 0 || cfa.cells.len() != width * height {
            cfa.invalid(format!("{} cells for a {}x{} CFA", cfa.cells.len(), width, height))?
        }
        Ok(cfa)
    }

    pub fn bayer(phase: BayerPhase) -> Self {
        Self {
            width: 2,
            height: 2,
            cells: phase.colors().to_vec(),
        }
    }

    /// The X-Trans pattern shifted right by `x` and down by `y` cells.
    pub fn xtrans(x: usize, y: usize) -> Self {
        let mut cells = Vec::with_capacity(36);
        for row in 0..6 {
            for col in 0..6 {
                cells.push(XTRANS_BASE[(row + y) % 6][(col + x) % 6]);
            }
        }
        Self {
            width: 6,
            height: 6,
            cells,
        }
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Color at an image position, the pattern repeats in both directions.
    pub fn color_at(&self, row: usize, col: usize) -> CfaColor {
        self.cells[(row % self.height) * self.width + col % self.width]
    }

    pub fn bayer_phase(&self) -> Option<BayerPhase> {
        BayerPhase::ALL
            .into_iter()
            .find(|p| self.size() == (2, 2) && self.cells == p.colors())
    }

    pub fn xtrans_phase(&self) -> Option<(usize, usize)> {
        if self.size() != (6, 6) {
            return None;
        }
        (0..6)
            .flat_map(|y| (0..6).map(move |x| (x, y)))
            .find(|&(x, y)| self.cells == Self::xtrans(x, y).cells)
    }
}

/// Destination of a decompressor: the uncropped sample plane plus the
/// pixel format it holds.
#[derive(Debug)]
pub struct RawImage<'a> {
    pub data: Array2DRef<'a, u16>,
    cpp: usize,
    cfa: Option<ColorFilterArray>,
}

impl ErrorContext for RawImage<'_> {
    fn describe(&self) -> Option<String> {
        let (w, h) = self.dim();
        Some(format!("RawImage {}x{}, cpp {}", w, h, self.cpp))
    }
}

impl<'a> RawImage<'a> {
    pub fn new(data: Array2DRef<'a, u16>, cpp: usize) -> Res<Self> {
        let img = Self {
            data,
            cpp,
            cfa: None,
        };
        if cpp == 0 || img.data.width() % cpp != 0 {
            img.invalid(format!(
                "{} samples per row do not hold {} components per pixel",
                img.data.width(),
                cpp
            ))?
        }
        Ok(img)
    }

    pub fn with_cfa(mut self, cfa: ColorFilterArray) -> Self {
        self.cfa = Some(cfa);
        self
    }

    pub fn cpp(&self) -> usize {
        self.cpp
    }

    /// Dimensions in pixels.
    pub fn dim(&self) -> (usize, usize) {
        (self.data.width() / self.cpp.max(1), self.data.height())
    }

    pub fn cfa(&self) -> Option<&ColorFilterArray> {
        self.cfa.as_ref()
    }

    pub fn is_cfa(&self) -> bool {
        self.cfa.is_some()
    }
}
