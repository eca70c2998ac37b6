use std::fmt;

/// A spectral band of the multispectral orthophoto.
///
/// Bands are listed in orthophoto order: `Blue` is raster band 1 and
/// placeholder `A`, `RedEdge` is raster band 5 and placeholder `E`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Band {
    Blue,
    Green,
    Red,
    Nir,
    RedEdge,
}

impl Band {
    pub const ALL: [Band; 5] = [Band::Blue, Band::Green, Band::Red, Band::Nir, Band::RedEdge];

    /// Identifier used for this band in formulas.
    pub fn name(self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::Green => "green",
            Self::Red => "red",
            Self::Nir => "nir",
            Self::RedEdge => "rdedge",
        }
    }

    /// Placeholder symbol standing for this band in compiled expressions.
    pub fn slot(self) -> char {
        match self {
            Self::Blue => 'A',
            Self::Green => 'B',
            Self::Red => 'C',
            Self::Nir => 'D',
            Self::RedEdge => 'E',
        }
    }

    /// Zero-based position, also the index into evaluation bindings.
    pub fn index(self) -> usize {
        self as usize
    }

    /// One-based raster band number inside the orthophoto.
    pub fn raster_band(self) -> usize {
        self.index() + 1
    }

    /// Exact, case-sensitive identifier lookup.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|band| band.name() == name)
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
