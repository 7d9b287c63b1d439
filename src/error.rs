use std::error;
use std::fmt;
use crate::index_space::IndexSpace;
use crate::point::Point;




/**
 * Error to represent invalid grid configuration, or a message which could
 * not be decoded.
 */
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    InvalidPatchSize(Point),
    NotCoarsenable(IndexSpace, Point),
    RegionOutsideDomain(IndexSpace, IndexSpace),
    LevelCountMismatch { ratios: usize, levels: usize },
    EmptyLevel(usize),
    NotNested(usize, IndexSpace),
    DuplicatePatch(usize),
    Decode(String),
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        use Error::*;

        match self {
            InvalidPatchSize(size) => write!(fmt, "invalid patch size: {}", size),
            NotCoarsenable(space, ratio) => write!(fmt, "index space {} is not coarsenable by {}", space, ratio),
            RegionOutsideDomain(region, domain) => write!(fmt, "region {} lies outside the domain {}", region, domain),
            LevelCountMismatch { ratios, levels } => write!(
                fmt,
                "{} refinement ratios given for {} refined levels",
                ratios, levels),
            EmptyLevel(level) => write!(fmt, "level {} has no patches", level),
            DuplicatePatch(level) => write!(fmt, "level {} lists the same patch more than once", level),
            NotNested(level, region) => write!(fmt, "level {} is not nested: {} is not covered by the coarser level", level, region),
            Decode(msg) => write!(fmt, "failed to decode message: {}", msg),
        }
    }
}

impl error::Error for Error {}
