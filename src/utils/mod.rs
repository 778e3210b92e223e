pub mod homography;
pub mod header;
pub mod scratch;

pub use homography::{HomographyMatrix, SimilarityApprox};
pub use header::{read_dimensions, validate_dimensions};
pub use scratch::{unique_scratch_path, ScratchFile};
