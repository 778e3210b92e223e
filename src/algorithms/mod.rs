//! Alignment strategies. Each one is a free function over an engine that
//! either yields a candidate or an error the cascade treats as "no candidate".

pub mod cropped;
pub mod edge;
pub mod feature;
pub mod multiscale;
pub mod phase;
pub mod subimage;

pub use cropped::cropped_region;
pub use edge::edge_based;
pub use feature::{feature_homography, FeatureCandidate, FeatureError, FeatureParams};
pub use multiscale::multi_scale;
pub use phase::correlation_fallback;
pub use subimage::{reference_in_target, target_in_reference};
