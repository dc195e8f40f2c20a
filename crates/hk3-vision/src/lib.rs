pub mod anchors;
pub mod annotate;
pub mod matcher;
pub mod ocr;
pub mod roi;
pub mod templates;

pub use anchors::{AnchorDetector, AnchorTemplate, DEFAULT_SCALES};
pub use annotate::draw_bbox;
pub use matcher::{match_template, MatchResult};
pub use ocr::TextReader;
pub use roi::{resolve_anchored, resolve_relative, AnchoredRoi, Corner, RelativeRoi, Roi};
pub use templates::TemplateStore;

pub use hk3_capture::{BoundingBox, Frame};
