pub mod catalog;
pub mod locator;
pub mod reader;

pub use catalog::{Catalog, Element, ElementTemplate, DEFAULT_CONFIDENCE};
pub use locator::{best_match, locate, locate_in, Match};
pub use reader::{DigitRecognizer, GlyphRecognizer, NumericReader};
