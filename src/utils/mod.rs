pub mod path;

pub use path::{fold_roots, fold_sources, normalize_source, SourceRoot};
