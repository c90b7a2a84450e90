pub mod progress;
pub mod record;
pub mod taxonomy;

pub use progress::Progress;
pub use record::{Batch, EMPTY_CONTENT, LabelResult, LabelValue, Record, split};
pub use taxonomy::{FieldKind, LabelField, Taxonomy, TaxonomyError};
