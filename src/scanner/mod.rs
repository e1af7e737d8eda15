pub mod extract;
pub mod walk;

pub use extract::extract;
pub use walk::{walk, FileBatches};
