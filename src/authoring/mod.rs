//! Content written by the signed-in tech writer.

mod authoring_store;

pub use authoring_store::AuthoringStore;
