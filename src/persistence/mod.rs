pub mod flush;
pub mod store;
