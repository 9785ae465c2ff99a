pub mod buffer;
pub mod input;
pub mod logs;
pub mod summary;
pub mod term;
