pub mod matrix;
pub mod result;
