pub mod parameter;
pub mod range_generator;
