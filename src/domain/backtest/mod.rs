pub mod analysis;
pub mod extractor;
pub mod raw_record;
