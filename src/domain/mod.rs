pub mod metadata;
pub mod similarity;
