pub mod bucket;
pub mod extendible_hash_table;
