pub use crate::lru_replacer::LruReplacer;
pub use crate::replacer::Replacer;
pub use crate::storage::extendible_hash_table::extendible_hash_table::ExtendibleHashTable;
pub use crate::storage::hash_table::HashTable;

mod lru_replacer;
mod replacer;
mod storage;
