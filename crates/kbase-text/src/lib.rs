#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod chunker;
pub mod keyword;
pub mod snippet;
pub mod tokens;

pub use chunker::chunk_text;
pub use tokens::TokenCounter;
