pub mod diagnostics;
pub mod keywords;
pub mod parser;
pub mod printer;
pub mod resolver;
pub mod scanner;
pub mod span;
pub mod stack;
