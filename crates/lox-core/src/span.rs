/// Source location of a token or node, used by every diagnostic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub line: usize,   // 1-indexed
    pub col: usize,    // 1-indexed, char offset within line
    pub length: usize, // in chars, drives the ^^^ underline
}

impl Span {
    pub fn new(line: usize, col: usize, length: usize) -> Self {
        Self { line, col, length }
    }
}
