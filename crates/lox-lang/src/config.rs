/// Deepest chain of nested Lox calls before `StackOverflow` is raised.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 2048;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub max_call_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            // set default values here, unless overridden via command-line
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}
