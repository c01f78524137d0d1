//! In-memory driver configuration.

/// Configuration for a [`MemoryDatabase`](crate::MemoryDatabase).
///
/// # Example
///
/// ```ignore
/// let db = MemoryDatabase::with_config(
///     MemoryConfig::default().case_insensitive_like(false),
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Whether `LIKE` ignores ASCII and Unicode case (default: true, as in
    /// MySQL's default collations).
    pub case_insensitive_like: bool,
    /// Column filled with the next integer id when an inserted row lacks it
    /// (default: `id`).
    pub auto_increment_column: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            case_insensitive_like: true,
            auto_increment_column: "id".to_string(),
        }
    }
}

impl MemoryConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn case_insensitive_like(mut self, enabled: bool) -> Self {
        self.case_insensitive_like = enabled;
        self
    }

    pub fn auto_increment_column(mut self, column: impl Into<String>) -> Self {
        self.auto_increment_column = column.into();
        self
    }
}
