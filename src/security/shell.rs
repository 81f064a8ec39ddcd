//! Shell command security utilities
//!
//! Provides command filtering to prevent dangerous shell operations. Patterns
//! are case-insensitive regular expressions matched anywhere in the command.

use regex::Regex;

use crate::error::{Result, StewardError};

/// Default patterns that are blocked for security reasons.
const DEFAULT_BLOCKED_PATTERNS: &[&str] = &[
    // Recursive delete of the filesystem root
    r"rm\s+-(rf|fr)\s+/(\*)?(\s|$)",
    // Raw disk writes and formatting
    r">\s*/dev/sd",
    r"\bmkfs(\.|\s)",
    r"\bdd\s+if=/dev/",
    // System-wide permission changes
    r"chmod\s+(-R\s+)?777\s+/(\s|$)",
    // Download piped into a shell
    r"(curl|wget)\b.*\|\s*(ba|z)?sh\b",
    // Reverse shells
    r"\bnc\s+-e\b",
    r"/dev/tcp/",
    // Credential access
    r"/etc/shadow",
    r"/etc/passwd",
    r"~/\.ssh/",
    r"\.ssh/id_",
    // Fork bomb
    r":\(\)\s*\{\s*:\|:&\s*\};:",
];

/// Configuration for shell command security.
#[derive(Debug, Clone)]
pub struct ShellSecurityConfig {
    /// Compiled blocklist
    blocked: Vec<Regex>,
    /// Whether to enable security checks (can be disabled for trusted environments)
    pub enabled: bool,
}

impl Default for ShellSecurityConfig {
    fn default() -> Self {
        Self {
            blocked: DEFAULT_BLOCKED_PATTERNS
                .iter()
                .filter_map(|p| compile(p).ok())
                .collect(),
            enabled: true,
        }
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("(?i){}", pattern)).map_err(|e| {
        StewardError::Config(format!("Invalid shell block pattern '{}': {}", pattern, e))
    })
}

impl ShellSecurityConfig {
    /// Create a new shell security config with default blocked patterns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a permissive config with no blocked patterns.
    ///
    /// # Warning
    /// This should only be used in trusted environments.
    pub fn permissive() -> Self {
        Self {
            blocked: Vec::new(),
            enabled: false,
        }
    }

    /// Add a custom blocked pattern (a regular expression).
    pub fn block_pattern(mut self, pattern: &str) -> Result<Self> {
        self.blocked.push(compile(pattern)?);
        Ok(self)
    }

    pub fn pattern_count(&self) -> usize {
        self.blocked.len()
    }

    /// Check if a command is allowed.
    ///
    /// Returns `Ok(())` if the command is safe to execute,
    /// or `Err(SecurityViolation)` if it matches a blocked pattern.
    pub fn validate_command(&self, command: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let trimmed = command.trim();
        if let Some(pattern) = self.blocked.iter().find(|re| re.is_match(trimmed)) {
            return Err(StewardError::SecurityViolation(format!(
                "Command blocked: matches prohibited pattern '{}'",
                pattern.as_str().trim_start_matches("(?i)")
            )));
        }
        Ok(())
    }
}
